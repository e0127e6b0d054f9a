//! Test helpers shared across server modules.

use std::{
    net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener},
    sync::Arc,
};

use rstest::fixture;

use super::{Bound, ChatServer};
use crate::{config::ServerConfig, context::ServerContext, role::Role};

/// Context with a plain user, an agency and an administrator.
#[fixture]
pub fn context() -> Arc<ServerContext> {
    let ctx = ServerContext::in_memory();
    for (name, role) in [
        ("alice", Role::User),
        ("bob", Role::User),
        ("nsa", Role::Agency),
        ("root", Role::Admin),
    ] {
        ctx.users()
            .create_user(name, "pw", role)
            .expect("seed user");
    }
    Arc::new(ctx)
}

/// Returns a bound [`StdTcpListener`] on a free port.
///
/// Keeping the listener bound prevents another process from claiming the
/// port between discovery and use.
#[fixture]
pub fn free_listener() -> StdTcpListener {
    let addr = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 0);
    StdTcpListener::bind(addr).expect("Failed to bind free port listener")
}

#[must_use]
pub fn listener_addr(listener: &StdTcpListener) -> SocketAddr {
    listener
        .local_addr()
        .expect("failed to get listener address")
}

/// Bind a fast-ticking server to `listener`. Must be called inside a runtime.
pub fn bind_server(ctx: Arc<ServerContext>, listener: StdTcpListener) -> ChatServer<Bound> {
    ChatServer::new(ctx)
        .with_config(ServerConfig::default().with_tick_period(std::time::Duration::from_millis(1)))
        .workers(2)
        .bind_listener(listener)
        .expect("Failed to bind")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listener_addr_matches_local_addr() {
        let listener = free_listener();
        assert_eq!(listener_addr(&listener).ip(), std::net::IpAddr::from(Ipv4Addr::LOCALHOST));
    }
}
