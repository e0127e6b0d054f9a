//! Per-connection session state machine.
//!
//! A [`ConnectionSession`] owns one framed channel and the receiving end of
//! its outbound queue. It is driven by repeated calls to
//! [`ConnectionSession::tick`]; each tick reads at most one inbound frame,
//! hands it to the [`CommandRouter`], then writes as much queued output as
//! the channel accepts without blocking.
//!
//! Framing, channel and end-of-stream errors end the session at once.
//! Refused commands and failed logins are answered with `NAK` and the
//! session carries on.

mod counter;
mod state;

use std::{net::SocketAddr, sync::Arc, time::Duration};

pub use counter::active_session_count;
use counter::ActiveSession;
use leaky_bucket::RateLimiter;
pub use state::{SessionState, TickOutcome};
use tracing::{debug, info, trace, warn};

use crate::{
    channel::Channel,
    config::ServerConfig,
    error::{AuthError, SessionError},
    message::Message,
    metrics::{self, Direction},
    push::{OutboundQueue, PushConfigError, PushHandle},
    role::{Role, RoleCell},
    router::{Caller, CommandRouter, Login},
    session::ConnectionId,
    transport::{FrameIoError, FramedChannel},
};

fn inbound_limiter(per_second: usize) -> RateLimiter {
    RateLimiter::builder()
        .initial(per_second)
        .refill(per_second)
        .interval(Duration::from_secs(1))
        .max(per_second)
        .build()
}

/// Server side of one client connection.
pub struct ConnectionSession<C> {
    id: ConnectionId,
    router: CommandRouter,
    framed: FramedChannel<C>,
    state: SessionState,
    identity: Option<String>,
    role: Arc<RoleCell>,
    queue: OutboundQueue<Message>,
    handle: Option<PushHandle<Message>>,
    draining: bool,
    limiter: Option<RateLimiter>,
    _active: ActiveSession,
}

impl<C: Channel> ConnectionSession<C> {
    /// Wrap `channel` in a new unauthenticated session.
    ///
    /// # Errors
    ///
    /// Returns [`PushConfigError`] if the configured queue capacity is
    /// rejected.
    pub fn new(
        channel: C,
        router: CommandRouter,
        config: &ServerConfig,
    ) -> Result<Self, PushConfigError> {
        let (queue, handle) = OutboundQueue::builder()
            .capacity(config.queue_capacity())
            .build()?;
        let limiter = config
            .inbound_rate()
            .map(|rate| inbound_limiter(usize::try_from(rate.get()).unwrap_or(usize::MAX)));
        let id = router.context().next_connection_id();
        let framed = FramedChannel::new(channel, config.codec());
        debug!(connection = %id, peer = ?framed.peer_addr(), "session opened");
        Ok(Self {
            id,
            router,
            framed,
            state: SessionState::Unauthenticated,
            identity: None,
            role: Arc::new(RoleCell::default()),
            queue,
            handle: Some(handle),
            draining: false,
            limiter,
            _active: ActiveSession::new(),
        })
    }

    #[must_use]
    pub fn id(&self) -> ConnectionId { self.id }

    #[must_use]
    pub fn state(&self) -> SessionState { self.state }

    /// Name the session signed in as.
    #[must_use]
    pub fn identity(&self) -> Option<&str> { self.identity.as_deref() }

    #[must_use]
    pub fn role(&self) -> Role { self.role.get() }

    #[must_use]
    pub fn peer_addr(&self) -> Option<SocketAddr> { self.framed.peer_addr() }

    /// Returns `true` once a logout or eviction has started; no further input
    /// is read.
    #[must_use]
    pub fn is_draining(&self) -> bool { self.draining }

    /// Perform one bounded, non-blocking unit of work.
    pub fn tick(&mut self) -> TickOutcome {
        if self.state.is_terminated() {
            return TickOutcome::Terminated;
        }
        match self.step() {
            Ok(_) if self.state.is_terminated() => TickOutcome::Terminated,
            Ok(true) => TickOutcome::Progressed,
            Ok(false) => TickOutcome::Idle,
            Err(err) => {
                self.fail(&err);
                TickOutcome::Terminated
            }
        }
    }

    fn step(&mut self) -> Result<bool, SessionError> {
        if self.state == SessionState::Active && !self.draining && !self.still_registered() {
            info!(connection = %self.id, user = ?self.identity, "session evicted");
            self.begin_drain()?;
        }
        let mut progressed = false;
        if !self.draining {
            progressed |= self.read_one()?;
        }
        progressed |= self.write_out()?;
        if self.draining && !self.framed.has_pending_writes() && self.queue.is_empty() {
            self.terminate();
        }
        Ok(progressed)
    }

    fn still_registered(&self) -> bool {
        self.identity
            .as_deref()
            .is_some_and(|name| self.router.context().registry().holds(name, self.id))
    }

    fn read_one(&mut self) -> Result<bool, SessionError> {
        let read = self.framed.fill().map_err(into_session_error)? > 0;
        let buffered = self.framed.has_frame()?;
        if !buffered && !self.framed.is_eof() {
            return Ok(read);
        }
        if buffered
            && let Some(limiter) = &self.limiter
            && !limiter.try_acquire(1)
        {
            trace!(connection = %self.id, "inbound frame deferred by rate limit");
            return Ok(read);
        }
        let message = match self.framed.next_message() {
            Ok(message) => message,
            Err(FrameIoError::NoFrameAvailable) => return Ok(read),
            Err(err) => return Err(into_session_error(err)),
        };
        metrics::inc_frames(Direction::Inbound);
        trace!(connection = %self.id, kind = %message.kind(), "frame received");
        match self.state {
            SessionState::Unauthenticated => self.handle_handshake(&message)?,
            SessionState::Active => self.handle_command(&message)?,
            SessionState::Terminated => {}
        }
        Ok(true)
    }

    fn handle_handshake(&mut self, message: &Message) -> Result<(), SessionError> {
        if message.is_quit() {
            debug!(connection = %self.id, "quit before sign in");
            return self.begin_drain();
        }
        match self.router.handshake(message) {
            Ok(login) => self.sign_in(login),
            Err(err) => self.refuse(err.into()),
        }
    }

    fn sign_in(&mut self, login: Login) -> Result<(), SessionError> {
        let Some(handle) = &self.handle else {
            return Ok(());
        };
        let registry = self.router.context().registry();
        let previous = self.role.get();
        // Peers must never observe the cell before it holds the stored role.
        self.role.set(login.role);
        if let Err(err) = registry.register(&login.name, self.id, Arc::clone(&self.role), handle) {
            self.role.set(previous);
            return self.refuse(AuthError::from(err).into());
        }
        self.state.advance(SessionState::Active);
        info!(
            connection = %self.id,
            user = %login.name,
            role = %login.role,
            created = login.created,
            "signed in"
        );
        let ack = Message::acknowledge(&login.name, Some(login.role.as_str()));
        self.identity = Some(login.name);
        self.send(&ack).map(drop)
    }

    fn handle_command(&mut self, message: &Message) -> Result<(), SessionError> {
        let Some(name) = self.identity.clone() else {
            return Ok(());
        };
        let caller = Caller {
            name: &name,
            connection: self.id,
            role: self.role.get(),
        };
        match self.router.dispatch(caller, message) {
            Ok(outcome) => {
                if outcome.disconnect {
                    self.begin_drain()?;
                }
                for reply in &outcome.replies {
                    self.send(reply)?;
                }
                Ok(())
            }
            Err(err) => self.refuse(err.into()),
        }
    }

    /// Answer a non-fatal failure with `NAK`; fatal ones are returned.
    fn refuse(&mut self, err: SessionError) -> Result<(), SessionError> {
        if err.is_fatal() {
            return Err(err);
        }
        debug!(connection = %self.id, user = ?self.identity, error = %err, "request refused");
        let reason = err.reply_text();
        self.send(&Message::no_acknowledge(Some(&reason))).map(drop)
    }

    /// Stop reading, leave the registry and move everything already queued
    /// into the write buffer so later replies follow it.
    fn begin_drain(&mut self) -> Result<(), SessionError> {
        if self.draining {
            return Ok(());
        }
        self.draining = true;
        if let Some(name) = &self.identity {
            self.router.context().registry().remove(name, self.id);
        }
        self.queue.close();
        while let Some(frame) = self.queue.try_recv() {
            self.send(&frame)?;
        }
        Ok(())
    }

    /// Flush pending bytes, then queued frames until the channel stops
    /// accepting data.
    fn write_out(&mut self) -> Result<bool, SessionError> {
        let pending = self.framed.has_pending_writes();
        let flushed = self.framed.flush().map_err(into_session_error)?;
        let mut progressed = pending && flushed;
        if !flushed {
            return Ok(progressed);
        }
        while let Some(frame) = self.queue.try_recv() {
            progressed = true;
            if !self.send(&frame)? {
                break;
            }
        }
        Ok(progressed)
    }

    /// Write one frame. Returns `true` when nothing is left buffered.
    fn send(&mut self, frame: &Message) -> Result<bool, SessionError> {
        match self.framed.write(frame) {
            Ok(done) => {
                metrics::inc_frames(Direction::Outbound);
                Ok(done)
            }
            Err(FrameIoError::Framing(error)) => {
                warn!(connection = %self.id, kind = %frame.kind(), %error, "dropping unencodable frame");
                Ok(!self.framed.has_pending_writes())
            }
            Err(err) => Err(into_session_error(err)),
        }
    }

    fn fail(&mut self, err: &SessionError) {
        match err {
            SessionError::StreamClosed => {
                info!(connection = %self.id, user = ?self.identity, "peer closed connection");
            }
            _ => {
                metrics::inc_errors();
                warn!(connection = %self.id, user = ?self.identity, error = %err, "session failed");
            }
        }
        self.terminate();
    }

    fn terminate(&mut self) {
        if self.state.is_terminated() {
            return;
        }
        if let Some(name) = &self.identity {
            self.router.context().registry().remove(name, self.id);
        }
        self.queue.close();
        self.handle = None;
        if let Err(error) = self.framed.close() {
            debug!(connection = %self.id, %error, "channel shutdown failed");
        }
        self.state.advance(SessionState::Terminated);
        info!(connection = %self.id, user = ?self.identity, "session terminated");
    }
}

impl<C> Drop for ConnectionSession<C> {
    fn drop(&mut self) {
        if let Some(name) = &self.identity
            && !self.state.is_terminated()
        {
            self.router.context().registry().remove(name, self.id);
        }
    }
}

fn into_session_error(err: FrameIoError) -> SessionError {
    match err {
        FrameIoError::NoFrameAvailable | FrameIoError::StreamClosed => SessionError::StreamClosed,
        FrameIoError::Framing(err) => SessionError::Framing(err),
        FrameIoError::Io(err) => SessionError::Channel(err),
    }
}
