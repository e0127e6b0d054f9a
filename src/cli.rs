//! Command line interface for the `chatwire` server binary.
//!
//! Shared with `build.rs`, which renders the manual page, so this module
//! depends on `clap` alone.

use std::net::SocketAddr;

use clap::{Parser, ValueEnum};

/// How absent fields are written on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum NullMarkerArg {
    /// `2 --`, the form older clients expect.
    #[default]
    Sentinel,
    /// `-1`, which keeps a literal `--` unambiguous.
    NegativeLength,
}

/// Command line arguments for the `chatwire` binary.
#[derive(Debug, Parser)]
#[command(name = "chatwire", version, about = "Instant messaging server")]
pub struct Cli {
    /// Address to accept client connections on.
    #[arg(short, long, default_value = "127.0.0.1:5555")]
    pub bind: SocketAddr,

    /// Runtime worker threads; defaults to the number of CPU cores.
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Milliseconds between session ticks.
    #[arg(long, default_value_t = 10)]
    pub tick_ms: u64,

    /// Outbound frames buffered per session before pushes are refused.
    #[arg(long, default_value_t = 1024)]
    pub queue_capacity: usize,

    /// Largest accepted field, in bytes.
    #[arg(long, default_value_t = 64 * 1024)]
    pub max_field_length: usize,

    /// Encoding used for absent fields.
    #[arg(long, value_enum, default_value_t = NullMarkerArg::Sentinel)]
    pub null_marker: NullMarkerArg,

    /// Maximum inbound frames per second per session.
    #[arg(long)]
    pub inbound_rate: Option<u32>,

    /// Start with traffic logging enabled.
    #[arg(long)]
    pub traffic_log: bool,

    /// Name of an administrator account created at start-up.
    #[arg(long, requires = "admin_secret")]
    pub admin_user: Option<String>,

    /// Secret for `--admin-user`.
    #[arg(long, env = "CHATWIRE_ADMIN_SECRET", hide_env_values = true)]
    pub admin_secret: Option<String>,

    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}
