use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Primary bind address (default: 127.0.0.1:9810).
    pub bind: SocketAddr,
    /// SQLite database file.
    pub db_path: PathBuf,
    /// Interval between expiry sweeps.
    pub sweep_interval: Duration,
    /// Upper bound on a single fire-and-forget view write.
    pub view_record_timeout: Duration,
    /// Maximum number of active stories read when composing a feed.
    pub feed_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9810),
            db_path: PathBuf::from("kiln.db"),
            sweep_interval: Duration::from_secs(300),
            view_record_timeout: Duration::from_secs(2),
            feed_limit: 500,
        }
    }
}

/// Story lifetime policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoryPolicy {
    /// Time from creation to expiry. Fixed per story at creation.
    pub ttl: chrono::Duration,
}

impl Default for StoryPolicy {
    fn default() -> Self {
        Self {
            ttl: chrono::Duration::hours(24),
        }
    }
}
