//! Server configuration loaded from environment variables.

use std::net::SocketAddr;
use tracing::warn;

/// Default listen address.
pub const DEFAULT_BIND: ([u8; 4], u16) = ([0, 0, 0, 0], 3030);
/// Default per-board broadcast buffer.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Env: `INKBOARD_BIND`
    pub bind_addr: SocketAddr,
    /// Notifications buffered per board before slow subscribers start
    /// missing them.
    /// Env: `INKBOARD_CHANNEL_CAPACITY`
    pub channel_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND.into(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl ServerConfig {
    /// Read the environment. Unparseable values fall back to the default
    /// with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: parse_or(&lookup, "INKBOARD_BIND", defaults.bind_addr),
            channel_capacity: parse_or(&lookup, "INKBOARD_CHANNEL_CAPACITY", defaults.channel_capacity)
                .max(1),
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("Ignoring invalid {}={:?}", key, raw);
                default
            }
        },
        None => default,
    }
}
