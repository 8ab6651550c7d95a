use clap::Parser;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "sealink-shore")]
#[command(
    author,
    version,
    about = "Shore-side proxy: executes ship-framed requests against the real Internet"
)]
pub struct Cli {
    /// Port to listen on for the ship link
    #[arg(short = 'l', long = "listen-port", default_value = "9999")]
    pub listen_port: u16,

    /// Address to bind the link listener to
    #[arg(long = "bind", default_value = "0.0.0.0")]
    pub bind: String,

    /// Hard cap on a single frame's payload, in bytes
    #[arg(long = "max-frame-len", default_value = "1048576")]
    pub max_frame_len: u32,

    /// Total per-request timeout for upstream fetches, in seconds
    #[arg(long = "request-timeout-secs", default_value = "60")]
    pub request_timeout_secs: u64,

    /// Connect timeout for upstream fetches and tunnel targets, in seconds
    #[arg(long = "connect-timeout-secs", default_value = "10")]
    pub connect_timeout_secs: u64,

    /// Log level when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(long = "log-level", default_value = "info")]
    pub log_level: String,
}

impl Cli {
    pub fn config(&self) -> ShoreConfig {
        ShoreConfig {
            max_frame_len: self.max_frame_len,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }
}

/// Runtime configuration for the shore peer.
#[derive(Debug, Clone)]
pub struct ShoreConfig {
    pub max_frame_len: u32,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ShoreConfig {
    fn default() -> Self {
        Self {
            max_frame_len: sealink_proto::DEFAULT_MAX_FRAME_LEN,
            request_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
        }
    }
}
