use clap::Parser;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "sealink-ship")]
#[command(
    author,
    version,
    about = "Ship-side HTTP proxy: multiplexes client requests over the single shore link"
)]
pub struct Cli {
    /// Shore peer hostname or IP
    #[arg(long = "offshore-host", value_name = "HOST")]
    pub offshore_host: String,

    /// Shore peer TCP port
    #[arg(long = "offshore-port", default_value = "9999")]
    pub offshore_port: u16,

    /// Local HTTP proxy port
    #[arg(short = 'l', long = "listen-port", default_value = "8080")]
    pub listen_port: u16,

    /// Hard cap on a single frame's payload, in bytes
    #[arg(long = "max-frame-len", default_value = "1048576")]
    pub max_frame_len: u32,

    /// Initial reconnect delay in milliseconds
    #[arg(long = "reconnect-initial-delay-ms", default_value = "500")]
    pub reconnect_initial_delay_ms: u64,

    /// Maximum reconnect delay in milliseconds
    #[arg(long = "reconnect-max-delay-ms", default_value = "30000")]
    pub reconnect_max_delay_ms: u64,

    /// Log level when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(long = "log-level", default_value = "info")]
    pub log_level: String,
}

impl Cli {
    pub fn config(&self) -> ShipConfig {
        ShipConfig {
            offshore_host: self.offshore_host.clone(),
            offshore_port: self.offshore_port,
            max_frame_len: self.max_frame_len,
            reconnect_initial_delay: Duration::from_millis(self.reconnect_initial_delay_ms),
            reconnect_max_delay: Duration::from_millis(self.reconnect_max_delay_ms),
        }
    }
}

/// Runtime configuration for the ship peer.
#[derive(Debug, Clone)]
pub struct ShipConfig {
    pub offshore_host: String,
    pub offshore_port: u16,
    pub max_frame_len: u32,
    pub reconnect_initial_delay: Duration,
    pub reconnect_max_delay: Duration,
}

impl Default for ShipConfig {
    fn default() -> Self {
        Self {
            offshore_host: "localhost".to_string(),
            offshore_port: 9999,
            max_frame_len: sealink_proto::DEFAULT_MAX_FRAME_LEN,
            reconnect_initial_delay: Duration::from_millis(500),
            reconnect_max_delay: Duration::from_secs(30),
        }
    }
}
