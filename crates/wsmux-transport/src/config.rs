//! Transport configuration.

use std::time::Duration;

/// Transport server configuration. Defaults match what the desktop client
/// expects; tests shrink or stretch the timings.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Port to listen on (0 for OS-assigned)
    pub port: u16,
    /// Hostname to bind to
    pub hostname: String,
    /// Read deadline, reset after every parsed frame
    pub read_timeout: Duration,
    /// Deadline for each socket write
    pub write_timeout: Duration,
    /// Delay before the first keepalive ping
    pub initial_ping_interval: Duration,
    /// Keepalive period after the first ping
    pub ping_interval: Duration,
    /// Largest inbound frame accepted
    pub max_message_size: usize,
    /// Capacity of the outbound queue and both proxy channels
    pub channel_size: usize,
    /// Coalescing window for data messages
    pub batch_window: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: 1719,
            hostname: "127.0.0.1".into(),
            read_timeout: Duration::from_secs(15),
            write_timeout: Duration::from_secs(10),
            initial_ping_interval: Duration::from_secs(1),
            ping_interval: Duration::from_secs(10),
            max_message_size: 10 * 1024 * 1024,
            channel_size: 128,
            // one animation frame
            batch_window: Duration::from_millis(16),
        }
    }
}

/// Settings the read loop needs.
#[derive(Debug, Clone, Copy)]
pub struct ReadLoopConfig {
    pub read_timeout: Duration,
    pub max_message_size: usize,
}

/// Settings the write loop needs.
#[derive(Debug, Clone, Copy)]
pub struct WriteLoopConfig {
    pub write_timeout: Duration,
    pub initial_ping_interval: Duration,
    pub ping_interval: Duration,
    pub batch_window: Duration,
}

impl TransportConfig {
    pub fn read_loop(&self) -> ReadLoopConfig {
        ReadLoopConfig {
            read_timeout: self.read_timeout,
            max_message_size: self.max_message_size,
        }
    }

    pub fn write_loop(&self) -> WriteLoopConfig {
        WriteLoopConfig {
            write_timeout: self.write_timeout,
            initial_ping_interval: self.initial_ping_interval,
            ping_interval: self.ping_interval,
            batch_window: self.batch_window,
        }
    }
}
