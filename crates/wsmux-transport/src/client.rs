//! Per-connection identity and lifecycle phase.

use std::time::Instant;

use tracing::debug;

/// Connection lifecycle. `Pending` covers the HTTP checks before upgrade;
/// a [`ClientConnection`] exists from `Upgraded` on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnPhase {
    Pending,
    Upgraded,
    Registered,
    Serving,
    Closing,
    Closed,
}

/// Represents one upgraded websocket.
#[derive(Debug)]
pub struct ClientConnection {
    /// Random id minted at upgrade, unique per socket
    pub conn_id: String,
    /// Client-chosen id that survives reconnects
    pub stable_id: String,
    /// When the protocol switch completed
    pub connected_at: Instant,
    phase: ConnPhase,
}

impl ClientConnection {
    pub fn new(stable_id: String) -> Self {
        Self {
            conn_id: uuid::Uuid::new_v4().to_string(),
            stable_id,
            connected_at: Instant::now(),
            phase: ConnPhase::Upgraded,
        }
    }

    pub fn phase(&self) -> ConnPhase {
        self.phase
    }

    /// Move forward in the lifecycle. Phases never go backwards.
    pub fn advance(&mut self, phase: ConnPhase) {
        if phase <= self.phase {
            return;
        }
        debug!(conn_id = %self.conn_id, from = ?self.phase, to = ?phase, "connection phase");
        self.phase = phase;
    }
}
