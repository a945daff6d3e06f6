//! Connection admission
//!
//! Rejected peers get a literal token (`disallowed` or `full`) and are closed.
//! Admitted connections are handed to a shard and never touched again here.

use crate::context::ServerContext;
use crate::error::{RejectReason, ServerError};
use crate::shard::PlayerConnection;

use std::sync::Arc;
use tracing::{debug, info};

/// Result of a single admission attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Handed to the shard with this index
    Assigned(u32),
    Rejected(RejectReason),
}

pub struct ConnectionGate {
    ctx: Arc<ServerContext>,
}

impl ConnectionGate {
    pub fn new(ctx: Arc<ServerContext>) -> Self {
        Self { ctx }
    }

    /// Admit or reject one inbound connection.
    pub fn admit(&self, connection: Box<dyn PlayerConnection>) -> Admission {
        let peer = connection.peer_addr();

        // Readiness is checked before any shard is looked at
        if !self.ctx.readiness.is_ready() {
            debug!(?peer, "Shards still booting, rejecting connection");
            return self.reject(connection, RejectReason::Disallowed);
        }

        let Some(shard) = self.ctx.pool.find_available() else {
            info!(?peer, "Worlds are currently full, closing...");
            return self.reject(connection, RejectReason::Full);
        };

        let index = shard.index();
        debug!(shard_id = index, ?peer, "Connection assigned");
        shard.connect(connection);
        self.ctx.metrics.record_admission("shard");

        Admission::Assigned(index)
    }

    fn reject(&self, mut connection: Box<dyn PlayerConnection>, reason: RejectReason) -> Admission {
        connection.send_utf8(reason.token());
        connection.close();

        let rejection = ServerError::AdmissionRejected(reason);
        debug!(error = %rejection, "Connection closed");
        self.ctx.metrics.record_admission(reason.token());
        self.ctx.metrics.record_error(rejection.error_type_label());
        Admission::Rejected(reason)
    }
}
