//! Signal-driven graceful shutdown
//!
//! SIGINT and SIGQUIT arm the same path: one sequential save pass over the
//! pool. Arming is idempotent. The coordinator does not exit the process;
//! `main` returns once the save pass is done.

use crate::context::ServerContext;
use crate::metrics::ServerMetrics;
use crate::shard::ShardPool;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tracing::{debug, error, info};

/// Signal that armed the shutdown path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Quit,
}

/// Ask every shard, in pool order, to flush its players. Returns the number
/// of shards saved.
pub async fn save_all(pool: &ShardPool, metrics: &ServerMetrics) -> usize {
    for shard in pool.shards() {
        debug!(shard_id = shard.index(), "Saving shard");
        shard.save_all().await;
    }

    let count = pool.len();
    let plural = if count > 1 { "s" } else { "" };
    info!(worlds = count, "Saved players for {count} world{plural}.");
    metrics.record_save_pass();
    count
}

pub struct ShutdownCoordinator {
    ctx: Arc<ServerContext>,
    armed: AtomicBool,
}

impl ShutdownCoordinator {
    pub fn new(ctx: Arc<ServerContext>) -> Self {
        Self {
            ctx,
            armed: AtomicBool::new(false),
        }
    }

    /// Run the save pass unless it already ran. Returns true if this call
    /// performed it.
    pub async fn arm(&self, signal: ShutdownSignal) -> bool {
        if self.armed.swap(true, Ordering::AcqRel) {
            debug!(?signal, "Shutdown already armed");
            return false;
        }

        info!(?signal, "Shutdown started");
        save_all(&self.ctx.pool, &self.ctx.metrics).await;
        true
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Wait for a termination signal and run the save pass.
    pub async fn listen(&self) {
        match wait_for_signal().await {
            Ok(signal) => {
                self.arm(signal).await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handlers");
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Wait for SIGINT or SIGQUIT
async fn wait_for_signal() -> std::io::Result<ShutdownSignal> {
    #[cfg(unix)]
    {
        let mut quit = signal::unix::signal(signal::unix::SignalKind::quit())?;
        tokio::select! {
            result = signal::ctrl_c() => result.map(|()| ShutdownSignal::Interrupt),
            _ = quit.recv() => Ok(ShutdownSignal::Quit),
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.map(|()| ShutdownSignal::Interrupt)
    }
}
