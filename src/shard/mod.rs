//! Shard management module
//!
//! A shard is one independently simulated game world. The simulation itself
//! lives behind the [`Shard`] trait; this module owns the fixed pool of
//! shards, their boot status, and the readiness barrier that gates admission.

mod barrier;
mod pool;
mod state;

pub use barrier::LifecycleBarrier;
pub use pool::ShardPool;
pub use state::{ShardState, ShardStatus};

use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;

/// An inbound transport session that has not been assigned to a shard yet.
///
/// Either closed by the gate or handed to exactly one shard.
pub trait PlayerConnection: Send {
    /// Send a UTF-8 text frame to the peer
    fn send_utf8(&mut self, message: &str);

    /// Close the session
    fn close(self: Box<Self>);

    /// Remote address, when the session has one
    fn peer_addr(&self) -> Option<SocketAddr> {
        None
    }

    /// Resolves once the peer has gone away. Yields `Some` at most once.
    fn closed(&mut self) -> Option<oneshot::Receiver<()>> {
        None
    }
}

/// One game world instance hosted by this process.
#[async_trait]
pub trait Shard: Send + Sync {
    /// 1-based position in the pool
    fn index(&self) -> u32;

    /// Current occupant count (written only by the shard's simulation)
    fn player_count(&self) -> usize;

    /// Maximum concurrent occupants
    fn max_players(&self) -> usize;

    fn has_capacity(&self) -> bool {
        self.player_count() < self.max_players()
    }

    /// Load world state; resolves once the shard can accept players.
    async fn boot(&self);

    /// Take ownership of an admitted connection.
    fn connect(&self, connection: Box<dyn PlayerConnection>);

    /// Flush every player's state to persistence.
    async fn save_all(&self);
}

/// Builds the shard for a given 1-based index.
pub trait ShardFactory {
    fn create(&self, index: u32) -> Arc<dyn Shard>;
}

impl<F> ShardFactory for F
where
    F: Fn(u32) -> Arc<dyn Shard>,
{
    fn create(&self, index: u32) -> Arc<dyn Shard> {
        self(index)
    }
}
