//! In-process shard used by the standalone binary
//!
//! Holds admitted sessions and their occupant count. Game simulation and
//! player persistence are provided by the embedding game; this shard only
//! keeps the bookkeeping the gateway reads. A session's slot is released when
//! its peer goes away.

use crate::console::LoadGenerator;
use crate::shard::{PlayerConnection, Shard};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};

/// Sessions shared with the tasks that wait for disconnects
#[derive(Default)]
struct Occupancy {
    occupants: AtomicUsize,
    sessions: Mutex<HashMap<u64, Box<dyn PlayerConnection>>>,
}

impl Occupancy {
    fn admit(&self, session: u64, connection: Box<dyn PlayerConnection>) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session, connection);
        self.occupants.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Drop a session and free its slot. False if it was already gone.
    fn release(&self, session: u64) -> bool {
        let removed = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&session);

        match removed {
            Some(connection) => {
                connection.close();
                self.occupants.fetch_sub(1, Ordering::AcqRel);
                true
            }
            None => false,
        }
    }
}

pub struct LocalShard {
    index: u32,
    max_players: usize,
    next_session: AtomicU64,
    occupancy: Arc<Occupancy>,
}

impl LocalShard {
    pub fn new(index: u32, max_players: usize) -> Self {
        Self {
            index,
            max_players,
            next_session: AtomicU64::new(1),
            occupancy: Arc::new(Occupancy::default()),
        }
    }
}

#[async_trait]
impl Shard for LocalShard {
    fn index(&self) -> u32 {
        self.index
    }

    fn player_count(&self) -> usize {
        self.occupancy.occupants.load(Ordering::Acquire)
    }

    fn max_players(&self) -> usize {
        self.max_players
    }

    async fn boot(&self) {
        info!(shard_id = self.index, max_players = self.max_players, "World loaded");
    }

    fn connect(&self, mut connection: Box<dyn PlayerConnection>) {
        let session = self.next_session.fetch_add(1, Ordering::Relaxed);
        let peer = connection.peer_addr();
        let closed = connection.closed();

        let occupants = self.occupancy.admit(session, connection);
        debug!(shard_id = self.index, session, ?peer, occupants, "Player connected");

        // Watch only after the session is registered so release finds it
        if let Some(closed) = closed {
            let occupancy = Arc::clone(&self.occupancy);
            let shard_id = self.index;
            tokio::spawn(async move {
                let _ = closed.await;
                if occupancy.release(session) {
                    debug!(shard_id, session, "Player disconnected");
                }
            });
        }
    }

    async fn save_all(&self) {
        info!(shard_id = self.index, players = self.player_count(), "Saving players");
    }
}

/// Connection with no transport behind it
struct BotConnection;

impl PlayerConnection for BotConnection {
    fn send_utf8(&mut self, _message: &str) {}

    fn close(self: Box<Self>) {}
}

/// Fills a shard with idle simulated sessions
#[derive(Debug, Default)]
pub struct IdleBots;

impl LoadGenerator for IdleBots {
    fn spawn(&self, shard: Arc<dyn Shard>, count: u32) {
        for _ in 0..count {
            shard.connect(Box::new(BotConnection));
        }
    }
}
