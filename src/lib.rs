//! Realm Gateway - orchestration core for a sharded game server
//!
//! - Boots a fixed pool of shards and opens admission once all have booted
//! - Routes each admitted player to the first shard with spare capacity
//! - Links external identities to local wallets, reconciling the cached
//!   token balance against the external ledger
//! - Operator console and signal-driven save-on-shutdown

pub mod config;
pub mod console;
pub mod context;
pub mod error;
pub mod gate;
pub mod http;
pub mod identity;
pub mod metrics;
pub mod network;
pub mod shard;
pub mod shutdown;
pub mod store;
pub mod world;

pub use context::ServerContext;
pub use error::ServerError;
