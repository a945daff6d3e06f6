//! Test doubles for the collaborators the gateway consumes.

#![allow(dead_code)]

use async_trait::async_trait;
use realm_gateway::console::LoadGenerator;
use realm_gateway::error::{ExternalStage, PersistenceError, ServerError};
use realm_gateway::identity::{AccessToken, ExternalIdentity, IdentityProvider, Ledger};
use realm_gateway::metrics::ServerMetrics;
use realm_gateway::shard::{PlayerConnection, Shard, ShardPool};
use realm_gateway::store::{MemoryStore, UpsertMode, WalletRecord, WalletStore};
use realm_gateway::ServerContext;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

// ---------------------------------------------------------------------------
// Shards and connections
// ---------------------------------------------------------------------------

pub struct TestShard {
    pub index: u32,
    pub players: AtomicUsize,
    pub max: usize,
    pub capacity_reads: AtomicUsize,
    pub connects: AtomicUsize,
    pub saves: AtomicUsize,
    /// When set, boot waits for this notification
    pub boot_gate: Option<Arc<Notify>>,
}

impl TestShard {
    pub fn new(index: u32, players: usize, max: usize) -> Self {
        Self {
            index,
            players: AtomicUsize::new(players),
            max,
            capacity_reads: AtomicUsize::new(0),
            connects: AtomicUsize::new(0),
            saves: AtomicUsize::new(0),
            boot_gate: None,
        }
    }

    pub fn gated(index: u32, gate: Arc<Notify>) -> Self {
        Self {
            boot_gate: Some(gate),
            ..Self::new(index, 0, 10)
        }
    }
}

#[async_trait]
impl Shard for TestShard {
    fn index(&self) -> u32 {
        self.index
    }

    fn player_count(&self) -> usize {
        self.capacity_reads.fetch_add(1, Ordering::SeqCst);
        self.players.load(Ordering::SeqCst)
    }

    fn max_players(&self) -> usize {
        self.max
    }

    async fn boot(&self) {
        if let Some(gate) = &self.boot_gate {
            gate.notified().await;
        }
    }

    fn connect(&self, connection: Box<dyn PlayerConnection>) {
        drop(connection);
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.players.fetch_add(1, Ordering::SeqCst);
    }

    async fn save_all(&self) {
        self.saves.fetch_add(1, Ordering::SeqCst);
    }
}

/// What a connection saw before it was closed or handed off
#[derive(Default)]
pub struct ConnectionLog {
    pub sent: Mutex<Vec<String>>,
    pub closed: AtomicBool,
}

impl ConnectionLog {
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct TestConnection(pub Arc<ConnectionLog>);

impl TestConnection {
    pub fn new() -> (Box<dyn PlayerConnection>, Arc<ConnectionLog>) {
        let log = Arc::new(ConnectionLog::default());
        (Box::new(Self(Arc::clone(&log))), log)
    }
}

impl PlayerConnection for TestConnection {
    fn send_utf8(&mut self, message: &str) {
        self.0.sent.lock().unwrap().push(message.to_string());
    }

    fn close(self: Box<Self>) {
        self.0.closed.store(true, Ordering::SeqCst);
    }
}

/// Pool of `TestShard`s with the given (players, max) per index
pub fn pool_of(shards: &[(usize, usize)]) -> (ShardPool, Vec<Arc<TestShard>>) {
    let handles: Vec<Arc<TestShard>> = shards
        .iter()
        .enumerate()
        .map(|(i, (players, max))| Arc::new(TestShard::new(i as u32 + 1, *players, *max)))
        .collect();

    let for_factory = handles.clone();
    let pool = ShardPool::initialize(handles.len(), &move |index: u32| -> Arc<dyn Shard> {
        for_factory[index as usize - 1].clone()
    })
    .unwrap();

    (pool, handles)
}

pub fn context(pool: ShardPool, store: Option<Arc<dyn WalletStore>>) -> Arc<ServerContext> {
    Arc::new(ServerContext::new(
        pool,
        "http://localhost:8000",
        store,
        ServerMetrics::detached(),
    ))
}

/// Mark every shard as booted without going through `boot_all`
pub fn open(ctx: &ServerContext) {
    for _ in 0..ctx.pool.len() {
        ctx.readiness.complete();
    }
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Memory store that counts every call and can be told to fail
#[derive(Default)]
pub struct RecordingStore {
    pub inner: MemoryStore,
    pub selects: AtomicUsize,
    pub inserts: AtomicUsize,
    pub updates: AtomicUsize,
    pub alters: AtomicUsize,
    pub fail_selects: AtomicBool,
    pub fail_upserts: AtomicBool,
}

impl RecordingStore {
    pub fn calls(&self) -> usize {
        self.selects.load(Ordering::SeqCst)
            + self.inserts.load(Ordering::SeqCst)
            + self.updates.load(Ordering::SeqCst)
            + self.alters.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletStore for RecordingStore {
    async fn select_wallet(&self, username: &str) -> Result<Option<WalletRecord>, PersistenceError> {
        self.selects.fetch_add(1, Ordering::SeqCst);
        if self.fail_selects.load(Ordering::SeqCst) {
            return Err(PersistenceError::Backend("connection reset".into()));
        }
        self.inner.select_wallet(username).await
    }

    async fn upsert_wallet(&self, mode: UpsertMode, record: &WalletRecord) -> Result<(), PersistenceError> {
        match mode {
            UpsertMode::Insert => self.inserts.fetch_add(1, Ordering::SeqCst),
            UpsertMode::UpdateIgnore => self.updates.fetch_add(1, Ordering::SeqCst),
        };
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(PersistenceError::Backend("write timeout".into()));
        }
        self.inner.upsert_wallet(mode, record).await
    }

    async fn alter(&self, database: &str, table: &str, kind: &str) -> Result<(), PersistenceError> {
        self.alters.fetch_add(1, Ordering::SeqCst);
        self.inner.alter(database, table, kind).await
    }
}

// ---------------------------------------------------------------------------
// External services
// ---------------------------------------------------------------------------

pub struct FakeProvider {
    pub identity: ExternalIdentity,
    pub fail_exchange: bool,
    pub fail_profile: bool,
}

impl FakeProvider {
    pub fn for_account(account: &str, id: &str) -> Self {
        Self {
            identity: ExternalIdentity {
                account: account.to_string(),
                email: format!("{account}@example.com"),
                id: id.to_string(),
            },
            fail_exchange: false,
            fail_profile: false,
        }
    }
}

fn io_error(msg: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::ConnectionRefused, msg.to_string())
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    async fn exchange_code(&self, code: &str) -> Result<AccessToken, ServerError> {
        if self.fail_exchange {
            return Err(ServerError::external(ExternalStage::TokenExchange, io_error("refused")));
        }
        Ok(AccessToken(format!("token-for-{code}")))
    }

    async fn fetch_profile(&self, _token: &AccessToken) -> Result<ExternalIdentity, ServerError> {
        if self.fail_profile {
            return Err(ServerError::external(ExternalStage::ProfileFetch, io_error("refused")));
        }
        Ok(self.identity.clone())
    }
}

pub struct FakeLedger {
    pub balance: Option<Value>,
    pub calls: AtomicUsize,
    pub fail: bool,
    /// Never answer
    pub stall: bool,
}

impl FakeLedger {
    pub fn with(balance: Option<Value>) -> Self {
        Self {
            balance,
            calls: AtomicUsize::new(0),
            fail: false,
            stall: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::with(None)
        }
    }

    pub fn stalled() -> Self {
        Self {
            stall: true,
            ..Self::with(None)
        }
    }
}

#[async_trait]
impl Ledger for FakeLedger {
    async fn balance(&self, _account: &str) -> Result<Option<Value>, ServerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.stall {
            std::future::pending::<()>().await;
        }
        // Give a concurrent pipeline a chance to interleave
        tokio::task::yield_now().await;
        if self.fail {
            return Err(ServerError::external(ExternalStage::LedgerBalance, io_error("503")));
        }
        Ok(self.balance.clone())
    }
}

// ---------------------------------------------------------------------------
// Console
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingGenerator {
    pub spawns: Mutex<Vec<(u32, u32)>>,
}

impl LoadGenerator for RecordingGenerator {
    fn spawn(&self, shard: Arc<dyn Shard>, count: u32) {
        self.spawns.lock().unwrap().push((shard.index(), count));
    }
}

// ---------------------------------------------------------------------------
// Logs
// ---------------------------------------------------------------------------

/// Formatted log output captured on the current thread
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Route this thread's events here until the guard is dropped
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
