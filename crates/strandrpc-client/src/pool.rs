//! Outbound connection pool.
//!
//! Each worker thread keeps its own bounded LRU cache of sessions keyed by
//! `"host:port"`. The cache lives in a thread local, so acquiring never
//! takes a lock or contends with another worker. A task that migrates to a
//! different worker between calls simply uses that worker's cache.
//!
//! Sessions are handed out as [`PooledSession`], a shared handle with an
//! async mutex inside. Only one task drives a session at a time; a second
//! task acquiring the same destination on the same thread waits for the
//! first to finish its call.
//!
//! There is no background reaper. Eviction happens only when a new
//! destination misses a full cache, and always removes the entry that was
//! least recently returned by [`OutboundPool::acquire`]. The evicted session
//! is closed before the replacement connects.
//!
//! Dropping the last [`OutboundPool`] handle of a family clears that
//! family's cache on the dropping thread. Other threads clear theirs the
//! next time they touch any pool.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use strandrpc_common::TransportError;
use tokio::sync::{Mutex, MutexGuard};

use crate::config::{ClientConfig, PoolConfig};
use crate::session::AsyncSession;

/// A bounded map that evicts its least recently used entry.
///
/// Recency is a monotonically increasing stamp per entry; the oldest stamp
/// is the first key of `order`.
#[derive(Debug)]
pub struct LruPool<V> {
    capacity: usize,
    clock: u64,
    entries: HashMap<String, (u64, V)>,
    order: BTreeMap<u64, String>,
}

impl<V> LruPool<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            clock: 0,
            entries: HashMap::new(),
            order: BTreeMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Checks membership without touching recency.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns the entry and marks it most recently used.
    pub fn get(&mut self, key: &str) -> Option<&V> {
        let stamp = self.tick();
        let (old, value) = self.entries.get_mut(key)?;
        let previous = std::mem::replace(old, stamp);
        if let Some(owner) = self.order.remove(&previous) {
            self.order.insert(stamp, owner);
        }
        Some(&*value)
    }

    /// Inserts `value` as the most recently used entry.
    ///
    /// Replacing an existing key never evicts. Inserting a new key into a
    /// full pool first removes the least recently used entry and returns it.
    pub fn insert(&mut self, key: String, value: V) -> Option<(String, V)> {
        let stamp = self.tick();

        if let Some((old, slot)) = self.entries.get_mut(&key) {
            let previous = std::mem::replace(old, stamp);
            *slot = value;
            self.order.remove(&previous);
            self.order.insert(stamp, key);
            return None;
        }

        let evicted = self.evict_if_full();

        self.order.insert(stamp, key.clone());
        self.entries.insert(key, (stamp, value));
        evicted
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        let (stamp, value) = self.entries.remove(key)?;
        self.order.remove(&stamp);
        Some(value)
    }

    /// Removes the least recently used entry if the pool is full.
    pub fn evict_if_full(&mut self) -> Option<(String, V)> {
        if self.entries.len() >= self.capacity {
            self.pop_lru()
        } else {
            None
        }
    }

    /// Removes every entry, least recently used first.
    pub fn drain(&mut self) -> Vec<(String, V)> {
        let mut drained = Vec::with_capacity(self.entries.len());
        while let Some(entry) = self.pop_lru() {
            drained.push(entry);
        }
        drained
    }

    /// Keys from least to most recently used.
    pub fn keys_by_recency(&self) -> Vec<&str> {
        self.order.values().map(String::as_str).collect()
    }

    fn pop_lru(&mut self) -> Option<(String, V)> {
        let (_, key) = self.order.pop_first()?;
        let (_, value) = self.entries.remove(&key)?;
        Some((key, value))
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

/// Shared handle to a pooled session.
#[derive(Debug, Clone)]
pub struct PooledSession {
    session: Arc<Mutex<AsyncSession>>,
}

impl PooledSession {
    pub fn new(session: AsyncSession) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
        }
    }

    /// Waits for exclusive use of the session.
    pub async fn lock(&self) -> MutexGuard<'_, AsyncSession> {
        self.session.lock().await
    }

    /// Closes the session unless a task is using it right now.
    ///
    /// A busy session is left to finish its call; it closes when the last
    /// handle is dropped.
    pub fn close_if_idle(&self) -> bool {
        match self.session.try_lock() {
            Ok(mut session) => {
                session.close();
                true
            }
            Err(_) => false,
        }
    }

    pub fn ptr_eq(&self, other: &PooledSession) -> bool {
        Arc::ptr_eq(&self.session, &other.session)
    }
}

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(0);

/// One thread's cache for one pool family.
struct ThreadSlot {
    family: Weak<PoolFamily>,
    sessions: LruPool<PooledSession>,
}

thread_local! {
    static POOLS: RefCell<HashMap<u64, ThreadSlot>> = RefCell::new(HashMap::new());
}

fn close_all(mut sessions: LruPool<PooledSession>) -> usize {
    let drained = sessions.drain();
    let count = drained.len();
    for (_, session) in drained {
        session.close_if_idle();
    }
    count
}

#[derive(Debug)]
struct PoolFamily {
    id: u64,
    config: PoolConfig,
}

impl Drop for PoolFamily {
    fn drop(&mut self) {
        // The thread local may already be gone during thread teardown.
        let _ = POOLS.try_with(|pools| {
            let slot = match pools.try_borrow_mut() {
                Ok(mut pools) => pools.remove(&self.id),
                Err(_) => None,
            };
            if let Some(slot) = slot {
                let closed = close_all(slot.sessions);
                tracing::debug!(pool = self.id, closed, "Dropped outbound pool");
            }
        });
    }
}

/// Handle to a family of per-thread pools sharing one configuration.
///
/// Cloning the handle shares the pools; [`OutboundPool::new`] starts a
/// separate family.
///
/// # Example
///
/// ```no_run
/// use strandrpc_client::{ClientConfig, OutboundPool, PoolConfig};
///
/// # async fn demo() -> Result<(), strandrpc_client::TransportError> {
/// let pool = OutboundPool::new(PoolConfig::default());
/// let session = pool.acquire(&ClientConfig::new("127.0.0.1", 8080)).await?;
/// let guard = session.lock().await;
/// assert!(guard.is_connected());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct OutboundPool {
    family: Arc<PoolFamily>,
}

impl Default for OutboundPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

impl OutboundPool {
    /// A capacity of zero is treated as one.
    pub fn new(config: PoolConfig) -> Self {
        Self {
            family: Arc::new(PoolFamily {
                id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
                config,
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.family.config
    }

    /// Returns this thread's session for `config.destination()`, connecting
    /// a new one on a miss.
    ///
    /// A miss on a full pool first evicts and closes the least recently
    /// used session, then connects.
    ///
    /// # Errors
    ///
    /// Returns the connect failure on a miss. Nothing is inserted in that
    /// case, and an entry evicted to make room stays evicted.
    pub async fn acquire(&self, config: &ClientConfig) -> Result<PooledSession, TransportError> {
        let destination = config.destination();
        let lookup = self.with_pool(|pool| match pool.get(&destination).cloned() {
            Some(session) => Ok(session),
            None => Err(pool.evict_if_full()),
        });
        match lookup {
            Ok(session) => return Ok(session),
            Err(Some(evicted)) => log_eviction(evicted, &destination),
            Err(None) => {}
        }

        let session = PooledSession::new(AsyncSession::connect(config.clone()).await?);

        // The task may have moved threads while connecting; this inserts into
        // whichever thread it is on now.
        let evicted = self.with_pool(|pool| pool.insert(destination.clone(), session.clone()));
        if let Some(evicted) = evicted {
            log_eviction(evicted, &destination);
        }

        Ok(session)
    }

    /// Removes and closes this thread's session for `destination`.
    pub fn discard(&self, destination: &str) -> bool {
        match self.with_pool(|pool| pool.remove(destination)) {
            Some(session) => {
                session.close_if_idle();
                true
            }
            None => false,
        }
    }

    /// Number of sessions in this thread's pool.
    pub fn len(&self) -> usize {
        self.with_pool(|pool| pool.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this thread's pool holds `destination`, without touching
    /// recency.
    pub fn contains(&self, destination: &str) -> bool {
        self.with_pool(|pool| pool.contains(destination))
    }

    fn with_pool<R>(&self, f: impl FnOnce(&mut LruPool<PooledSession>) -> R) -> R {
        POOLS.with(|pools| {
            let mut pools = pools.borrow_mut();

            let dead: Vec<u64> = pools
                .iter()
                .filter(|(_, slot)| slot.family.strong_count() == 0)
                .map(|(id, _)| *id)
                .collect();
            for id in dead {
                if let Some(slot) = pools.remove(&id) {
                    let closed = close_all(slot.sessions);
                    tracing::debug!(pool = id, closed, "Cleared dropped outbound pool");
                }
            }

            let slot = pools.entry(self.family.id).or_insert_with(|| ThreadSlot {
                family: Arc::downgrade(&self.family),
                sessions: LruPool::new(self.family.config.max_connections.max(1)),
            });
            f(&mut slot.sessions)
        })
    }
}

fn log_eviction((evicted, session): (String, PooledSession), inserted: &str) {
    let closed = session.close_if_idle();
    tracing::debug!(evicted = %evicted, inserted = %inserted, closed, "Evicted pooled session");
}
