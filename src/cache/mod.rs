//! Caching remote proof check results.
//!
//! Checking a proof means a network round trip, so we remember outcomes in two
//! tiers: a bounded in-memory LRU, and a durable [LocalDb][store::LocalDb]
//! keyed by signature ID. Whether a cached result can be used depends only on
//! what it says and how old it is:
//!
//! - success: good for the long interval (6h by default)
//! - hard failure: good for the medium interval (30m by default)
//! - soft failure: never. A timeout says nothing about the proof, so we always
//!   go look again.

pub mod store;

use crate::{
    cache::store::{DbKey, DbType, LocalDb},
    config::ProofCacheConfig,
    crypto::SigID,
    error::{Error, Result},
    proof::{ProofError, ProofErrorKind},
    util::{ser, Timestamp},
};
use getset;
use lru::LruCache;
use parking_lot::RwLock;
use serde_derive::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// How long cached results stay usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, getset::Getters)]
#[getset(get = "pub")]
pub struct CacheIntervals {
    /// Lifetime of a successful check.
    long: Duration,
    /// Lifetime of a hard failure.
    medium: Duration,
}

impl CacheIntervals {
    pub fn new(long: Duration, medium: Duration) -> Self {
        Self { long, medium }
    }
}

impl Default for CacheIntervals {
    fn default() -> Self {
        Self::new(Duration::from_secs(6 * 60 * 60), Duration::from_secs(30 * 60))
    }
}

/// The outcome of one proof check, and when it happened.
#[derive(Debug, Clone, PartialEq, getset::Getters)]
#[getset(get = "pub")]
pub struct CheckResult {
    /// `None` means the proof checked out.
    status: Option<ProofError>,
    time: Timestamp,
}

#[derive(Debug, Serialize, Deserialize)]
struct StatusRecord {
    code: u32,
    desc: String,
}

/// What a result looks like in the durable store.
#[derive(Debug, Serialize, Deserialize)]
struct CheckRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<StatusRecord>,
    time: i64,
}

impl CheckResult {
    pub fn new(status: Option<ProofError>, time: Timestamp) -> Self {
        Self { status, time }
    }

    /// A result checked right now.
    pub fn now(status: Option<ProofError>) -> Self {
        Self::new(status, Timestamp::now())
    }

    pub fn is_ok(&self) -> bool {
        self.status.is_none()
    }

    /// Can this result still be used at `now`?
    pub fn is_fresh(&self, now: &Timestamp, intervals: &CacheIntervals) -> bool {
        let interval = match &self.status {
            None => intervals.long,
            Some(e) if e.is_soft() => return false,
            Some(_) => intervals.medium,
        };
        self.time.elapsed_at(now) < interval
    }

    /// Serialize for the durable store: `{"status":{"code":..,"desc":..},"time":..}`,
    /// with no `status` on success.
    pub fn pack(&self) -> Result<Vec<u8>> {
        let record = CheckRecord {
            status: self.status.as_ref().map(|e| StatusRecord {
                code: e.kind().code(),
                desc: e.desc().clone(),
            }),
            time: self.time.unix(),
        };
        ser::canonical_json(&record)
    }

    pub fn unpack(bytes: &[u8]) -> Result<Self> {
        let record: CheckRecord = ser::from_json(bytes)?;
        let status = match record.status {
            Some(StatusRecord { code, desc }) => {
                let kind = ProofErrorKind::from_code(code).ok_or_else(|| Error::Store(format!("unknown proof status code {}", code)))?;
                Some(ProofError::new(kind, desc))
            }
            None => None,
        };
        Ok(Self::new(status, Timestamp::from_unix(record.time)))
    }

    pub fn to_display_string(&self) -> String {
        format!("[cached {}]", self.time)
    }
}

/// Anything that can remember check results. A missing cache (`None`)
/// remembers nothing, so callers never have to special-case it.
pub trait ResultCache {
    /// A fresh result for `sid` as of `now`, if we have one.
    fn lookup(&self, sid: &SigID, now: &Timestamp) -> Option<CheckResult>;

    /// Remember a result.
    fn record(&self, sid: &SigID, result: CheckResult);
}

impl<C: ResultCache> ResultCache for Option<C> {
    fn lookup(&self, sid: &SigID, now: &Timestamp) -> Option<CheckResult> {
        self.as_ref().and_then(|c| c.lookup(sid, now))
    }

    fn record(&self, sid: &SigID, result: CheckResult) {
        if let Some(c) = self {
            c.record(sid, result)
        }
    }
}

impl<C: ResultCache + ?Sized> ResultCache for &C {
    fn lookup(&self, sid: &SigID, now: &Timestamp) -> Option<CheckResult> {
        (**self).lookup(sid, now)
    }

    fn record(&self, sid: &SigID, result: CheckResult) {
        (**self).record(sid, result)
    }
}

impl<C: ResultCache + ?Sized> ResultCache for Arc<C> {
    fn lookup(&self, sid: &SigID, now: &Timestamp) -> Option<CheckResult> {
        (**self).lookup(sid, now)
    }

    fn record(&self, sid: &SigID, result: CheckResult) {
        (**self).record(sid, result)
    }
}

/// The two-tier proof result cache.
///
/// The memory tier is built when the cache is, so there's no lazy setup to
/// race on. Lookups share a read lock; anything that changes the LRU (insert,
/// evict, promote) takes the write lock. No lock is held while talking to the
/// durable store.
pub struct ProofCache {
    mem: RwLock<LruCache<SigID, CheckResult>>,
    db: Arc<dyn LocalDb>,
    intervals: CacheIntervals,
}

impl ProofCache {
    /// Create a cache holding up to `capacity` results in memory (at least
    /// one).
    pub fn new(capacity: usize, db: Arc<dyn LocalDb>, intervals: CacheIntervals) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            mem: RwLock::new(LruCache::new(capacity)),
            db,
            intervals,
        }
    }

    pub fn from_config(config: &ProofCacheConfig, db: Arc<dyn LocalDb>) -> Self {
        Self::new(*config.size(), db, config.intervals())
    }

    pub fn intervals(&self) -> &CacheIntervals {
        &self.intervals
    }

    /// A fresh result for `sid`, checked against the current time.
    pub fn get(&self, sid: &SigID) -> Option<CheckResult> {
        self.get_at(sid, &Timestamp::now())
    }

    /// A fresh result for `sid` as of `now`. Memory first, then the durable
    /// store (promoting what we find there). Stale entries are dropped from
    /// whichever tier had them.
    pub fn get_at(&self, sid: &SigID, now: &Timestamp) -> Option<CheckResult> {
        if let Some(result) = self.mem_get(sid, now) {
            debug!(sig_id = %sid, "proof cache memory hit");
            return Some(result);
        }
        let result = self.db_get(sid, now)?;
        let mut mem = self.mem.write();
        // a put may have landed while we were reading the durable tier. the
        // newer result wins.
        if let Some(current) = mem.peek(sid).filter(|c| c.time() >= result.time()).cloned() {
            return current.is_fresh(now, &self.intervals).then_some(current);
        }
        mem.put(sid.clone(), result.clone());
        Some(result)
    }

    /// Store a result in both tiers. The memory tier is always updated; a
    /// durable store failure is returned.
    pub fn put(&self, sid: &SigID, result: CheckResult) -> Result<()> {
        let packed = result.pack()?;
        self.mem.write().put(sid.clone(), result);
        self.db.put(&Self::db_key(sid), &[], &packed)
    }

    fn db_key(sid: &SigID) -> DbKey {
        DbKey::new(DbType::ProofCheck, format!("{}", sid))
    }

    fn mem_get(&self, sid: &SigID, now: &Timestamp) -> Option<CheckResult> {
        let (found, fresh) = {
            let mem = self.mem.read();
            let found = mem.peek(sid).cloned()?;
            let fresh = found.is_fresh(now, &self.intervals);
            (found, fresh)
        };
        if fresh {
            // recency is best effort: if someone else holds the lock, skip the
            // promotion rather than wait for it
            if let Some(mut mem) = self.mem.try_write() {
                mem.promote(sid);
            }
            return Some(found);
        }
        let mut mem = self.mem.write();
        // only drop it if nobody replaced it while we weren't looking
        if mem.peek(sid).map(|r| !r.is_fresh(now, &self.intervals)).unwrap_or(false) {
            mem.pop(sid);
        }
        None
    }

    fn db_get(&self, sid: &SigID, now: &Timestamp) -> Option<CheckResult> {
        let key = Self::db_key(sid);
        let bytes = match self.db.get(&key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!(sig_id = %sid, "proof cache miss");
                return None;
            }
            Err(e) => {
                error!(sig_id = %sid, error = %e, "error looking up proof check in db");
                return None;
            }
        };
        let result = match CheckResult::unpack(&bytes) {
            Ok(result) => result,
            Err(e) => {
                error!(sig_id = %sid, error = %e, "bad cached check result");
                return None;
            }
        };
        if !result.is_fresh(now, &self.intervals) {
            debug!(sig_id = %sid, "cached check result wasn't fresh");
            if let Err(e) = self.db.delete(&key) {
                error!(sig_id = %sid, error = %e, "error deleting stale check result");
            }
            return None;
        }
        Some(result)
    }
}

impl ResultCache for ProofCache {
    fn lookup(&self, sid: &SigID, now: &Timestamp) -> Option<CheckResult> {
        self.get_at(sid, now)
    }

    fn record(&self, sid: &SigID, result: CheckResult) {
        if let Err(e) = self.put(sid, result) {
            warn!(sig_id = %sid, error = %e, "failed to store proof check result");
        }
    }
}
