//! The durable tier's storage collaborator.
//!
//! We don't care what the store is (leveldb, sqlite, a file...) as long as it
//! can get, put, and delete opaque values under namespaced keys.

use crate::error::{Error, Result};
use getset;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Which family of records a key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbType {
    /// Cached remote proof check results.
    ProofCheck,
}

impl DbType {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::ProofCheck => "proof_check",
        }
    }
}

/// A namespaced store key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, getset::Getters)]
#[getset(get = "pub")]
pub struct DbKey {
    typ: DbType,
    key: String,
}

impl DbKey {
    pub fn new<T: Into<String>>(typ: DbType, key: T) -> Self {
        Self { typ, key: key.into() }
    }
}

impl std::fmt::Display for DbKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.typ.prefix(), self.key)
    }
}

/// A local key-value store.
pub trait LocalDb: Send + Sync {
    /// Look up a value by its key or one of its aliases.
    fn get(&self, key: &DbKey) -> Result<Option<Vec<u8>>>;

    /// Store a value under `key`, also reachable through `aliases`.
    fn put(&self, key: &DbKey, aliases: &[DbKey], value: &[u8]) -> Result<()>;

    /// Remove a value (and any aliases pointing at it). Deleting something
    /// that isn't there is fine.
    fn delete(&self, key: &DbKey) -> Result<()>;
}

/// A [LocalDb] that lives in memory. Good for tests and for running without a
/// disk.
#[derive(Debug, Default)]
pub struct MemoryDb {
    values: RwLock<HashMap<DbKey, Vec<u8>>>,
    aliases: RwLock<HashMap<DbKey, DbKey>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl LocalDb for MemoryDb {
    fn get(&self, key: &DbKey) -> Result<Option<Vec<u8>>> {
        let primary = self.aliases.read().get(key).cloned().unwrap_or_else(|| key.clone());
        Ok(self.values.read().get(&primary).cloned())
    }

    fn put(&self, key: &DbKey, aliases: &[DbKey], value: &[u8]) -> Result<()> {
        if aliases.contains(key) {
            Err(Error::Store(format!("{} can't alias itself", key)))?;
        }
        self.values.write().insert(key.clone(), value.to_vec());
        let mut alias_map = self.aliases.write();
        for alias in aliases {
            alias_map.insert(alias.clone(), key.clone());
        }
        Ok(())
    }

    fn delete(&self, key: &DbKey) -> Result<()> {
        self.values.write().remove(key);
        self.aliases.write().retain(|_, primary| primary != key);
        Ok(())
    }
}
