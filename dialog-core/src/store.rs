//! Pluggable persistence trait for per-user variable rows. The interpreter
//! and session registry operate exclusively through this trait, the same
//! way the teacher's VM operates exclusively through `ProcessStore`.

use crate::ir::{VariableSchema, VariableValue};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user '{0}' already exists")]
    Conflict(String),
    #[error("user '{0}' not found")]
    NotFound(String),
    #[error("wrong password for user '{0}'")]
    WrongPassword(String),
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),
    #[error("invalid value: {0}")]
    InvalidValue(String),
    #[error("storage I/O failure: {0}")]
    Io(String),
    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    Sql(#[from] sqlx::Error),
}

/// A read-modify-write step for [`VariableStore::update`]: given the
/// variable's current value, produce its next value.
pub type Mutator = Box<dyn FnOnce(&VariableValue) -> Result<VariableValue, StoreError> + Send>;

/// One row of `user_variable`, keyed by `username`.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistentUserRecord {
    pub username: String,
    pub passwd: String,
    pub values: std::collections::HashMap<String, VariableValue>,
}

impl PersistentUserRecord {
    pub fn defaults(schema: &VariableSchema, username: &str, passwd: &str) -> Self {
        let values = schema
            .scripted_names()
            .map(|name| (name.to_string(), schema.default_of(name).unwrap().clone()))
            .collect();
        PersistentUserRecord {
            username: username.to_string(),
            passwd: passwd.to_string(),
            values,
        }
    }
}

/// Persistence trait for `PersistentUserRecord`s. Every method acquires the
/// backend's exclusive lock for its full duration - implementations must
/// not expose any finer-grained concurrency.
///
/// `read` and `write` are separate acquisitions and must not be chained by
/// a caller to simulate a read-modify-write: two interleaved callers would
/// both read the old value and one write would clobber the other. `update`
/// is the only primitive that performs a read-modify-write atomically,
/// holding the lock across both halves.
#[async_trait]
pub trait VariableStore: Send + Sync {
    async fn lookup(&self, username: &str) -> Result<Option<PersistentUserRecord>, StoreError>;

    async fn insert_default(&self, username: &str, passwd: &str) -> Result<(), StoreError>;

    async fn verify(&self, username: &str, passwd: &str) -> Result<(), StoreError>;

    async fn read(&self, username: &str, var: &str) -> Result<VariableValue, StoreError>;

    async fn write(&self, username: &str, var: &str, value: VariableValue) -> Result<(), StoreError>;

    /// Reads `var`, applies `mutate` to its current value, and writes the
    /// result back, all under one lock acquisition. Returns the new value.
    async fn update(&self, username: &str, var: &str, mutate: Mutator) -> Result<VariableValue, StoreError>;
}
