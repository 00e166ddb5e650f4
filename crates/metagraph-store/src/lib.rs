//! Bitemporal document store abstraction.
//!
//! Instances are persisted as flat JSON documents keyed by [`DocRef`].
//! Backends keep every superseded version of a document, distinguishing
//! valid time (when a version became effective in the domain) from
//! transaction time (when the backend recorded it). Reads go through
//! point-in-time [`Snapshot`]s, writes through atomic [`Transaction`]s
//! with per-statement compare-and-swap guards.

pub mod error;
pub mod fields;
pub mod memory;
pub mod query;
pub mod txn;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use metagraph_types::{DocRef, InstanceKind};

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use query::{ConditionTree, Predicate, PropertyCondition, Query, QueryOrder, QueryTarget};
pub use txn::{ExpectedVersion, Transaction, TxToken, WriteStatement};

// ===== DOCUMENT =====

/// One version of a stored instance.
///
/// The body is a flat JSON object whose field names follow the layout in
/// [`fields`]; `version` and `valid_time` are mirrored out of the body so
/// backends can evaluate version guards and temporal resolution without
/// parsing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub reference: DocRef,
    pub kind: InstanceKind,
    pub version: u64,
    pub valid_time: DateTime<Utc>,
    pub body: serde_json::Value,
}

// ===== TRAITS =====

/// A consistent point-in-time view of the store.
///
/// Every read through one snapshot sees the same database state; writes
/// submitted after the snapshot was opened are invisible to it.
#[async_trait]
pub trait Snapshot: Send + Sync {
    /// The valid time this snapshot resolves documents at.
    fn valid_time(&self) -> DateTime<Utc>;

    /// Fetch the version of a document visible at this snapshot.
    async fn get(&self, reference: &DocRef) -> StoreResult<Option<Document>>;

    /// Run a query against the documents visible at this snapshot,
    /// returning matches in the query's ordering.
    async fn search(&self, query: &Query) -> StoreResult<Vec<Document>>;
}

/// Lazy walk over the full version history of one document.
#[async_trait]
pub trait HistoryCursor: Send {
    /// Yield the next version, or `None` when the history is exhausted.
    async fn next(&mut self) -> StoreResult<Option<Document>>;
}

/// The storage backend contract.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Open a snapshot of the current state, resolving documents at the
    /// present valid time.
    async fn snapshot(&self) -> StoreResult<Box<dyn Snapshot>>;

    /// Open a snapshot resolving documents as they were valid at the
    /// given moment.
    async fn snapshot_at(&self, valid_time: DateTime<Utc>) -> StoreResult<Box<dyn Snapshot>>;

    /// Submit a transaction. All statements commit atomically or the
    /// whole transaction fails with [`StoreError::Conflict`].
    async fn submit(&self, txn: Transaction) -> StoreResult<TxToken>;

    /// Block until the given transaction is durable.
    async fn await_commit(&self, token: TxToken) -> StoreResult<()>;

    /// Open a cursor over every stored version of a document, in the
    /// given direction over valid time.
    async fn history(
        &self,
        reference: &DocRef,
        order: HistoryDirection,
    ) -> StoreResult<Box<dyn HistoryCursor>>;
}

/// Direction a history cursor walks valid time in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryDirection {
    /// Oldest version first.
    Forward,
    /// Newest version first.
    Backward,
}
