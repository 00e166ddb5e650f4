//! In-memory document store for testing and development.
//!
//! Keeps the full version chain of every document, so snapshots, history
//! cursors and valid-time resolution behave like a persistent bitemporal
//! backend. Transactions commit eagerly; `await_commit` is a no-op.

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use metagraph_types::{DocRef, InstanceKind, PropertyValue};

use crate::query::{Query, QueryOrder};
use crate::txn::{Transaction, TxToken, WriteStatement};
use crate::{Document, DocumentStore, HistoryCursor, HistoryDirection, Snapshot};
use crate::{StoreError, StoreResult};

/// One committed version of one document.
#[derive(Debug, Clone)]
struct StoredVersion {
    kind: InstanceKind,
    version: u64,
    valid_time: DateTime<Utc>,
    /// Sequence of the transaction that wrote this version.
    tx_seq: u64,
    body: serde_json::Value,
}

struct Inner {
    /// Version chains by document reference, each ordered by commit.
    chains: BTreeMap<DocRef, Vec<StoredVersion>>,
    /// Sequence of the last committed transaction.
    tx_seq: u64,
}

/// In-memory [`DocumentStore`] implementation.
#[derive(Clone)]
pub struct MemoryStore {
    data: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(Inner { chains: BTreeMap::new(), tx_seq: 0 })),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    /// Head version number of a chain, zero when the document is absent.
    fn head_version(&self, reference: &DocRef) -> u64 {
        self.chains
            .get(reference)
            .and_then(|chain| chain.iter().map(|v| v.version).max())
            .unwrap_or(0)
    }

    fn check_guard(&self, reference: &DocRef, expected: Option<u64>) -> StoreResult<()> {
        let Some(expected) = expected else {
            return Ok(());
        };
        if self.head_version(reference) != expected {
            return Err(StoreError::Conflict);
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn snapshot(&self) -> StoreResult<Box<dyn Snapshot>> {
        let inner = self.data.read().await;
        Ok(Box::new(MemorySnapshot {
            data: Arc::clone(&self.data),
            tx_seq: inner.tx_seq,
            valid_time: Utc::now(),
        }))
    }

    async fn snapshot_at(&self, valid_time: DateTime<Utc>) -> StoreResult<Box<dyn Snapshot>> {
        let inner = self.data.read().await;
        Ok(Box::new(MemorySnapshot {
            data: Arc::clone(&self.data),
            tx_seq: inner.tx_seq,
            valid_time,
        }))
    }

    async fn submit(&self, txn: Transaction) -> StoreResult<TxToken> {
        let mut inner = self.data.write().await;

        // Validate every guard before touching anything, so a failed
        // transaction leaves no partial writes behind.
        for statement in txn.statements() {
            match statement {
                WriteStatement::Put { document, expected_version } => {
                    inner.check_guard(&document.reference, *expected_version)?;
                }
                WriteStatement::Evict { reference, expected_version } => {
                    inner.check_guard(reference, *expected_version)?;
                }
            }
        }

        inner.tx_seq += 1;
        let seq = inner.tx_seq;
        debug!(tx_seq = seq, statements = txn.len(), "Committing transaction");
        for statement in txn.into_statements() {
            match statement {
                WriteStatement::Put { document, .. } => {
                    let chain = inner.chains.entry(document.reference.clone()).or_default();
                    chain.push(StoredVersion {
                        kind: document.kind,
                        version: document.version,
                        valid_time: document.valid_time,
                        tx_seq: seq,
                        body: document.body,
                    });
                }
                WriteStatement::Evict { reference, .. } => {
                    inner.chains.remove(&reference);
                }
            }
        }
        Ok(TxToken(seq))
    }

    async fn await_commit(&self, token: TxToken) -> StoreResult<()> {
        let inner = self.data.read().await;
        if token.0 > inner.tx_seq {
            return Err(StoreError::not_found(format!("unknown transaction {token}")));
        }
        Ok(())
    }

    async fn history(
        &self,
        reference: &DocRef,
        order: HistoryDirection,
    ) -> StoreResult<Box<dyn HistoryCursor>> {
        let inner = self.data.read().await;
        let mut versions: Vec<Document> = inner
            .chains
            .get(reference)
            .map(|chain| {
                chain
                    .iter()
                    .map(|v| stored_to_document(reference, v))
                    .collect()
            })
            .unwrap_or_default();
        versions.sort_by_key(|d| (d.valid_time, d.version));
        if order == HistoryDirection::Backward {
            versions.reverse();
        }
        Ok(Box::new(MemoryHistoryCursor { remaining: versions.into() }))
    }
}

fn stored_to_document(reference: &DocRef, stored: &StoredVersion) -> Document {
    Document {
        reference: reference.clone(),
        kind: stored.kind,
        version: stored.version,
        valid_time: stored.valid_time,
        body: stored.body.clone(),
    }
}

// ===== SNAPSHOT =====

struct MemorySnapshot {
    data: Arc<RwLock<Inner>>,
    /// Transactions committed after this sequence are invisible.
    tx_seq: u64,
    valid_time: DateTime<Utc>,
}

impl MemorySnapshot {
    /// Resolve the version of a chain visible at this snapshot: among the
    /// versions committed by then and valid by then, the one with the
    /// latest valid time, breaking ties on commit order.
    fn resolve(&self, reference: &DocRef, chain: &[StoredVersion]) -> Option<Document> {
        chain
            .iter()
            .filter(|v| v.tx_seq <= self.tx_seq && v.valid_time <= self.valid_time)
            .max_by_key(|v| (v.valid_time, v.tx_seq))
            .map(|v| stored_to_document(reference, v))
    }
}

#[async_trait]
impl Snapshot for MemorySnapshot {
    fn valid_time(&self) -> DateTime<Utc> {
        self.valid_time
    }

    async fn get(&self, reference: &DocRef) -> StoreResult<Option<Document>> {
        let inner = self.data.read().await;
        Ok(inner
            .chains
            .get(reference)
            .and_then(|chain| self.resolve(reference, chain)))
    }

    async fn search(&self, query: &Query) -> StoreResult<Vec<Document>> {
        let inner = self.data.read().await;
        let mut results = Vec::new();
        for (reference, chain) in &inner.chains {
            let Some(document) = self.resolve(reference, chain) else {
                continue;
            };
            if query.matches(&document)? {
                results.push(document);
            }
        }
        drop(inner);
        sort_results(&mut results, &query.order);
        Ok(results)
    }
}

fn sort_results(results: &mut [Document], order: &QueryOrder) {
    match order {
        QueryOrder::ByRef => results.sort_by(|a, b| a.reference.cmp(&b.reference)),
        QueryOrder::ByField { field, ascending } => {
            results.sort_by(|a, b| {
                let va = field_value(a, field);
                let vb = field_value(b, field);
                // Documents without the field sort last either way.
                let ordering = match (va, vb) {
                    (Some(x), Some(y)) => x.compare(&y),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                };
                let ordering = if *ascending { ordering } else { ordering.reverse() };
                ordering.then_with(|| a.reference.cmp(&b.reference))
            });
        }
    }
}

fn field_value(document: &Document, field: &str) -> Option<PropertyValue> {
    document
        .body
        .get(field)
        .and_then(|raw| serde_json::from_value(raw.clone()).ok())
}

// ===== HISTORY CURSOR =====

struct MemoryHistoryCursor {
    remaining: VecDeque<Document>,
}

#[async_trait]
impl HistoryCursor for MemoryHistoryCursor {
    async fn next(&mut self) -> StoreResult<Option<Document>> {
        Ok(self.remaining.pop_front())
    }
}

// ===== TESTS =====
