//! Version history retrieval.
//!
//! The store's history cursor walks backward (most recent first) and is
//! lazily evaluated, so the accessor stops pulling as soon as it has
//! included one version valid at-or-before the earliest bound; older
//! versions are never materialized. A forward request reverses the
//! accumulated list once instead of re-querying. Paging is applied after
//! the eligible history is known.

use metagraph_store::{Document, DocumentStore, HistoryDirection};
use metagraph_types::{DocRef, HistoryOrder, HistoryRange};

use crate::error::RepositoryResult;
use crate::query::apply_window;

/// The eligible version documents of one instance, ordered and paged per
/// the request.
pub async fn instance_history(
    store: &dyn DocumentStore,
    reference: &DocRef,
    range: &HistoryRange,
    order: HistoryOrder,
    max_page_size: usize,
) -> RepositoryResult<Vec<Document>> {
    let mut cursor = store.history(reference, HistoryDirection::Backward).await?;

    let mut versions = Vec::new();
    while let Some(document) = cursor.next().await? {
        let at_or_before_bound =
            range.earliest.is_some_and(|earliest| document.valid_time <= earliest);
        versions.push(document);
        // The version current at the bound is the last interesting one.
        if at_or_before_bound {
            break;
        }
    }

    if order == HistoryOrder::Forward {
        versions.reverse();
    }
    Ok(apply_window(versions, range.offset, range.page_size, max_page_size))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use chrono::{DateTime, Duration, Utc};
    use metagraph_store::{fields, MemoryStore, Transaction};
    use metagraph_types::InstanceKind;
    use serde_json::json;

    use super::*;

    async fn seeded_store(times: &[DateTime<Utc>]) -> (MemoryStore, DocRef) {
        let store = MemoryStore::new();
        let reference = DocRef::entity("g1");
        let mut txn = Transaction::new();
        for (index, at) in times.iter().enumerate() {
            let version = index as u64 + 1;
            txn = txn.put(
                Document {
                    reference: reference.clone(),
                    kind: InstanceKind::Entity,
                    version,
                    valid_time: *at,
                    body: json!({ fields::GUID: "g1", fields::VERSION: version }),
                },
                None,
            );
        }
        store.submit(txn).await.unwrap();
        (store, reference)
    }

    fn versions(documents: &[Document]) -> Vec<u64> {
        documents.iter().map(|d| d.version).collect()
    }

    #[tokio::test]
    async fn test_backward_is_most_recent_first() {
        let t0 = Utc::now();
        let times: Vec<_> = (0..3).map(|i| t0 + Duration::seconds(i)).collect();
        let (store, reference) = seeded_store(&times).await;

        let history = instance_history(
            &store,
            &reference,
            &HistoryRange::default(),
            HistoryOrder::Backward,
            100,
        )
        .await
        .unwrap();
        assert_eq!(versions(&history), vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_forward_reverses_once() {
        let t0 = Utc::now();
        let times: Vec<_> = (0..3).map(|i| t0 + Duration::seconds(i)).collect();
        let (store, reference) = seeded_store(&times).await;

        let history = instance_history(
            &store,
            &reference,
            &HistoryRange::default(),
            HistoryOrder::Forward,
            100,
        )
        .await
        .unwrap();
        assert_eq!(versions(&history), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_earliest_bound_stops_early_but_includes_boundary() {
        let t0 = Utc::now();
        let times: Vec<_> = (0..4).map(|i| t0 + Duration::seconds(10 * i)).collect();
        let (store, reference) = seeded_store(&times).await;

        // Bound falls between versions 2 and 3; version 2 was current at
        // the bound and must be included, version 1 must not.
        let range = HistoryRange {
            earliest: Some(t0 + Duration::seconds(15)),
            ..HistoryRange::default()
        };
        let history =
            instance_history(&store, &reference, &range, HistoryOrder::Backward, 100)
                .await
                .unwrap();
        assert_eq!(versions(&history), vec![4, 3, 2]);
    }

    #[tokio::test]
    async fn test_paging_is_deterministic() {
        let t0 = Utc::now();
        let times: Vec<_> = (0..2).map(|i| t0 + Duration::seconds(i)).collect();
        let (store, reference) = seeded_store(&times).await;

        let page = |offset, page_size| HistoryRange { earliest: None, offset, page_size };

        let first = instance_history(&store, &reference, &page(0, 1), HistoryOrder::Forward, 100)
            .await
            .unwrap();
        let second = instance_history(&store, &reference, &page(1, 1), HistoryOrder::Forward, 100)
            .await
            .unwrap();
        let both = instance_history(&store, &reference, &page(0, 2), HistoryOrder::Forward, 100)
            .await
            .unwrap();

        let mut combined = versions(&first);
        combined.extend(versions(&second));
        assert_eq!(combined, versions(&both));
    }

    #[tokio::test]
    async fn test_zero_page_size_uses_configured_max() {
        let t0 = Utc::now();
        let times: Vec<_> = (0..5).map(|i| t0 + Duration::seconds(i)).collect();
        let (store, reference) = seeded_store(&times).await;

        let history = instance_history(
            &store,
            &reference,
            &HistoryRange::default(),
            HistoryOrder::Backward,
            2,
        )
        .await
        .unwrap();
        assert_eq!(history.len(), 2);
    }
}
