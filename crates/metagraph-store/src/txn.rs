//! Write transactions.
//!
//! A [`Transaction`] bundles one or more statements that commit atomically.
//! Every statement carries a compare-and-swap guard on the head version of
//! the document it touches, so a transaction prepared from a stale read
//! aborts as a whole with [`StoreError::Conflict`](crate::StoreError::Conflict)
//! instead of clobbering a concurrent writer.

use serde::{Deserialize, Serialize};

use metagraph_types::DocRef;

use crate::Document;

/// Expected head-version guard for a single statement.
///
/// - `Some(0)`: the document must not exist yet (creation).
/// - `Some(v)`: the current head version must be exactly `v`.
/// - `None`: unconditional write.
pub type ExpectedVersion = Option<u64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WriteStatement {
    /// Append a new version of a document.
    Put {
        document: Document,
        expected_version: ExpectedVersion,
    },
    /// Physically remove a document and its whole history.
    Evict {
        reference: DocRef,
        expected_version: ExpectedVersion,
    },
}

impl WriteStatement {
    pub fn reference(&self) -> &DocRef {
        match self {
            WriteStatement::Put { document, .. } => &document.reference,
            WriteStatement::Evict { reference, .. } => reference,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    statements: Vec<WriteStatement>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(mut self, document: Document, expected_version: ExpectedVersion) -> Self {
        self.statements.push(WriteStatement::Put { document, expected_version });
        self
    }

    pub fn evict(mut self, reference: DocRef, expected_version: ExpectedVersion) -> Self {
        self.statements.push(WriteStatement::Evict { reference, expected_version });
        self
    }

    pub fn push(&mut self, statement: WriteStatement) {
        self.statements.push(statement);
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn statements(&self) -> &[WriteStatement] {
        &self.statements
    }

    pub fn into_statements(self) -> Vec<WriteStatement> {
        self.statements
    }
}

/// Handle to a submitted transaction, used to await durability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxToken(pub u64);

impl std::fmt::Display for TxToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tx:{}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use chrono::Utc;
    use metagraph_types::InstanceKind;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_transaction_builder_preserves_order() {
        let document = Document {
            reference: DocRef::entity("g1"),
            kind: InstanceKind::Entity,
            version: 1,
            valid_time: Utc::now(),
            body: json!({}),
        };
        let txn = Transaction::new()
            .put(document, Some(0))
            .evict(DocRef::relationship("r1"), None);

        assert_eq!(txn.len(), 2);
        assert_eq!(txn.statements()[0].reference().as_str(), "e_g1");
        assert_eq!(txn.statements()[1].reference().as_str(), "r_r1");
    }
}
