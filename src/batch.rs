//! In-memory row buffer shared by every wallet of one run.

use crate::schemas::{NormalizedRow, TransferKind};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BatchError {
    #[error("Cannot append {found} rows to a {expected} batch")]
    KindMismatch {
        expected: TransferKind,
        found: TransferKind,
    },
}

/// Rows of one transfer kind in insertion order (wallet order, then page
/// order). Grows only by appending; nothing is deduplicated.
#[derive(Debug, Clone)]
pub struct Batch {
    kind: TransferKind,
    rows: Vec<NormalizedRow>,
}

impl Batch {
    pub fn new(kind: TransferKind) -> Self {
        Self {
            kind,
            rows: Vec::new(),
        }
    }

    pub fn kind(&self) -> TransferKind {
        self.kind
    }

    pub fn rows(&self) -> &[NormalizedRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append rows, returning the new batch length. All-or-nothing: a row of
    /// the wrong kind rejects the whole slice.
    pub fn append(&mut self, rows: Vec<NormalizedRow>) -> Result<usize, BatchError> {
        if let Some(row) = rows.iter().find(|r| r.kind() != self.kind) {
            return Err(BatchError::KindMismatch {
                expected: self.kind,
                found: row.kind(),
            });
        }
        self.rows.extend(rows);
        Ok(self.rows.len())
    }
}
