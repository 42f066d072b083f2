//! Ready-made row observer that keeps every row it sees.

use std::sync::{Mutex, PoisonError};

use hopline_core::types::Row;
use hopline_steps::RowListener;

#[derive(Debug, Default)]
pub struct RowCollector {
    read: Mutex<Vec<Row>>,
    written: Mutex<Vec<Row>>,
}

impl RowCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows the observed unit read, in read order.
    pub fn rows_read(&self) -> Vec<Row> {
        self.read
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Rows the observed unit wrote, in write order.
    pub fn rows_written(&self) -> Vec<Row> {
        self.written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn written_count(&self) -> usize {
        self.written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl RowListener for RowCollector {
    fn row_read(&self, row: &Row) {
        self.read
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(row.clone());
    }

    fn row_written(&self, row: &Row) {
        self.written
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(row.clone());
    }
}
