//! Surrogate ID allocation
//!
//! IDs of an entity type are handed out from its counter in the
//! [`PkStore`]. A file reserves one ID per data row up front and the counter
//! moves past the whole range once the file is done, whether or not every
//! row made it in. Failed rows leave gaps; IDs are never reused.

use crate::store::{PkStore, StoreError};

/// IDs `[start, start + len)` reserved for the rows of one file
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a reservation must be released to advance the counter"]
pub struct IdReservation {
    entity: String,
    start: i64,
    len: usize,
}

impl IdReservation {
    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// ID of the row at a 0-based file position
    pub fn id_at(&self, position: usize) -> i64 {
        self.start + position as i64
    }

    /// First ID after the range
    pub fn end(&self) -> i64 {
        self.start + self.len as i64
    }
}

impl PkStore {
    /// Next ID the counter of a type would hand out
    pub fn next_id(&mut self, entity: &str) -> Result<i64, StoreError> {
        Ok(self.ensure_loaded(entity)?.next_id)
    }

    /// Move the counter forward by `count` and return its new value
    pub fn advance(&mut self, entity: &str, count: usize) -> Result<i64, StoreError> {
        let state = self.ensure_loaded(entity)?;
        state.next_id += count as i64;
        Ok(state.next_id)
    }

    /// Reserve one ID per row of a file without moving the counter yet
    pub fn reserve(&mut self, entity: &str, rows: usize) -> Result<IdReservation, StoreError> {
        let start = self.next_id(entity)?;
        Ok(IdReservation {
            entity: entity.to_string(),
            start,
            len: rows,
        })
    }

    /// Move the counter past a reservation once all of its rows were
    /// attempted. The counter never moves backwards.
    pub fn release(&mut self, reservation: IdReservation) -> Result<i64, StoreError> {
        let state = self.ensure_loaded(&reservation.entity)?;
        state.next_id = state.next_id.max(reservation.end());
        Ok(state.next_id)
    }
}
