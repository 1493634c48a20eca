// SPDX-License-Identifier: AGPL-3.0-or-later
// BasaltDB - Embedded LSM Key-Value Store
// Copyright (C) 2026 Sushanth Reddy Vanagala (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Engine-side surface the batch replay path leans on.
//!
//! Replay only needs a narrow slice of the surrounding store: snapshot
//! reads (for in-place callbacks and merge folding), the two-phase-commit
//! capability switch, and the recovered-transaction table that collects
//! prepare sections found in the WAL until their commit or rollback marker
//! shows up.

use std::sync::Arc;

use dashmap::DashMap;

use basalt_core::{ColumnFamilyId, SequenceNumber};

use crate::write_batch::WriteBatch;

/// A prepare section rebuilt from the WAL, waiting for its commit or
/// rollback marker.
#[derive(Debug)]
pub struct RecoveredTransaction {
    /// The transaction id from the end-prepare marker.
    pub name: Vec<u8>,
    /// WAL number the prepare section was read from. Inserts replayed at
    /// commit reference this log so it outlives the data until flush.
    pub log_number: u64,
    /// The rebuilt mutations.
    pub batch: WriteBatch,
}

/// The store as seen from batch replay.
pub trait KvEngine: Send + Sync {
    /// Whether the store was opened with two-phase commit support.
    fn allow_two_phase_commit(&self) -> bool;

    /// Read `key` in `column_family` as of `snapshot`.
    fn get(
        &self,
        column_family: ColumnFamilyId,
        key: &[u8],
        snapshot: SequenceNumber,
    ) -> Option<Vec<u8>>;

    /// Park a rebuilt prepare section under `xid` until its outcome marker
    /// is replayed.
    fn insert_recovered_transaction(&self, log_number: u64, xid: &[u8], batch: WriteBatch);

    /// Look up a parked prepare section.
    fn recovered_transaction(&self, xid: &[u8]) -> Option<Arc<RecoveredTransaction>>;

    /// Drop a parked prepare section.
    fn remove_recovered_transaction(&self, xid: &[u8]);
}

/// Table of parked prepare sections, keyed by transaction id.
///
/// Recovery is single-threaded, but the table outlives recovery (a
/// transaction layer inspects it afterwards), so it is shared-map based.
#[derive(Debug, Default)]
pub struct RecoveredTransactions {
    table: DashMap<Vec<u8>, Arc<RecoveredTransaction>>,
}

impl RecoveredTransactions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, log_number: u64, xid: &[u8], batch: WriteBatch) {
        self.table.insert(
            xid.to_vec(),
            Arc::new(RecoveredTransaction {
                name: xid.to_vec(),
                log_number,
                batch,
            }),
        );
    }

    pub fn get(&self, xid: &[u8]) -> Option<Arc<RecoveredTransaction>> {
        self.table.get(xid).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, xid: &[u8]) {
        self.table.remove(xid);
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
