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

//! Column-family registry used during batch replay.
//!
//! Replay resolves each record's column-family id through a stateful
//! cursor: `seek` positions the cursor, and the other accessors read the
//! column family it is on. The cursor must not be shared between
//! concurrent inserters; each gets its own instance over the shared set.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use basalt_core::ColumnFamilyId;

use crate::memtable::{MemTable, MemTableOptions, SkipListMemTable};

/// Stateful cursor over the column families a batch may target.
pub trait ColumnFamilyMemTables {
    /// Position the cursor on `column_family`. Returns false when the id
    /// is not registered; the cursor is then unchanged.
    fn seek(&mut self, column_family: ColumnFamilyId) -> bool;

    /// Memtable of the column family the cursor is on.
    fn mem_table(&self) -> Arc<dyn MemTable>;

    /// WAL number recorded for the column family the cursor is on. Data up
    /// to and including this log has already been flushed.
    fn log_number(&self) -> u64;

    /// Id of the column family the cursor is on.
    fn current(&self) -> ColumnFamilyId;

    /// Whether the column family's table format can store range tombstones.
    fn supports_range_deletion(&self) -> bool;
}

/// One registered column family.
pub struct ColumnFamilyData {
    id: ColumnFamilyId,
    name: String,
    log_number: AtomicU64,
    mem: Arc<dyn MemTable>,
    range_deletion_supported: bool,
}

impl ColumnFamilyData {
    pub fn new(id: ColumnFamilyId, name: impl Into<String>, mem: Arc<dyn MemTable>) -> Self {
        Self {
            id,
            name: name.into(),
            log_number: AtomicU64::new(0),
            mem,
            range_deletion_supported: true,
        }
    }

    /// Mark the column family's table format as unable to store range
    /// tombstones.
    pub fn without_range_deletion(mut self) -> Self {
        self.range_deletion_supported = false;
        self
    }

    pub fn id(&self) -> ColumnFamilyId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mem_table(&self) -> Arc<dyn MemTable> {
        Arc::clone(&self.mem)
    }

    pub fn log_number(&self) -> u64 {
        self.log_number.load(Ordering::Relaxed)
    }

    /// Record that everything up to `log_number` is flushed for this
    /// column family.
    pub fn set_log_number(&self, log_number: u64) {
        self.log_number.store(log_number, Ordering::Relaxed);
    }

    pub fn range_deletion_supported(&self) -> bool {
        self.range_deletion_supported
    }
}

/// The shared set of column families.
#[derive(Default)]
pub struct ColumnFamilySet {
    families: RwLock<HashMap<ColumnFamilyId, Arc<ColumnFamilyData>>>,
}

impl ColumnFamilySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set with a default column family backed by a fresh skip-list
    /// memtable.
    pub fn with_default(options: MemTableOptions) -> Self {
        let set = Self::new();
        set.create_column_family(0, "default", options);
        set
    }

    /// Register a new column family backed by a skip-list memtable and
    /// return its descriptor.
    pub fn create_column_family(
        &self,
        id: ColumnFamilyId,
        name: impl Into<String>,
        options: MemTableOptions,
    ) -> Arc<ColumnFamilyData> {
        let mem: Arc<dyn MemTable> = Arc::new(SkipListMemTable::new(options));
        let data = Arc::new(ColumnFamilyData::new(id, name, mem));
        self.families.write().insert(id, Arc::clone(&data));
        data
    }

    /// Register an externally built descriptor.
    pub fn add_column_family(&self, data: Arc<ColumnFamilyData>) {
        self.families.write().insert(data.id(), data);
    }

    pub fn get(&self, id: ColumnFamilyId) -> Option<Arc<ColumnFamilyData>> {
        self.families.read().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.families.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.read().is_empty()
    }
}

/// Default cursor implementation over a [`ColumnFamilySet`].
pub struct ColumnFamilyMemTablesImpl {
    set: Arc<ColumnFamilySet>,
    current: Option<Arc<ColumnFamilyData>>,
}

impl ColumnFamilyMemTablesImpl {
    pub fn new(set: Arc<ColumnFamilySet>) -> Self {
        Self { set, current: None }
    }

    fn current_data(&self) -> &Arc<ColumnFamilyData> {
        self.current
            .as_ref()
            .expect("seek() must position the cursor before column family accessors are used")
    }
}

impl ColumnFamilyMemTables for ColumnFamilyMemTablesImpl {
    fn seek(&mut self, column_family: ColumnFamilyId) -> bool {
        match self.set.get(column_family) {
            Some(data) => {
                self.current = Some(data);
                true
            }
            None => false,
        }
    }

    fn mem_table(&self) -> Arc<dyn MemTable> {
        self.current_data().mem_table()
    }

    fn log_number(&self) -> u64 {
        self.current_data().log_number()
    }

    fn current(&self) -> ColumnFamilyId {
        self.current_data().id()
    }

    fn supports_range_deletion(&self) -> bool {
        self.current_data().range_deletion_supported()
    }
}
