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

//! Queue of column families whose memtable is due for a flush.
//!
//! Deduplication is not this queue's job: the memtable's
//! `mark_flush_scheduled` gate guarantees each memtable is enqueued at
//! most once, so whatever lands here is already unique.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tracing::debug;

use basalt_core::ColumnFamilyId;

#[derive(Debug, Default)]
pub struct FlushScheduler {
    queue: Mutex<VecDeque<ColumnFamilyId>>,
}

impl FlushScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a column family for flushing.
    pub fn schedule_flush(&self, column_family: ColumnFamilyId) {
        debug!(column_family, "memtable crossed flush threshold");
        self.queue.lock().push_back(column_family);
    }

    /// Pop the next column family due for a flush.
    pub fn take_next_flush(&self) -> Option<ColumnFamilyId> {
        self.queue.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub fn clear(&self) {
        self.queue.lock().clear();
    }
}
