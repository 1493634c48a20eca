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

//! BasaltDB Storage Layer: write-batch core
//!
//! The write batch is the single structure that flows through every write
//! path of the store: a client mutation, a WAL payload, a replication unit
//! and a recovery fragment are all the same bytes. This crate owns that
//! structure end to end:
//!
//! - **Binary format** (`format`, `coding`): the 12-byte header plus
//!   tagged, length-prefixed records; tag bytes are frozen on-disk values.
//! - **WriteBatch** (`write_batch`): typed appends grown transactionally
//!   under an optional size bound, save points with truncation-based
//!   rollback, two-phase-commit markers, lazy content classification, a
//!   WAL-termination prefix, and visitor iteration.
//! - **Replay** (`mem_inserter`): the visitor that applies a batch to
//!   memtables with exact sequence-number assignment, per-column-family
//!   log cutoffs, in-place updates, merge folding, flush scheduling and
//!   recovery-time prepared-transaction reconstruction.
//! - **Collaborator surfaces** (`memtable`, `column_family`, `engine`,
//!   `flush_scheduler`, `merge`, `stats`): the narrow interfaces replay
//!   depends on, with default implementations suitable for embedding and
//!   testing.

pub mod coding;
pub mod column_family;
pub mod engine;
pub mod flush_scheduler;
pub mod format;
pub mod mem_inserter;
pub mod memtable;
pub mod merge;
pub mod stats;
pub mod write_batch;

pub use column_family::{
    ColumnFamilyData, ColumnFamilyMemTables, ColumnFamilyMemTablesImpl, ColumnFamilySet,
};
pub use engine::{KvEngine, RecoveredTransaction, RecoveredTransactions};
pub use flush_scheduler::FlushScheduler;
pub use format::{Record, ValueType, HEADER_SIZE};
pub use mem_inserter::{insert_into, InsertContext, InsertOutcome, MemTableInserter};
pub use memtable::{
    InplaceCallback, MemTable, MemTableOptions, MemTablePostProcessInfo, SkipListMemTable,
    UpdateStatus,
};
pub use merge::{ConcatMergeOperator, MergeOperator};
pub use stats::Statistics;
pub use write_batch::{appended_byte_size, SavePoint, WriteBatch, WriteBatchHandler};
