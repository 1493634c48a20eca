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

//! Batch replay into live memtables.
//!
//! [`MemTableInserter`] walks a batch and applies each record to the
//! memtable of its column family, assigning one sequence number per
//! counted record starting from the batch's base sequence.
//!
//! The sequence must stay aligned with the record's position in the WAL,
//! so a record consumes its sequence number even when nothing is written:
//! a missing column family under the ignore flag, or a column family whose
//! log number says the data was already flushed, still advance by one.
//!
//! During recovery the inserter doubles as the two-phase-commit rebuilder.
//! Between a begin-prepare and end-prepare marker every mutation is
//! re-serialized into a side batch instead of touching memtables; the
//! finished batch is parked in the engine's recovered-transaction table
//! under its xid. A later commit marker replays the parked batch through
//! this same inserter (the nested iteration runs with `rebuilding_trx`
//! detached, so the mutations land in memtables at the commit position),
//! and a rollback marker just drops it. Outside recovery all four markers
//! are no-ops: prepared mutations were inserted directly when the prepare
//! section was first written.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use basalt_core::{BasaltError, ColumnFamilyId, Result, SequenceNumber};

use crate::column_family::ColumnFamilyMemTables;
use crate::engine::KvEngine;
use crate::flush_scheduler::FlushScheduler;
use crate::format::ValueType;
use crate::memtable::{MemTable, MemTablePostProcessInfo, UpdateStatus};
use crate::write_batch::{WriteBatch, WriteBatchHandler};

/// How a batch replay should behave; everything is optional except the
/// column-family registry passed alongside.
pub struct InsertContext<'a> {
    /// Queue to notify when a memtable crosses its flush threshold.
    pub flush_scheduler: Option<&'a FlushScheduler>,
    /// Treat records against unknown column families as filtered instead
    /// of failing. Used when replaying logs that predate a drop.
    pub ignore_missing_column_families: bool,
    /// Non-zero while replaying WAL `recovering_log_number` during
    /// startup; zero on the live write path.
    pub recovering_log_number: u64,
    /// The surrounding store, when available. Needed for in-place update
    /// callbacks, merge folding, and prepared-transaction reconstruction.
    pub db: Option<&'a dyn KvEngine>,
    /// Several inserters may target the same memtable concurrently; defers
    /// per-memtable bookkeeping to one `post_process` call.
    pub concurrent_memtable_writes: bool,
    /// WAL number that live prepared writes must pin on every memtable
    /// they touch; zero otherwise.
    pub log_number_ref: u64,
}

impl Default for InsertContext<'_> {
    fn default() -> Self {
        Self {
            flush_scheduler: None,
            ignore_missing_column_families: false,
            recovering_log_number: 0,
            db: None,
            concurrent_memtable_writes: false,
            log_number_ref: 0,
        }
    }
}

/// What a replay reported back.
#[derive(Debug, Clone, Copy)]
pub struct InsertOutcome {
    /// One past the last sequence number consumed.
    pub next_sequence: SequenceNumber,
    /// Whether any record survived filtering (or a prepare section was
    /// rebuilt). During recovery this tells the caller the log still
    /// carried live data.
    pub has_valid_writes: bool,
}

/// Replay `batch` into the registry's memtables, starting at the batch's
/// base sequence number.
///
/// The registry cursor must not be shared with concurrent inserters; in
/// concurrent mode each caller passes its own clone.
pub fn insert_into<'a>(
    batch: &WriteBatch,
    cf_mems: &'a mut (dyn ColumnFamilyMemTables + 'a),
    ctx: InsertContext<'a>,
) -> Result<InsertOutcome> {
    let concurrent = ctx.concurrent_memtable_writes;
    let mut inserter = MemTableInserter::new(batch.sequence(), cf_mems, ctx);
    let result = batch.iterate(&mut inserter);
    if concurrent {
        inserter.post_process();
    }
    let outcome = InsertOutcome {
        next_sequence: inserter.sequence(),
        has_valid_writes: inserter.has_valid_writes(),
    };
    result?;
    Ok(outcome)
}

/// The visitor that applies batch records to memtables.
pub struct MemTableInserter<'a> {
    sequence: SequenceNumber,
    cf_mems: &'a mut dyn ColumnFamilyMemTables,
    flush_scheduler: Option<&'a FlushScheduler>,
    ignore_missing_column_families: bool,
    recovering_log_number: u64,
    log_number_ref: u64,
    db: Option<&'a dyn KvEngine>,
    concurrent_memtable_writes: bool,
    // allocated on first use; most write paths never need it
    post_info_map: Option<HashMap<usize, (Arc<dyn MemTable>, MemTablePostProcessInfo)>>,
    // prepare section being rebuilt during recovery
    rebuilding_trx: Option<WriteBatch>,
    has_valid_writes: bool,
}

impl<'a> MemTableInserter<'a> {
    pub fn new(
        sequence: SequenceNumber,
        cf_mems: &'a mut dyn ColumnFamilyMemTables,
        ctx: InsertContext<'a>,
    ) -> Self {
        Self {
            sequence,
            cf_mems,
            flush_scheduler: ctx.flush_scheduler,
            ignore_missing_column_families: ctx.ignore_missing_column_families,
            recovering_log_number: ctx.recovering_log_number,
            log_number_ref: ctx.log_number_ref,
            db: ctx.db,
            concurrent_memtable_writes: ctx.concurrent_memtable_writes,
            post_info_map: None,
            rebuilding_trx: None,
            has_valid_writes: false,
        }
    }

    /// Current sequence: the one the next counted record will use.
    pub fn sequence(&self) -> SequenceNumber {
        self.sequence
    }

    pub fn has_valid_writes(&self) -> bool {
        self.has_valid_writes
    }

    /// Bind the WAL number that subsequent inserts must pin (live
    /// two-phase-commit writes).
    pub fn set_log_number_ref(&mut self, log_number: u64) {
        self.log_number_ref = log_number;
    }

    /// Apply the per-memtable counters accumulated in concurrent mode.
    /// Called once after iteration.
    pub fn post_process(&mut self) {
        debug_assert!(self.concurrent_memtable_writes);
        if let Some(map) = self.post_info_map.take() {
            for (_, (mem, info)) in map {
                mem.batch_post_process(&info);
            }
        }
    }

    fn post_process_info(
        &mut self,
        mem: &Arc<dyn MemTable>,
    ) -> Option<&'_ mut MemTablePostProcessInfo> {
        if !self.concurrent_memtable_writes {
            return None;
        }
        let map = self.post_info_map.get_or_insert_with(HashMap::new);
        let key = Arc::as_ptr(mem) as *const () as usize;
        let slot = map
            .entry(key)
            .or_insert_with(|| (Arc::clone(mem), MemTablePostProcessInfo::default()));
        Some(&mut slot.1)
    }

    /// Position the registry cursor on `column_family`.
    ///
    /// `Ok(true)` means insert; `Ok(false)` means the record is filtered
    /// (unknown family under the ignore flag, or the family already holds
    /// this log's data) and only consumes its sequence number.
    fn seek_to_column_family(&mut self, column_family: ColumnFamilyId) -> Result<bool> {
        if !self.cf_mems.seek(column_family) {
            if self.ignore_missing_column_families {
                return Ok(false);
            }
            return Err(BasaltError::InvalidArgument(format!(
                "column family {column_family} referenced by write batch does not exist"
            )));
        }

        if self.recovering_log_number != 0 && self.recovering_log_number < self.cf_mems.log_number()
        {
            // the column family was flushed past this log in a previous
            // incarnation; applying again would double in-place updates
            debug!(
                column_family,
                recovering_log_number = self.recovering_log_number,
                cf_log_number = self.cf_mems.log_number(),
                "skipping record already covered by a flushed log"
            );
            return Ok(false);
        }

        self.has_valid_writes = true;

        if self.log_number_ref > 0 {
            self.cf_mems
                .mem_table()
                .ref_log_containing_prep_section(self.log_number_ref);
        }

        Ok(true)
    }

    fn check_memtable_full(&mut self) {
        if let Some(scheduler) = self.flush_scheduler {
            let mem = self.cf_mems.mem_table();
            // mark_flush_scheduled admits exactly one scheduler per
            // memtable, so no further dedup is needed
            if mem.should_schedule_flush() && mem.mark_flush_scheduled() {
                scheduler.schedule_flush(self.cf_mems.current());
            }
        }
    }

    fn delete_impl(&mut self, key: &[u8], value: &[u8], delete_type: ValueType) -> Result<()> {
        let seq = self.sequence;
        let mem = self.cf_mems.mem_table();
        let post = self.post_process_info(&mem);
        mem.add(seq, delete_type, key, value, post);
        self.sequence += 1;
        self.check_memtable_full();
        Ok(())
    }
}

impl WriteBatchHandler for MemTableInserter<'_> {
    fn put_cf(&mut self, column_family: ColumnFamilyId, key: &[u8], value: &[u8]) -> Result<()> {
        if let Some(trx) = self.rebuilding_trx.as_mut() {
            return trx.put_cf(column_family, key, value);
        }

        match self.seek_to_column_family(column_family) {
            Ok(true) => {}
            Ok(false) => {
                self.sequence += 1;
                return Ok(());
            }
            Err(err) => {
                self.sequence += 1;
                return Err(err);
            }
        }

        let seq = self.sequence;
        let mem = self.cf_mems.mem_table();
        let inplace_update = mem.options().inplace_update_support;
        let callback = mem.options().inplace_callback.clone();
        let statistics = mem.options().statistics.clone();

        if !inplace_update {
            let post = self.post_process_info(&mem);
            mem.add(seq, ValueType::Value, key, value, post);
        } else if callback.is_none() {
            debug_assert!(!self.concurrent_memtable_writes);
            mem.update(seq, key, value);
            if let Some(stats) = statistics.as_ref() {
                stats.tick_keys_updated();
            }
        } else if let Some(callback) = callback {
            debug_assert!(!self.concurrent_memtable_writes);
            if !mem.update_with_callback(seq, key, value) {
                // key not present in the memtable: fetch the prior value
                // from the store, run the callback, re-insert the result
                let mut previous: Option<Vec<u8>> = None;
                if self.recovering_log_number == 0 {
                    if let Some(db) = self.db {
                        previous = db.get(column_family, key, seq);
                    }
                }

                let mut merged = Vec::new();
                let status = match previous.as_mut() {
                    Some(buf) => callback(Some(buf), value, &mut merged),
                    None => callback(None, value, &mut merged),
                };
                match status {
                    UpdateStatus::UpdatedInplace => {
                        // the previous-value buffer holds the final value
                        mem.add(
                            seq,
                            ValueType::Value,
                            key,
                            &previous.unwrap_or_default(),
                            None,
                        );
                        if let Some(stats) = statistics.as_ref() {
                            stats.tick_keys_written();
                        }
                    }
                    UpdateStatus::Updated => {
                        mem.add(seq, ValueType::Value, key, &merged, None);
                        if let Some(stats) = statistics.as_ref() {
                            stats.tick_keys_written();
                        }
                    }
                    UpdateStatus::Failed => {}
                }
            }
        }

        // the record is in the log whether or not the update landed, so
        // its sequence number is consumed either way
        self.sequence += 1;
        self.check_memtable_full();
        Ok(())
    }

    fn delete_cf(&mut self, column_family: ColumnFamilyId, key: &[u8]) -> Result<()> {
        if let Some(trx) = self.rebuilding_trx.as_mut() {
            return trx.delete_cf(column_family, key);
        }

        match self.seek_to_column_family(column_family) {
            Ok(true) => {}
            Ok(false) => {
                self.sequence += 1;
                return Ok(());
            }
            Err(err) => {
                self.sequence += 1;
                return Err(err);
            }
        }

        self.delete_impl(key, b"", ValueType::Deletion)
    }

    fn single_delete_cf(&mut self, column_family: ColumnFamilyId, key: &[u8]) -> Result<()> {
        if let Some(trx) = self.rebuilding_trx.as_mut() {
            return trx.single_delete_cf(column_family, key);
        }

        match self.seek_to_column_family(column_family) {
            Ok(true) => {}
            Ok(false) => {
                self.sequence += 1;
                return Ok(());
            }
            Err(err) => {
                self.sequence += 1;
                return Err(err);
            }
        }

        self.delete_impl(key, b"", ValueType::SingleDeletion)
    }

    fn delete_range_cf(
        &mut self,
        column_family: ColumnFamilyId,
        begin_key: &[u8],
        end_key: &[u8],
    ) -> Result<()> {
        if let Some(trx) = self.rebuilding_trx.as_mut() {
            return trx.delete_range_cf(column_family, begin_key, end_key);
        }

        match self.seek_to_column_family(column_family) {
            Ok(true) => {}
            Ok(false) => {
                self.sequence += 1;
                return Ok(());
            }
            Err(err) => {
                self.sequence += 1;
                return Err(err);
            }
        }

        if !self.cf_mems.supports_range_deletion() {
            return Err(BasaltError::NotSupported(format!(
                "table format of column family {} cannot store range tombstones",
                self.cf_mems.current()
            )));
        }

        self.delete_impl(begin_key, end_key, ValueType::RangeDeletion)
    }

    fn merge_cf(&mut self, column_family: ColumnFamilyId, key: &[u8], value: &[u8]) -> Result<()> {
        debug_assert!(!self.concurrent_memtable_writes);
        if let Some(trx) = self.rebuilding_trx.as_mut() {
            return trx.merge_cf(column_family, key, value);
        }

        match self.seek_to_column_family(column_family) {
            Ok(true) => {}
            Ok(false) => {
                self.sequence += 1;
                return Ok(());
            }
            Err(err) => {
                self.sequence += 1;
                return Err(err);
            }
        }

        let seq = self.sequence;
        let mem = self.cf_mems.mem_table();
        let max_successive_merges = mem.options().max_successive_merges;
        let merge_operator = mem.options().merge_operator.clone();
        let statistics = mem.options().statistics.clone();

        let mut perform_merge = false;
        // Reading through the store during recovery would re-enter the
        // engine while it holds its own locks, so folding is live-path only.
        if max_successive_merges > 0 && self.db.is_some() && self.recovering_log_number == 0 {
            let successive = mem.count_successive_merge_entries(key, seq);
            if successive >= max_successive_merges {
                perform_merge = true;
            }
        }

        if perform_merge {
            match (self.db, merge_operator.as_ref()) {
                (Some(db), Some(operator)) => {
                    // snapshot at the current sequence so operands from
                    // earlier in this batch are included
                    let existing = db.get(column_family, key, seq);
                    match operator.full_merge(key, existing.as_deref(), &[value]) {
                        Some(folded) => {
                            mem.add(seq, ValueType::Value, key, &folded, None);
                            if let Some(stats) = statistics.as_ref() {
                                stats.tick_merges_folded();
                            }
                        }
                        None => {
                            // keep the operand; compaction retries the fold
                            warn!(
                                column_family,
                                "merge fold failed, storing operand unmerged"
                            );
                            if let Some(stats) = statistics.as_ref() {
                                stats.tick_merge_fold_failures();
                            }
                            perform_merge = false;
                        }
                    }
                }
                _ => perform_merge = false,
            }
        }

        if !perform_merge {
            mem.add(seq, ValueType::Merge, key, value, None);
        }

        self.sequence += 1;
        self.check_memtable_full();
        Ok(())
    }

    fn mark_begin_prepare(&mut self) -> Result<()> {
        debug_assert!(self.rebuilding_trx.is_none());

        if self.recovering_log_number != 0 {
            // rebuild a hollow transaction from the prepare section
            let Some(db) = self.db else {
                return Err(BasaltError::InvalidArgument(
                    "prepared section replay requires an engine".to_string(),
                ));
            };
            if !db.allow_two_phase_commit() {
                return Err(BasaltError::NotSupported(
                    "write-ahead log contains prepared transactions; open the store with \
                     two-phase commit enabled"
                        .to_string(),
                ));
            }
            self.rebuilding_trx = Some(WriteBatch::new());
            self.has_valid_writes = true;
        } else {
            // live prepared writes go straight into memtables; the caller
            // must have bound a log for them to reference
            debug_assert!(self.log_number_ref > 0);
        }

        Ok(())
    }

    fn mark_end_prepare(&mut self, xid: &[u8]) -> Result<()> {
        if self.recovering_log_number != 0 {
            let Some(db) = self.db else {
                return Err(BasaltError::InvalidArgument(
                    "prepared section replay requires an engine".to_string(),
                ));
            };
            match self.rebuilding_trx.take() {
                Some(trx) => {
                    db.insert_recovered_transaction(self.recovering_log_number, xid, trx);
                }
                None => {
                    return Err(BasaltError::Corruption(
                        "end-prepare marker without a matching begin-prepare".to_string(),
                    ));
                }
            }
        } else {
            debug_assert!(self.rebuilding_trx.is_none());
            debug_assert!(self.log_number_ref > 0);
        }

        Ok(())
    }

    fn mark_commit(&mut self, xid: &[u8]) -> Result<()> {
        if self.recovering_log_number == 0 {
            // live commits are handled above this layer
            return Ok(());
        }
        let Some(db) = self.db else {
            return Ok(());
        };

        // The prepare section's log may have been released in a previous
        // incarnation once a flush covered the commit, so a missing xid is
        // not an error.
        if let Some(trx) = db.recovered_transaction(xid) {
            debug_assert_eq!(self.log_number_ref, 0);
            // per-column-family log numbers prevent duplicate re-insertion
            self.log_number_ref = trx.log_number;
            let replay = trx.batch.iterate(&mut *self);
            self.log_number_ref = 0;
            self.has_valid_writes = true;
            replay?;
            db.remove_recovered_transaction(xid);
        }

        Ok(())
    }

    fn mark_rollback(&mut self, xid: &[u8]) -> Result<()> {
        if self.recovering_log_number != 0 {
            if let Some(db) = self.db {
                // the prepare section's log may already have been released
                if db.recovered_transaction(xid).is_some() {
                    db.remove_recovered_transaction(xid);
                }
            }
        }
        Ok(())
    }
}
