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

//! Memtable surface used by the batch replay path.
//!
//! The replay path talks to memtables through the [`MemTable`] trait so the
//! storage engine is free to plug in specialized implementations.
//! [`SkipListMemTable`] is the default: a lock-free ordered map keyed by
//! `(user_key, sequence)` with sequence numbers ordered newest-first, so a
//! point lookup at a snapshot is a single range probe.
//!
//! Concurrent insertion is supported by the skip list itself; when the
//! caller runs several inserters against one memtable it passes a
//! per-inserter [`MemTablePostProcessInfo`] and the size/count bookkeeping
//! is applied once at the end through [`MemTable::batch_post_process`].

use std::cmp::Reverse;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_skiplist::SkipMap;

use basalt_core::SequenceNumber;

use crate::format::ValueType;
use crate::merge::MergeOperator;
use crate::stats::Statistics;

/// Fixed per-entry bookkeeping charge added to key/value bytes when
/// estimating memory usage.
const ENTRY_OVERHEAD: usize = 16;

/// Verdict of an in-place update callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    /// Nothing to write; the entry is obsolete.
    Failed,
    /// The previous-value buffer was rewritten with the final value.
    UpdatedInplace,
    /// The merged-value buffer holds the final value.
    Updated,
}

/// User callback for conditional in-place updates.
///
/// Receives the previous value (if any), the incoming delta, and a buffer
/// for a merged result. The returned status says which buffer holds the
/// final value.
pub type InplaceCallback =
    Arc<dyn Fn(Option<&mut Vec<u8>>, &[u8], &mut Vec<u8>) -> UpdateStatus + Send + Sync>;

/// Per-memtable tuning read by the replay path.
#[derive(Clone, Default)]
pub struct MemTableOptions {
    /// Allow overwriting the newest version of a key in place.
    pub inplace_update_support: bool,
    /// Callback consulted for in-place updates; `None` means blind overwrite.
    pub inplace_callback: Option<InplaceCallback>,
    /// Fold a key's merge chain once it reaches this many successive
    /// operands. `0` disables folding.
    pub max_successive_merges: usize,
    /// Operator used for merge records and folding.
    pub merge_operator: Option<Arc<dyn MergeOperator>>,
    /// Optional tick counters.
    pub statistics: Option<Arc<Statistics>>,
    /// Flush threshold in approximate bytes. `0` means the default.
    pub write_buffer_size: usize,
}

impl MemTableOptions {
    /// Default flush threshold when `write_buffer_size` is left at zero.
    pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 4 << 20;

    pub fn write_buffer_size(&self) -> usize {
        if self.write_buffer_size == 0 {
            Self::DEFAULT_WRITE_BUFFER_SIZE
        } else {
            self.write_buffer_size
        }
    }
}

impl std::fmt::Debug for MemTableOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemTableOptions")
            .field("inplace_update_support", &self.inplace_update_support)
            .field("has_inplace_callback", &self.inplace_callback.is_some())
            .field("max_successive_merges", &self.max_successive_merges)
            .field("has_merge_operator", &self.merge_operator.is_some())
            .field("write_buffer_size", &self.write_buffer_size)
            .finish()
    }
}

/// Counters a concurrent inserter accumulates locally and applies once
/// through [`MemTable::batch_post_process`].
#[derive(Debug, Default, Clone, Copy)]
pub struct MemTablePostProcessInfo {
    pub num_entries: u64,
    pub num_deletes: u64,
    pub data_size: u64,
}

/// The memtable interface the replay path depends on.
///
/// Implementations use interior mutability: entries may be inserted through
/// a shared reference, and it is the implementation's job to make `add`
/// safe under the concurrent-writes mode.
pub trait MemTable: Send + Sync {
    fn options(&self) -> &MemTableOptions;

    /// Insert a tagged entry at `seq`. When `post_info` is given the
    /// size/count bookkeeping is deferred to `batch_post_process`.
    fn add(
        &self,
        seq: SequenceNumber,
        value_type: ValueType,
        key: &[u8],
        value: &[u8],
        post_info: Option<&mut MemTablePostProcessInfo>,
    );

    /// Overwrite the newest version of `key` in place, falling back to a
    /// plain insert at `seq` when the key has no live value.
    fn update(&self, seq: SequenceNumber, key: &[u8], value: &[u8]);

    /// Conditional in-place update through the configured callback.
    /// Returns false when the key has no live value in this memtable, in
    /// which case the caller owns the fallback path.
    fn update_with_callback(&self, seq: SequenceNumber, key: &[u8], delta: &[u8]) -> bool;

    /// Newest value visible at `snapshot`, with merge operands folded
    /// through the configured operator.
    fn get(&self, key: &[u8], snapshot: SequenceNumber) -> Option<Vec<u8>>;

    /// Number of successive merge operands at the head of `key`'s history,
    /// looking at versions visible at `snapshot`.
    fn count_successive_merge_entries(&self, key: &[u8], snapshot: SequenceNumber) -> usize;

    fn approximate_memory_usage(&self) -> usize;

    fn num_entries(&self) -> u64;

    /// Whether this memtable has grown past its flush threshold.
    fn should_schedule_flush(&self) -> bool;

    /// Claim the right to schedule the flush. Exactly one caller per
    /// memtable observes true.
    fn mark_flush_scheduled(&self) -> bool;

    /// Record that this memtable holds data whose prepare section lives in
    /// WAL `log_number`; the smallest such log must stay alive until flush.
    fn ref_log_containing_prep_section(&self, log_number: u64);

    /// Apply counters accumulated by a concurrent inserter.
    fn batch_post_process(&self, info: &MemTablePostProcessInfo);
}

type InternalKey = (Vec<u8>, Reverse<SequenceNumber>);

/// Default memtable: a lock-free skip list of `(key, seq)` entries.
pub struct SkipListMemTable {
    options: MemTableOptions,
    entries: SkipMap<InternalKey, (ValueType, Vec<u8>)>,
    mem_usage: AtomicUsize,
    entry_count: AtomicU64,
    delete_count: AtomicU64,
    flush_scheduled: AtomicBool,
    min_prep_log: AtomicU64,
}

impl SkipListMemTable {
    pub fn new(options: MemTableOptions) -> Self {
        Self {
            options,
            entries: SkipMap::new(),
            mem_usage: AtomicUsize::new(0),
            entry_count: AtomicU64::new(0),
            delete_count: AtomicU64::new(0),
            flush_scheduled: AtomicBool::new(false),
            min_prep_log: AtomicU64::new(0),
        }
    }

    pub fn num_deletes(&self) -> u64 {
        self.delete_count.load(Ordering::Relaxed)
    }

    /// Smallest WAL number holding a prepare section referenced by this
    /// memtable, or 0 when none.
    pub fn min_prep_log(&self) -> u64 {
        self.min_prep_log.load(Ordering::Relaxed)
    }

    fn charge(&self, key: &[u8], value: &[u8]) -> usize {
        key.len() + value.len() + ENTRY_OVERHEAD
    }

    fn replace_at(&self, key: &[u8], seq: Reverse<SequenceNumber>, value: Vec<u8>, old_len: usize) {
        let new_len = value.len();
        self.entries
            .insert((key.to_vec(), seq), (ValueType::Value, value));
        if new_len >= old_len {
            self.mem_usage.fetch_add(new_len - old_len, Ordering::Relaxed);
        } else {
            self.mem_usage.fetch_sub(old_len - new_len, Ordering::Relaxed);
        }
    }

    fn fold(
        &self,
        key: &[u8],
        base: Option<&[u8]>,
        mut operands: Vec<Vec<u8>>,
    ) -> Option<Vec<u8>> {
        if operands.is_empty() {
            return base.map(<[u8]>::to_vec);
        }
        // collected newest-first; the operator expects oldest-first
        operands.reverse();
        let operator = self.options.merge_operator.as_ref()?;
        let refs: Vec<&[u8]> = operands.iter().map(|op| op.as_slice()).collect();
        operator.full_merge(key, base, &refs)
    }
}

impl MemTable for SkipListMemTable {
    fn options(&self) -> &MemTableOptions {
        &self.options
    }

    fn add(
        &self,
        seq: SequenceNumber,
        value_type: ValueType,
        key: &[u8],
        value: &[u8],
        post_info: Option<&mut MemTablePostProcessInfo>,
    ) {
        let charge = self.charge(key, value);
        self.entries
            .insert((key.to_vec(), Reverse(seq)), (value_type, value.to_vec()));
        match post_info {
            Some(info) => {
                info.num_entries += 1;
                if value_type.is_tombstone() {
                    info.num_deletes += 1;
                }
                info.data_size += charge as u64;
            }
            None => {
                self.entry_count.fetch_add(1, Ordering::Relaxed);
                if value_type.is_tombstone() {
                    self.delete_count.fetch_add(1, Ordering::Relaxed);
                }
                self.mem_usage.fetch_add(charge, Ordering::Relaxed);
            }
        }
    }

    fn update(&self, seq: SequenceNumber, key: &[u8], value: &[u8]) {
        let lo: InternalKey = (key.to_vec(), Reverse(SequenceNumber::MAX));
        let hi: InternalKey = (key.to_vec(), Reverse(0));
        if let Some(entry) = self.entries.range(lo..=hi).next() {
            if entry.value().0 == ValueType::Value {
                let existing_seq = entry.key().1;
                let old_len = entry.value().1.len();
                entry.remove();
                self.replace_at(key, existing_seq, value.to_vec(), old_len);
                return;
            }
        }
        self.add(seq, ValueType::Value, key, value, None);
    }

    fn update_with_callback(&self, seq: SequenceNumber, key: &[u8], delta: &[u8]) -> bool {
        let Some(callback) = self.options.inplace_callback.clone() else {
            return false;
        };
        let lo: InternalKey = (key.to_vec(), Reverse(SequenceNumber::MAX));
        let hi: InternalKey = (key.to_vec(), Reverse(0));
        let Some(entry) = self.entries.range(lo..=hi).next() else {
            return false;
        };
        if entry.value().0 != ValueType::Value {
            return false;
        }

        let existing_seq = entry.key().1;
        let old_len = entry.value().1.len();
        let mut previous = entry.value().1.clone();
        let mut merged = Vec::new();
        match callback(Some(&mut previous), delta, &mut merged) {
            UpdateStatus::UpdatedInplace => {
                entry.remove();
                self.replace_at(key, existing_seq, previous, old_len);
                if let Some(stats) = self.options.statistics.as_ref() {
                    stats.tick_keys_updated();
                }
                true
            }
            UpdateStatus::Updated => {
                self.add(seq, ValueType::Value, key, &merged, None);
                if let Some(stats) = self.options.statistics.as_ref() {
                    stats.tick_keys_written();
                }
                true
            }
            // entry is obsolete; nothing to write
            UpdateStatus::Failed => true,
        }
    }

    fn get(&self, key: &[u8], snapshot: SequenceNumber) -> Option<Vec<u8>> {
        let lo: InternalKey = (key.to_vec(), Reverse(snapshot));
        let hi: InternalKey = (key.to_vec(), Reverse(0));
        let mut operands: Vec<Vec<u8>> = Vec::new();
        for entry in self.entries.range(lo..=hi) {
            let (value_type, data) = entry.value();
            match value_type {
                ValueType::Merge => operands.push(data.clone()),
                ValueType::Value => return self.fold(key, Some(data.as_slice()), operands),
                // any tombstone ends the visible history
                _ => return self.fold(key, None, operands),
            }
        }
        self.fold(key, None, operands)
    }

    fn count_successive_merge_entries(&self, key: &[u8], snapshot: SequenceNumber) -> usize {
        let lo: InternalKey = (key.to_vec(), Reverse(snapshot));
        let hi: InternalKey = (key.to_vec(), Reverse(0));
        let mut count = 0;
        for entry in self.entries.range(lo..=hi) {
            if entry.value().0 != ValueType::Merge {
                break;
            }
            count += 1;
        }
        count
    }

    fn approximate_memory_usage(&self) -> usize {
        self.mem_usage.load(Ordering::Relaxed)
    }

    fn num_entries(&self) -> u64 {
        self.entry_count.load(Ordering::Relaxed)
    }

    fn should_schedule_flush(&self) -> bool {
        self.approximate_memory_usage() >= self.options.write_buffer_size()
    }

    fn mark_flush_scheduled(&self) -> bool {
        self.flush_scheduled
            .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }

    fn ref_log_containing_prep_section(&self, log_number: u64) {
        let mut current = self.min_prep_log.load(Ordering::Relaxed);
        loop {
            if current != 0 && current <= log_number {
                break;
            }
            match self.min_prep_log.compare_exchange_weak(
                current,
                log_number,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => current = observed,
            }
        }
    }

    fn batch_post_process(&self, info: &MemTablePostProcessInfo) {
        self.entry_count.fetch_add(info.num_entries, Ordering::Relaxed);
        self.delete_count.fetch_add(info.num_deletes, Ordering::Relaxed);
        self.mem_usage
            .fetch_add(info.data_size as usize, Ordering::Relaxed);
    }
}
