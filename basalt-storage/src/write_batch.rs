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

//! The write batch: a group of mutations serialized into one byte buffer.
//!
//! A batch is the unit that flows through every write path: the client
//! mutation, the WAL payload, the replication unit and the recovery
//! fragment are all the same bytes. The buffer starts with a 12-byte
//! header (base sequence, record count) followed by tagged records; see
//! [`crate::format`] for the record grammar.
//!
//! ## Transactional appends
//!
//! Every counted append snapshots `(buffer length, count, content flags)`
//! before writing and restores all three if the grown buffer exceeds
//! `max_bytes`. A failed append leaves the batch indistinguishable from
//! its pre-call state.
//!
//! ## Content flags
//!
//! The batch tracks which record kinds it contains in an atomic bitset so
//! callers can route it (WAL-only? needs merge support?) without decoding.
//! Batches built from raw bytes defer classification: the first `has_*`
//! query iterates the payload through a classifying handler and memoizes
//! the result. Two racing readers compute the same value, so the relaxed
//! store is benign. Mutation is `&mut self` throughout; the flag reads are
//! the only shared-reference access the design permits.

use std::sync::atomic::{AtomicU32, Ordering};

use basalt_core::{BasaltError, ColumnFamilyId, Result, SequenceNumber};

use crate::coding::{
    decode_fixed32, decode_fixed64, encode_fixed32, encode_fixed64, put_length_prefixed_slice,
    put_varint32,
};
use crate::format::{
    decode_record, Record, ValueType, COUNT_OFFSET, HEADER_SIZE, PREPARE_MARKER_OFFSET,
};

/// Content-flag bits. The values are observable through serialized
/// save points in downstream tooling, so they stay fixed.
pub(crate) mod content {
    /// Contents unknown; classify on demand.
    pub const DEFERRED: u32 = 1 << 0;
    pub const HAS_PUT: u32 = 1 << 1;
    pub const HAS_DELETE: u32 = 1 << 2;
    pub const HAS_SINGLE_DELETE: u32 = 1 << 3;
    pub const HAS_MERGE: u32 = 1 << 4;
    pub const HAS_BEGIN_PREPARE: u32 = 1 << 5;
    pub const HAS_END_PREPARE: u32 = 1 << 6;
    pub const HAS_COMMIT: u32 = 1 << 7;
    pub const HAS_ROLLBACK: u32 = 1 << 8;
    pub const HAS_DELETE_RANGE: u32 = 1 << 9;
}

/// A captured prefix boundary: buffer length, record count and content
/// flags at capture time. Used both for rollback and for marking the
/// WAL-termination prefix of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SavePoint {
    pub size: usize,
    pub count: u32,
    pub content_flags: u32,
}

impl SavePoint {
    pub const fn cleared() -> Self {
        Self {
            size: 0,
            count: 0,
            content_flags: 0,
        }
    }

    pub fn is_cleared(&self) -> bool {
        self.size == 0 && self.count == 0 && self.content_flags == 0
    }

    pub fn clear(&mut self) {
        *self = Self::cleared();
    }
}

/// Visitor over a batch's records.
///
/// The leaf callbacks default to no-ops so narrow handlers (like the
/// content classifier) implement only what they care about. Records with a
/// non-qualified tag are dispatched with column family `0`.
pub trait WriteBatchHandler {
    fn put_cf(&mut self, column_family: ColumnFamilyId, key: &[u8], value: &[u8]) -> Result<()>;

    fn delete_cf(&mut self, column_family: ColumnFamilyId, key: &[u8]) -> Result<()>;

    fn single_delete_cf(&mut self, column_family: ColumnFamilyId, key: &[u8]) -> Result<()>;

    fn delete_range_cf(
        &mut self,
        column_family: ColumnFamilyId,
        begin_key: &[u8],
        end_key: &[u8],
    ) -> Result<()>;

    fn merge_cf(&mut self, column_family: ColumnFamilyId, key: &[u8], value: &[u8]) -> Result<()>;

    /// Opaque user annotation; ignored unless the handler cares.
    fn log_data(&mut self, _blob: &[u8]) {}

    fn mark_begin_prepare(&mut self) -> Result<()> {
        Ok(())
    }

    fn mark_end_prepare(&mut self, _xid: &[u8]) -> Result<()> {
        Ok(())
    }

    fn mark_commit(&mut self, _xid: &[u8]) -> Result<()> {
        Ok(())
    }

    fn mark_rollback(&mut self, _xid: &[u8]) -> Result<()> {
        Ok(())
    }

    /// Queried before each record; returning false stops iteration.
    fn should_continue(&self) -> bool {
        true
    }
}

/// Folds a record stream into its content-flag bits.
#[derive(Default)]
struct ContentClassifier {
    content_flags: u32,
}

impl WriteBatchHandler for ContentClassifier {
    fn put_cf(&mut self, _cf: ColumnFamilyId, _key: &[u8], _value: &[u8]) -> Result<()> {
        self.content_flags |= content::HAS_PUT;
        Ok(())
    }

    fn delete_cf(&mut self, _cf: ColumnFamilyId, _key: &[u8]) -> Result<()> {
        self.content_flags |= content::HAS_DELETE;
        Ok(())
    }

    fn single_delete_cf(&mut self, _cf: ColumnFamilyId, _key: &[u8]) -> Result<()> {
        self.content_flags |= content::HAS_SINGLE_DELETE;
        Ok(())
    }

    fn delete_range_cf(
        &mut self,
        _cf: ColumnFamilyId,
        _begin_key: &[u8],
        _end_key: &[u8],
    ) -> Result<()> {
        self.content_flags |= content::HAS_DELETE_RANGE;
        Ok(())
    }

    fn merge_cf(&mut self, _cf: ColumnFamilyId, _key: &[u8], _value: &[u8]) -> Result<()> {
        self.content_flags |= content::HAS_MERGE;
        Ok(())
    }

    fn mark_begin_prepare(&mut self) -> Result<()> {
        self.content_flags |= content::HAS_BEGIN_PREPARE;
        Ok(())
    }

    fn mark_end_prepare(&mut self, _xid: &[u8]) -> Result<()> {
        self.content_flags |= content::HAS_END_PREPARE;
        Ok(())
    }

    fn mark_commit(&mut self, _xid: &[u8]) -> Result<()> {
        self.content_flags |= content::HAS_COMMIT;
        Ok(())
    }

    fn mark_rollback(&mut self, _xid: &[u8]) -> Result<()> {
        self.content_flags |= content::HAS_ROLLBACK;
        Ok(())
    }
}

/// A serialized group of mutations.
pub struct WriteBatch {
    rep: Vec<u8>,
    content_flags: AtomicU32,
    /// Soft size bound; 0 means unbounded.
    max_bytes: usize,
    save_points: Vec<SavePoint>,
    wal_term_point: SavePoint,
}

impl Default for WriteBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for WriteBatch {
    fn clone(&self) -> Self {
        Self {
            rep: self.rep.clone(),
            content_flags: AtomicU32::new(self.content_flags.load(Ordering::Relaxed)),
            max_bytes: self.max_bytes,
            save_points: self.save_points.clone(),
            wal_term_point: self.wal_term_point,
        }
    }
}

impl std::fmt::Debug for WriteBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut out = f.debug_struct("WriteBatch");
        out.field("data_size", &self.data_size());
        if self.rep.len() >= HEADER_SIZE {
            out.field("count", &self.count())
                .field("sequence", &self.sequence());
        }
        out.finish()
    }
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Batch with `reserved_bytes` of pre-allocated buffer.
    pub fn with_capacity(reserved_bytes: usize) -> Self {
        let mut rep = Vec::with_capacity(reserved_bytes.max(HEADER_SIZE));
        rep.resize(HEADER_SIZE, 0);
        Self {
            rep,
            content_flags: AtomicU32::new(0),
            max_bytes: 0,
            save_points: Vec::new(),
            wal_term_point: SavePoint::cleared(),
        }
    }

    /// Batch whose counted appends fail once the buffer would exceed
    /// `max_bytes`.
    pub fn with_max_bytes(reserved_bytes: usize, max_bytes: usize) -> Self {
        let mut batch = Self::with_capacity(reserved_bytes);
        batch.max_bytes = max_bytes;
        batch
    }

    /// Batch over an externally produced byte string. Contents are
    /// classified lazily on the first `has_*` query.
    pub fn from_bytes(rep: Vec<u8>) -> Self {
        Self {
            rep,
            content_flags: AtomicU32::new(content::DEFERRED),
            max_bytes: 0,
            save_points: Vec::new(),
            wal_term_point: SavePoint::cleared(),
        }
    }

    /// The serialized batch, header included. These bytes are what goes
    /// into the WAL.
    pub fn data(&self) -> &[u8] {
        &self.rep
    }

    pub fn data_size(&self) -> usize {
        self.rep.len()
    }

    /// Number of counted records.
    pub fn count(&self) -> u32 {
        decode_fixed32(&self.rep[COUNT_OFFSET..HEADER_SIZE])
    }

    pub fn set_count(&mut self, count: u32) {
        encode_fixed32(&mut self.rep[COUNT_OFFSET..HEADER_SIZE], count);
    }

    /// Base sequence number from the header.
    pub fn sequence(&self) -> SequenceNumber {
        decode_fixed64(&self.rep[0..8])
    }

    pub fn set_sequence(&mut self, seq: SequenceNumber) {
        encode_fixed64(&mut self.rep[0..8], seq);
    }

    /// Reset to an empty batch: header only, flags zeroed, save points and
    /// the WAL termination point dropped.
    pub fn clear(&mut self) {
        self.rep.clear();
        self.rep.resize(HEADER_SIZE, 0);
        self.content_flags.store(0, Ordering::Relaxed);
        self.save_points.clear();
        self.wal_term_point.clear();
    }

    /// Replace the payload wholesale with externally produced bytes.
    pub fn set_contents(&mut self, contents: Vec<u8>) -> Result<()> {
        if contents.len() < HEADER_SIZE {
            return Err(BasaltError::Corruption(
                "malformed write batch (too small)".to_string(),
            ));
        }
        self.rep = contents;
        self.content_flags.store(content::DEFERRED, Ordering::Relaxed);
        Ok(())
    }

    fn snapshot(&self) -> SavePoint {
        SavePoint {
            size: self.rep.len(),
            count: self.count(),
            content_flags: self.content_flags.load(Ordering::Relaxed),
        }
    }

    fn or_content_flags(&self, bits: u32) {
        let current = self.content_flags.load(Ordering::Relaxed);
        self.content_flags.store(current | bits, Ordering::Relaxed);
    }

    /// Close out a counted append: if the buffer outgrew `max_bytes`,
    /// restore the pre-append snapshot and fail.
    fn commit_append(&mut self, save: SavePoint) -> Result<()> {
        if self.max_bytes != 0 && self.rep.len() > self.max_bytes {
            let size = self.rep.len();
            self.rep.truncate(save.size);
            self.set_count(save.count);
            self.content_flags.store(save.content_flags, Ordering::Relaxed);
            return Err(BasaltError::BatchTooLarge {
                size,
                max: self.max_bytes,
            });
        }
        Ok(())
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.put_cf(0, key, value)
    }

    pub fn put_cf(&mut self, column_family: ColumnFamilyId, key: &[u8], value: &[u8]) -> Result<()> {
        let save = self.snapshot();
        self.set_count(save.count + 1);
        if column_family == 0 {
            self.rep.push(ValueType::Value.as_u8());
        } else {
            self.rep.push(ValueType::ColumnFamilyValue.as_u8());
            put_varint32(&mut self.rep, column_family);
        }
        put_length_prefixed_slice(&mut self.rep, key);
        put_length_prefixed_slice(&mut self.rep, value);
        self.or_content_flags(content::HAS_PUT);
        self.commit_append(save)
    }

    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.delete_cf(0, key)
    }

    pub fn delete_cf(&mut self, column_family: ColumnFamilyId, key: &[u8]) -> Result<()> {
        let save = self.snapshot();
        self.set_count(save.count + 1);
        if column_family == 0 {
            self.rep.push(ValueType::Deletion.as_u8());
        } else {
            self.rep.push(ValueType::ColumnFamilyDeletion.as_u8());
            put_varint32(&mut self.rep, column_family);
        }
        put_length_prefixed_slice(&mut self.rep, key);
        self.or_content_flags(content::HAS_DELETE);
        self.commit_append(save)
    }

    pub fn single_delete(&mut self, key: &[u8]) -> Result<()> {
        self.single_delete_cf(0, key)
    }

    pub fn single_delete_cf(&mut self, column_family: ColumnFamilyId, key: &[u8]) -> Result<()> {
        let save = self.snapshot();
        self.set_count(save.count + 1);
        if column_family == 0 {
            self.rep.push(ValueType::SingleDeletion.as_u8());
        } else {
            self.rep.push(ValueType::ColumnFamilySingleDeletion.as_u8());
            put_varint32(&mut self.rep, column_family);
        }
        put_length_prefixed_slice(&mut self.rep, key);
        self.or_content_flags(content::HAS_SINGLE_DELETE);
        self.commit_append(save)
    }

    pub fn delete_range(&mut self, begin_key: &[u8], end_key: &[u8]) -> Result<()> {
        self.delete_range_cf(0, begin_key, end_key)
    }

    pub fn delete_range_cf(
        &mut self,
        column_family: ColumnFamilyId,
        begin_key: &[u8],
        end_key: &[u8],
    ) -> Result<()> {
        let save = self.snapshot();
        self.set_count(save.count + 1);
        if column_family == 0 {
            self.rep.push(ValueType::RangeDeletion.as_u8());
        } else {
            self.rep.push(ValueType::ColumnFamilyRangeDeletion.as_u8());
            put_varint32(&mut self.rep, column_family);
        }
        put_length_prefixed_slice(&mut self.rep, begin_key);
        put_length_prefixed_slice(&mut self.rep, end_key);
        self.or_content_flags(content::HAS_DELETE_RANGE);
        self.commit_append(save)
    }

    pub fn merge(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.merge_cf(0, key, value)
    }

    pub fn merge_cf(&mut self, column_family: ColumnFamilyId, key: &[u8], value: &[u8]) -> Result<()> {
        let save = self.snapshot();
        self.set_count(save.count + 1);
        if column_family == 0 {
            self.rep.push(ValueType::Merge.as_u8());
        } else {
            self.rep.push(ValueType::ColumnFamilyMerge.as_u8());
            put_varint32(&mut self.rep, column_family);
        }
        put_length_prefixed_slice(&mut self.rep, key);
        put_length_prefixed_slice(&mut self.rep, value);
        self.or_content_flags(content::HAS_MERGE);
        self.commit_append(save)
    }

    /// Append an uncounted annotation record. Replayed only through the
    /// handler's `log_data` hook; invisible to the memtable path.
    pub fn put_log_data(&mut self, blob: &[u8]) -> Result<()> {
        let save = self.snapshot();
        self.rep.push(ValueType::LogData.as_u8());
        put_length_prefixed_slice(&mut self.rep, blob);
        self.commit_append(save)
    }

    /// Reserve the begin-prepare marker slot. Must be the first record of
    /// a batch that will be sealed with [`WriteBatch::mark_end_prepare`].
    pub fn insert_noop(&mut self) {
        self.rep.push(ValueType::Noop.as_u8());
    }

    /// Seal the batch as a prepared transaction: rewrite the reserved noop
    /// at the front of the payload into the begin-prepare marker and
    /// append the end-prepare marker with `xid`.
    ///
    /// A batch can contain at most one prepare section, and all save
    /// points are invalidated by sealing.
    pub fn mark_end_prepare(&mut self, xid: &[u8]) -> Result<()> {
        if self.rep.get(PREPARE_MARKER_OFFSET).copied() != Some(ValueType::Noop.as_u8()) {
            return Err(BasaltError::InvalidArgument(
                "prepare section requires a reserved noop as the first record".to_string(),
            ));
        }
        self.save_points.clear();
        self.rep[PREPARE_MARKER_OFFSET] = ValueType::BeginPrepareXid.as_u8();
        self.rep.push(ValueType::EndPrepareXid.as_u8());
        put_length_prefixed_slice(&mut self.rep, xid);
        self.or_content_flags(content::HAS_END_PREPARE | content::HAS_BEGIN_PREPARE);
        Ok(())
    }

    /// Append a commit marker for a previously prepared transaction.
    pub fn mark_commit(&mut self, xid: &[u8]) -> Result<()> {
        self.rep.push(ValueType::CommitXid.as_u8());
        put_length_prefixed_slice(&mut self.rep, xid);
        self.or_content_flags(content::HAS_COMMIT);
        Ok(())
    }

    /// Append a rollback marker for a previously prepared transaction.
    pub fn mark_rollback(&mut self, xid: &[u8]) -> Result<()> {
        self.rep.push(ValueType::RollbackXid.as_u8());
        put_length_prefixed_slice(&mut self.rep, xid);
        self.or_content_flags(content::HAS_ROLLBACK);
        Ok(())
    }

    /// Capture the current batch end as a rollback target.
    pub fn set_save_point(&mut self) {
        let save = self.snapshot();
        self.save_points.push(save);
    }

    /// Truncate the batch back to the most recent save point.
    pub fn rollback_to_save_point(&mut self) -> Result<()> {
        let savepoint = self.save_points.pop().ok_or_else(|| {
            BasaltError::NotFound("no save point to roll back to".to_string())
        })?;

        debug_assert!(savepoint.size <= self.rep.len());
        debug_assert!(savepoint.count <= self.count());

        if savepoint.size != self.rep.len() {
            self.rep.truncate(savepoint.size);
            self.set_count(savepoint.count);
            self.content_flags
                .store(savepoint.content_flags, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Discard the most recent save point without rolling back.
    pub fn pop_save_point(&mut self) -> Result<()> {
        if self.save_points.pop().is_none() {
            return Err(BasaltError::NotFound("no save point to pop".to_string()));
        }
        Ok(())
    }

    /// Mark the prefix to be durably logged when this batch is appended in
    /// WAL-only mode; records after this point stay memtable-only.
    pub fn mark_wal_termination_point(&mut self) {
        self.wal_term_point = self.snapshot();
    }

    pub fn wal_termination_point(&self) -> &SavePoint {
        &self.wal_term_point
    }

    /// Concatenate `src`'s payload (sans header) onto this batch. With
    /// `wal_only`, and if `src` carries a WAL termination point, only the
    /// prefix up to that boundary is copied.
    pub fn append(&mut self, src: &WriteBatch, wal_only: bool) -> Result<()> {
        let term = src.wal_termination_point();
        let (src_len, src_count, src_flags) = if wal_only && !term.is_cleared() {
            (term.size - HEADER_SIZE, term.count, term.content_flags)
        } else {
            (
                src.rep.len() - HEADER_SIZE,
                src.count(),
                src.content_flags.load(Ordering::Relaxed),
            )
        };

        let count = self.count();
        self.set_count(count + src_count);
        self.rep
            .extend_from_slice(&src.rep[HEADER_SIZE..HEADER_SIZE + src_len]);
        self.or_content_flags(src_flags);
        Ok(())
    }

    fn compute_content_flags(&self) -> u32 {
        let mut flags = self.content_flags.load(Ordering::Relaxed);
        if flags & content::DEFERRED != 0 {
            let mut classifier = ContentClassifier::default();
            // a decode failure leaves the flags of the prefix that parsed
            let _ = self.iterate(&mut classifier);
            flags = classifier.content_flags;
            // memoize; a racing reader stores the same value
            self.content_flags.store(flags, Ordering::Relaxed);
        }
        flags
    }

    pub fn has_put(&self) -> bool {
        self.compute_content_flags() & content::HAS_PUT != 0
    }

    pub fn has_delete(&self) -> bool {
        self.compute_content_flags() & content::HAS_DELETE != 0
    }

    pub fn has_single_delete(&self) -> bool {
        self.compute_content_flags() & content::HAS_SINGLE_DELETE != 0
    }

    pub fn has_delete_range(&self) -> bool {
        self.compute_content_flags() & content::HAS_DELETE_RANGE != 0
    }

    pub fn has_merge(&self) -> bool {
        self.compute_content_flags() & content::HAS_MERGE != 0
    }

    pub fn has_begin_prepare(&self) -> bool {
        self.compute_content_flags() & content::HAS_BEGIN_PREPARE != 0
    }

    pub fn has_end_prepare(&self) -> bool {
        self.compute_content_flags() & content::HAS_END_PREPARE != 0
    }

    pub fn has_commit(&self) -> bool {
        self.compute_content_flags() & content::HAS_COMMIT != 0
    }

    pub fn has_rollback(&self) -> bool {
        self.compute_content_flags() & content::HAS_ROLLBACK != 0
    }

    /// Decode the payload record by record, dispatching each one to
    /// `handler`. Counted records are tallied and checked against the
    /// header count once the payload is exhausted.
    pub fn iterate<H: WriteBatchHandler + ?Sized>(&self, handler: &mut H) -> Result<()> {
        if self.rep.len() < HEADER_SIZE {
            return Err(BasaltError::Corruption(
                "malformed write batch (too small)".to_string(),
            ));
        }

        let mut input = &self.rep[HEADER_SIZE..];
        let mut found: u32 = 0;
        while !input.is_empty() && handler.should_continue() {
            let record = decode_record(&mut input)?;
            match record {
                Record::Put {
                    column_family,
                    key,
                    value,
                } => {
                    handler.put_cf(column_family, key, value)?;
                    found += 1;
                }
                Record::Delete { column_family, key } => {
                    handler.delete_cf(column_family, key)?;
                    found += 1;
                }
                Record::SingleDelete { column_family, key } => {
                    handler.single_delete_cf(column_family, key)?;
                    found += 1;
                }
                Record::DeleteRange {
                    column_family,
                    begin_key,
                    end_key,
                } => {
                    handler.delete_range_cf(column_family, begin_key, end_key)?;
                    found += 1;
                }
                Record::Merge {
                    column_family,
                    key,
                    value,
                } => {
                    handler.merge_cf(column_family, key, value)?;
                    found += 1;
                }
                Record::LogData { blob } => handler.log_data(blob),
                Record::Noop => {}
                Record::BeginPrepare => handler.mark_begin_prepare()?,
                Record::EndPrepare { xid } => handler.mark_end_prepare(xid)?,
                Record::Commit { xid } => handler.mark_commit(xid)?,
                Record::Rollback { xid } => handler.mark_rollback(xid)?,
            }
        }

        if found != self.count() {
            return Err(BasaltError::Corruption(
                "write batch has wrong count".to_string(),
            ));
        }
        Ok(())
    }
}

/// Size of the batch that results from appending two batches of the given
/// sizes: the merged batch carries exactly one header.
pub fn appended_byte_size(left: usize, right: usize) -> usize {
    if left == 0 || right == 0 {
        left + right
    } else {
        left + right - HEADER_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every callback for order-sensitive assertions.
    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Callback {
        Put(ColumnFamilyId, Vec<u8>, Vec<u8>),
        Delete(ColumnFamilyId, Vec<u8>),
        SingleDelete(ColumnFamilyId, Vec<u8>),
        DeleteRange(ColumnFamilyId, Vec<u8>, Vec<u8>),
        Merge(ColumnFamilyId, Vec<u8>, Vec<u8>),
        LogData(Vec<u8>),
        BeginPrepare,
        EndPrepare(Vec<u8>),
        Commit(Vec<u8>),
        Rollback(Vec<u8>),
    }

    #[derive(Default)]
    struct Collector {
        calls: Vec<Callback>,
        stop_after: Option<usize>,
    }

    impl WriteBatchHandler for Collector {
        fn put_cf(&mut self, cf: ColumnFamilyId, key: &[u8], value: &[u8]) -> Result<()> {
            self.calls
                .push(Callback::Put(cf, key.to_vec(), value.to_vec()));
            Ok(())
        }

        fn delete_cf(&mut self, cf: ColumnFamilyId, key: &[u8]) -> Result<()> {
            self.calls.push(Callback::Delete(cf, key.to_vec()));
            Ok(())
        }

        fn single_delete_cf(&mut self, cf: ColumnFamilyId, key: &[u8]) -> Result<()> {
            self.calls.push(Callback::SingleDelete(cf, key.to_vec()));
            Ok(())
        }

        fn delete_range_cf(
            &mut self,
            cf: ColumnFamilyId,
            begin_key: &[u8],
            end_key: &[u8],
        ) -> Result<()> {
            self.calls.push(Callback::DeleteRange(
                cf,
                begin_key.to_vec(),
                end_key.to_vec(),
            ));
            Ok(())
        }

        fn merge_cf(&mut self, cf: ColumnFamilyId, key: &[u8], value: &[u8]) -> Result<()> {
            self.calls
                .push(Callback::Merge(cf, key.to_vec(), value.to_vec()));
            Ok(())
        }

        fn log_data(&mut self, blob: &[u8]) {
            self.calls.push(Callback::LogData(blob.to_vec()));
        }

        fn mark_begin_prepare(&mut self) -> Result<()> {
            self.calls.push(Callback::BeginPrepare);
            Ok(())
        }

        fn mark_end_prepare(&mut self, xid: &[u8]) -> Result<()> {
            self.calls.push(Callback::EndPrepare(xid.to_vec()));
            Ok(())
        }

        fn mark_commit(&mut self, xid: &[u8]) -> Result<()> {
            self.calls.push(Callback::Commit(xid.to_vec()));
            Ok(())
        }

        fn mark_rollback(&mut self, xid: &[u8]) -> Result<()> {
            self.calls.push(Callback::Rollback(xid.to_vec()));
            Ok(())
        }

        fn should_continue(&self) -> bool {
            match self.stop_after {
                Some(limit) => self.calls.len() < limit,
                None => true,
            }
        }
    }

    fn collect(batch: &WriteBatch) -> Vec<Callback> {
        let mut collector = Collector::default();
        batch.iterate(&mut collector).unwrap();
        collector.calls
    }

    #[test]
    fn empty_batch() {
        let batch = WriteBatch::new();
        assert_eq!(batch.count(), 0);
        assert_eq!(batch.data_size(), HEADER_SIZE);
        assert!(collect(&batch).is_empty());
    }

    #[test]
    fn put_default_cf_encoding() {
        let mut batch = WriteBatch::new();
        batch.put(b"a", b"1").unwrap();
        assert_eq!(batch.count(), 1);
        assert_eq!(&batch.data()[HEADER_SIZE..], &[0x01, 0x01, b'a', 0x01, b'1']);
        assert_eq!(collect(&batch), vec![Callback::Put(0, b"a".to_vec(), b"1".to_vec())]);
    }

    #[test]
    fn put_qualified_cf_encoding() {
        let mut batch = WriteBatch::new();
        batch.put_cf(7, b"k", b"v").unwrap();
        assert_eq!(
            &batch.data()[HEADER_SIZE..],
            &[0x05, 0x07, 0x01, b'k', 0x01, b'v']
        );
        assert_eq!(collect(&batch), vec![Callback::Put(7, b"k".to_vec(), b"v".to_vec())]);
    }

    #[test]
    fn delete_encoding() {
        let mut batch = WriteBatch::new();
        batch.delete(b"x").unwrap();
        assert_eq!(&batch.data()[HEADER_SIZE..], &[0x00, 0x01, b'x']);
        assert_eq!(collect(&batch), vec![Callback::Delete(0, b"x".to_vec())]);
    }

    #[test]
    fn mixed_ops_preserve_order() {
        let mut batch = WriteBatch::new();
        batch.put(b"a", b"1").unwrap();
        batch.merge_cf(2, b"b", b"2").unwrap();
        batch.single_delete(b"c").unwrap();
        batch.delete_range(b"d", b"e").unwrap();
        batch.put_log_data(b"note").unwrap();
        batch.delete_cf(4, b"f").unwrap();

        assert_eq!(batch.count(), 5);
        assert_eq!(
            collect(&batch),
            vec![
                Callback::Put(0, b"a".to_vec(), b"1".to_vec()),
                Callback::Merge(2, b"b".to_vec(), b"2".to_vec()),
                Callback::SingleDelete(0, b"c".to_vec()),
                Callback::DeleteRange(0, b"d".to_vec(), b"e".to_vec()),
                Callback::LogData(b"note".to_vec()),
                Callback::Delete(4, b"f".to_vec()),
            ]
        );
    }

    #[test]
    fn log_data_is_uncounted_and_unflagged() {
        let mut batch = WriteBatch::new();
        batch.put_log_data(b"blob").unwrap();
        assert_eq!(batch.count(), 0);
        assert!(!batch.has_put());
        assert!(!batch.has_delete());
    }

    #[test]
    fn rollback_restores_bytes_count_and_flags() {
        let mut batch = WriteBatch::new();
        batch.put(b"a", b"1").unwrap();
        let before = batch.data().to_vec();

        batch.set_save_point();
        batch.put(b"b", b"2").unwrap();
        batch.delete(b"c").unwrap();
        assert_eq!(batch.count(), 3);
        assert!(batch.has_delete());

        batch.rollback_to_save_point().unwrap();
        assert_eq!(batch.data(), before.as_slice());
        assert_eq!(batch.count(), 1);
        assert!(batch.has_put());
        assert!(!batch.has_delete());
        assert_eq!(collect(&batch), vec![Callback::Put(0, b"a".to_vec(), b"1".to_vec())]);
    }

    #[test]
    fn rollback_on_empty_batch_is_a_noop() {
        let mut batch = WriteBatch::new();
        batch.set_save_point();
        batch.rollback_to_save_point().unwrap();
        assert_eq!(batch.count(), 0);
        assert_eq!(batch.data_size(), HEADER_SIZE);
    }

    #[test]
    fn rollback_without_save_point_is_not_found() {
        let mut batch = WriteBatch::new();
        assert!(matches!(
            batch.rollback_to_save_point(),
            Err(BasaltError::NotFound(_))
        ));
        batch.set_save_point();
        batch.pop_save_point().unwrap();
        assert!(matches!(
            batch.rollback_to_save_point(),
            Err(BasaltError::NotFound(_))
        ));
        assert!(matches!(batch.pop_save_point(), Err(BasaltError::NotFound(_))));
    }

    #[test]
    fn nested_save_points_unwind_in_order() {
        let mut batch = WriteBatch::new();
        batch.put(b"a", b"1").unwrap();
        batch.set_save_point();
        batch.put(b"b", b"2").unwrap();
        batch.set_save_point();
        batch.put(b"c", b"3").unwrap();

        batch.rollback_to_save_point().unwrap();
        assert_eq!(batch.count(), 2);
        batch.rollback_to_save_point().unwrap();
        assert_eq!(batch.count(), 1);
    }

    #[test]
    fn oversize_append_restores_previous_state() {
        let mut batch = WriteBatch::with_max_bytes(0, 32);
        batch.put(b"a", b"1").unwrap();
        let before_data = batch.data().to_vec();
        let before_count = batch.count();

        let err = batch.put(b"big-key-big", b"big-value-big").unwrap_err();
        assert!(matches!(err, BasaltError::BatchTooLarge { .. }));
        assert_eq!(batch.data(), before_data.as_slice());
        assert_eq!(batch.count(), before_count);
        assert!(batch.has_put());
        assert!(!batch.has_delete());
    }

    #[test]
    fn prepare_rewrites_reserved_noop() {
        let mut batch = WriteBatch::new();
        batch.insert_noop();
        batch.put(b"k", b"v").unwrap();
        batch.set_save_point();
        batch.mark_end_prepare(b"tx1").unwrap();

        // the reserved slot now holds the begin marker
        assert_eq!(batch.data()[PREPARE_MARKER_OFFSET], 0x09);
        // the tail is the end marker plus the xid
        let tail_start = batch.data_size() - 5;
        assert_eq!(&batch.data()[tail_start..], &[0x0a, 0x03, b't', b'x', b'1']);
        assert!(batch.has_begin_prepare());
        assert!(batch.has_end_prepare());
        // sealing invalidates save points
        assert!(matches!(
            batch.rollback_to_save_point(),
            Err(BasaltError::NotFound(_))
        ));

        assert_eq!(
            collect(&batch),
            vec![
                Callback::BeginPrepare,
                Callback::Put(0, b"k".to_vec(), b"v".to_vec()),
                Callback::EndPrepare(b"tx1".to_vec()),
            ]
        );
    }

    #[test]
    fn prepare_without_reserved_noop_is_rejected() {
        let mut batch = WriteBatch::new();
        batch.put(b"k", b"v").unwrap();
        assert!(matches!(
            batch.mark_end_prepare(b"tx1"),
            Err(BasaltError::InvalidArgument(_))
        ));
    }

    #[test]
    fn commit_and_rollback_markers() {
        let mut batch = WriteBatch::new();
        batch.mark_commit(b"tx1").unwrap();
        batch.mark_rollback(b"tx2").unwrap();
        assert_eq!(batch.count(), 0);
        assert!(batch.has_commit());
        assert!(batch.has_rollback());
        assert_eq!(
            collect(&batch),
            vec![
                Callback::Commit(b"tx1".to_vec()),
                Callback::Rollback(b"tx2".to_vec()),
            ]
        );
    }

    #[test]
    fn clear_resets_everything() {
        let mut batch = WriteBatch::new();
        batch.put(b"a", b"1").unwrap();
        batch.set_save_point();
        batch.mark_wal_termination_point();
        batch.clear();

        assert_eq!(batch.count(), 0);
        assert_eq!(batch.data_size(), HEADER_SIZE);
        assert!(!batch.has_put());
        assert!(batch.wal_termination_point().is_cleared());
        assert!(matches!(
            batch.rollback_to_save_point(),
            Err(BasaltError::NotFound(_))
        ));
    }

    #[test]
    fn sequence_and_count_header_roundtrip() {
        let mut batch = WriteBatch::new();
        batch.set_sequence(0x0102_0304_0506_0708);
        batch.set_count(42);
        assert_eq!(batch.sequence(), 0x0102_0304_0506_0708);
        assert_eq!(batch.count(), 42);
        // header is little-endian
        assert_eq!(batch.data()[0], 0x08);
        assert_eq!(batch.data()[8], 42);
    }

    #[test]
    fn set_contents_defers_classification() {
        let mut src = WriteBatch::new();
        src.put(b"a", b"1").unwrap();
        src.put(b"b", b"2").unwrap();

        let mut batch = WriteBatch::new();
        batch.set_contents(src.data().to_vec()).unwrap();
        assert!(batch.has_put());
        // the memoized flags answer without re-iterating
        assert!(!batch.has_delete());
        assert_eq!(collect(&batch), collect(&src));
    }

    #[test]
    fn set_contents_rejects_short_buffers() {
        let mut batch = WriteBatch::new();
        assert!(matches!(
            batch.set_contents(vec![0u8; 5]),
            Err(BasaltError::Corruption(_))
        ));
    }

    #[test]
    fn from_bytes_classifies_lazily() {
        let mut src = WriteBatch::new();
        src.delete(b"gone").unwrap();
        let batch = WriteBatch::from_bytes(src.data().to_vec());
        assert!(batch.has_delete());
        assert!(!batch.has_put());
    }

    #[test]
    fn iterate_rejects_short_payload() {
        let batch = WriteBatch::from_bytes(vec![0u8; 5]);
        let mut collector = Collector::default();
        let err = batch.iterate(&mut collector).unwrap_err();
        assert!(err.to_string().contains("too small"));
    }

    #[test]
    fn iterate_rejects_unknown_tag() {
        let mut rep = vec![0u8; HEADER_SIZE];
        rep.push(0xff);
        let mut batch = WriteBatch::from_bytes(rep);
        batch.set_count(1);
        let mut collector = Collector::default();
        let err = batch.iterate(&mut collector).unwrap_err();
        assert!(err.to_string().contains("unknown write batch tag"));
    }

    #[test]
    fn iterate_rejects_wrong_count() {
        let mut batch = WriteBatch::new();
        batch.put(b"a", b"1").unwrap();
        // header claims one more record than the payload holds
        batch.set_count(2);
        let mut collector = Collector::default();
        let err = batch.iterate(&mut collector).unwrap_err();
        assert!(err.to_string().contains("wrong count"));
        // the record before the mismatch was still delivered
        assert_eq!(collector.calls.len(), 1);
    }

    #[test]
    fn handler_can_stop_iteration() {
        let mut batch = WriteBatch::new();
        batch.put(b"a", b"1").unwrap();
        batch.put(b"b", b"2").unwrap();
        batch.put(b"c", b"3").unwrap();

        let mut collector = Collector {
            stop_after: Some(1),
            ..Default::default()
        };
        // stopping early leaves the count check unsatisfied
        assert!(batch.iterate(&mut collector).is_err());
        assert_eq!(collector.calls.len(), 1);
    }

    #[test]
    fn append_concatenates_payloads() {
        let mut a = WriteBatch::new();
        a.put(b"a", b"1").unwrap();
        a.put(b"b", b"2").unwrap();
        let mut b = WriteBatch::new();
        b.delete(b"c").unwrap();

        let mut expected = collect(&a);
        expected.extend(collect(&b));

        a.append(&b, false).unwrap();
        assert_eq!(a.count(), 3);
        assert!(a.has_put());
        assert!(a.has_delete());
        assert_eq!(collect(&a), expected);
    }

    #[test]
    fn append_wal_only_respects_termination_point() {
        let mut src = WriteBatch::new();
        src.put(b"logged", b"1").unwrap();
        src.mark_wal_termination_point();
        src.delete(b"memtable-only").unwrap();

        let mut dst = WriteBatch::new();
        dst.append(&src, true).unwrap();
        assert_eq!(dst.count(), 1);
        assert!(dst.has_put());
        assert!(!dst.has_delete());
        assert_eq!(
            collect(&dst),
            vec![Callback::Put(0, b"logged".to_vec(), b"1".to_vec())]
        );

        // without wal_only the whole payload comes across
        let mut full = WriteBatch::new();
        full.append(&src, false).unwrap();
        assert_eq!(full.count(), 2);
        assert!(full.has_delete());
    }

    #[test]
    fn append_wal_only_without_termination_point_copies_all() {
        let mut src = WriteBatch::new();
        src.put(b"a", b"1").unwrap();
        let mut dst = WriteBatch::new();
        dst.append(&src, true).unwrap();
        assert_eq!(dst.count(), 1);
    }

    #[test]
    fn appended_byte_size_drops_one_header() {
        assert_eq!(appended_byte_size(0, 40), 40);
        assert_eq!(appended_byte_size(40, 0), 40);
        assert_eq!(appended_byte_size(40, 30), 40 + 30 - HEADER_SIZE);
    }

    #[test]
    fn clone_preserves_contents() {
        let mut batch = WriteBatch::new();
        batch.put(b"a", b"1").unwrap();
        batch.merge(b"b", b"2").unwrap();

        let copy = batch.clone();
        assert_eq!(copy.data(), batch.data());
        assert_eq!(copy.count(), batch.count());
        assert!(copy.has_put());
        assert!(copy.has_merge());
    }

    #[test]
    fn classifier_matches_incremental_flags() {
        let mut batch = WriteBatch::new();
        batch.put(b"a", b"1").unwrap();
        batch.delete(b"b").unwrap();
        batch.single_delete(b"c").unwrap();
        batch.delete_range(b"d", b"e").unwrap();
        batch.merge(b"f", b"6").unwrap();

        let incremental = batch.compute_content_flags();
        let lazy = WriteBatch::from_bytes(batch.data().to_vec());
        assert_eq!(lazy.compute_content_flags(), incremental);
    }
}
