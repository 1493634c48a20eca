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

//! Shared fixtures for the integration tests: a callback-recording batch
//! handler and a minimal engine over a column-family set.

#![allow(dead_code)]

use std::sync::Arc;

use basalt_core::{ColumnFamilyId, Result, SequenceNumber};
use basalt_storage::{
    ColumnFamilySet, KvEngine, RecoveredTransaction, RecoveredTransactions, WriteBatch,
    WriteBatchHandler,
};

/// One observed handler callback, in dispatch order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callback {
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
pub struct Collector {
    pub calls: Vec<Callback>,
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
}

/// Iterate `batch` and return the callbacks it produced.
pub fn collect(batch: &WriteBatch) -> Vec<Callback> {
    let mut collector = Collector::default();
    batch
        .iterate(&mut collector)
        .expect("batch should iterate cleanly");
    collector.calls
}

/// A minimal engine: snapshot reads against the registry's memtables plus
/// a recovered-transaction table.
pub struct TestEngine {
    pub cfs: Arc<ColumnFamilySet>,
    pub transactions: RecoveredTransactions,
    pub allow_2pc: bool,
}

impl TestEngine {
    pub fn new(cfs: Arc<ColumnFamilySet>) -> Self {
        Self {
            cfs,
            transactions: RecoveredTransactions::new(),
            allow_2pc: true,
        }
    }
}

impl KvEngine for TestEngine {
    fn allow_two_phase_commit(&self) -> bool {
        self.allow_2pc
    }

    fn get(
        &self,
        column_family: ColumnFamilyId,
        key: &[u8],
        snapshot: SequenceNumber,
    ) -> Option<Vec<u8>> {
        self.cfs.get(column_family)?.mem_table().get(key, snapshot)
    }

    fn insert_recovered_transaction(&self, log_number: u64, xid: &[u8], batch: WriteBatch) {
        self.transactions.insert(log_number, xid, batch);
    }

    fn recovered_transaction(&self, xid: &[u8]) -> Option<Arc<RecoveredTransaction>> {
        self.transactions.get(xid)
    }

    fn remove_recovered_transaction(&self, xid: &[u8]) {
        self.transactions.remove(xid);
    }
}
