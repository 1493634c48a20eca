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

//! Tick counters for the write path.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters shared between the replay path and its callers.
///
/// All counters use relaxed ordering; they are monotone tallies, not
/// synchronization points.
#[derive(Debug, Default)]
pub struct Statistics {
    keys_written: AtomicU64,
    keys_updated: AtomicU64,
    merges_folded: AtomicU64,
    merge_fold_failures: AtomicU64,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn tick_keys_written(&self) {
        self.keys_written.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn tick_keys_updated(&self) {
        self.keys_updated.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn tick_merges_folded(&self) {
        self.merges_folded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn tick_merge_fold_failures(&self) {
        self.merge_fold_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn keys_written(&self) -> u64 {
        self.keys_written.load(Ordering::Relaxed)
    }

    pub fn keys_updated(&self) -> u64 {
        self.keys_updated.load(Ordering::Relaxed)
    }

    pub fn merges_folded(&self) -> u64 {
        self.merges_folded.load(Ordering::Relaxed)
    }

    pub fn merge_fold_failures(&self) -> u64 {
        self.merge_fold_failures.load(Ordering::Relaxed)
    }
}
