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

//! User-supplied merge semantics.
//!
//! A merge operator folds a base value and a sequence of operands into a
//! single materialized value. The replay path uses it to collapse long
//! chains of merge records; compaction would use the same operator.

/// Associative fold over a key's value history.
///
/// `full_merge` receives the operands oldest-first. Returning `None`
/// signals that the fold failed; callers keep the operands as-is and retry
/// later rather than losing data.
pub trait MergeOperator: Send + Sync {
    fn name(&self) -> &str;

    fn full_merge(
        &self,
        key: &[u8],
        existing_value: Option<&[u8]>,
        operands: &[&[u8]],
    ) -> Option<Vec<u8>>;
}

/// Concatenates operands onto the existing value. Mostly useful in tests
/// and as a reference for operator authors.
#[derive(Debug, Default)]
pub struct ConcatMergeOperator;

impl MergeOperator for ConcatMergeOperator {
    fn name(&self) -> &str {
        "ConcatMergeOperator"
    }

    fn full_merge(
        &self,
        _key: &[u8],
        existing_value: Option<&[u8]>,
        operands: &[&[u8]],
    ) -> Option<Vec<u8>> {
        let mut out = existing_value.map(<[u8]>::to_vec).unwrap_or_default();
        for operand in operands {
            out.extend_from_slice(operand);
        }
        Some(out)
    }
}
