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

//! Primitive type aliases shared across the storage layer.

/// Monotonically increasing 64-bit identifier assigned to each user-visible
/// mutation. Defines snapshot visibility order.
pub type SequenceNumber = u64;

/// Numeric id of a column family (a named keyspace within the store).
pub type ColumnFamilyId = u32;

/// The id of the default column family. Records targeting it are encoded
/// with the non-qualified record tags.
pub const DEFAULT_COLUMN_FAMILY_ID: ColumnFamilyId = 0;
