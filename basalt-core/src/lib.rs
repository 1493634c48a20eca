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

//! BasaltDB Core
//!
//! Shared primitives for the BasaltDB workspace: the workspace error enum,
//! the `Result` alias, and the type aliases used across the storage layer
//! (sequence numbers, column-family ids).

pub mod error;
pub mod types;

pub use error::{BasaltError, Result};
pub use types::{ColumnFamilyId, SequenceNumber, DEFAULT_COLUMN_FAMILY_ID};
