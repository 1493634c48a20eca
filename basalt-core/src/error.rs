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

//! Error types for BasaltDB

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BasaltError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Write batch too large: {size} bytes exceeds limit of {max}")]
    BatchTooLarge { size: usize, max: usize },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BasaltError {
    /// True for any corruption-class error.
    pub fn is_corruption(&self) -> bool {
        matches!(self, BasaltError::Corruption(_))
    }
}

pub type Result<T> = std::result::Result<T, BasaltError>;
