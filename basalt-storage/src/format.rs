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

//! On-disk record format of the write batch.
//!
//! A batch payload is a 12-byte header followed by tagged records:
//!
//! ```text
//! header   := sequence: fixed64 | count: fixed32
//! record   := Value             varstring varstring
//!           | Deletion          varstring
//!           | SingleDeletion    varstring
//!           | RangeDeletion     varstring varstring
//!           | Merge             varstring varstring
//!           | ColumnFamily*     varint32 <fields of the base variant>
//!           | LogData           varstring
//!           | Noop
//!           | BeginPrepareXid
//!           | EndPrepareXid     varstring
//!           | CommitXid         varstring
//!           | RollbackXid       varstring
//! varstring := len: varint32 | data: u8[len]
//! ```
//!
//! The tag byte values are frozen: they are what existing logs on disk
//! contain, and they double as the value-type tags stored in memtable
//! entries. Changing any of them breaks compatibility with persisted data.

use basalt_core::{BasaltError, ColumnFamilyId, Result};

use crate::coding::{get_length_prefixed_slice, get_varint32};

/// Size of the batch header: 8-byte base sequence + 4-byte record count.
pub const HEADER_SIZE: usize = 12;

/// Byte offset of the record count within the header.
pub const COUNT_OFFSET: usize = 8;

/// Byte offset of the first record, where a prepared batch keeps its
/// rewritten begin-prepare marker.
pub const PREPARE_MARKER_OFFSET: usize = HEADER_SIZE;

/// Record tags. The discriminant values are the on-disk byte values.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Deletion = 0x00,
    Value = 0x01,
    Merge = 0x02,
    LogData = 0x03,
    ColumnFamilyDeletion = 0x04,
    ColumnFamilyValue = 0x05,
    ColumnFamilyMerge = 0x06,
    SingleDeletion = 0x07,
    ColumnFamilySingleDeletion = 0x08,
    BeginPrepareXid = 0x09,
    EndPrepareXid = 0x0a,
    CommitXid = 0x0b,
    RollbackXid = 0x0c,
    Noop = 0x0d,
    ColumnFamilyRangeDeletion = 0x0e,
    RangeDeletion = 0x0f,
}

impl ValueType {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(ValueType::Deletion),
            0x01 => Some(ValueType::Value),
            0x02 => Some(ValueType::Merge),
            0x03 => Some(ValueType::LogData),
            0x04 => Some(ValueType::ColumnFamilyDeletion),
            0x05 => Some(ValueType::ColumnFamilyValue),
            0x06 => Some(ValueType::ColumnFamilyMerge),
            0x07 => Some(ValueType::SingleDeletion),
            0x08 => Some(ValueType::ColumnFamilySingleDeletion),
            0x09 => Some(ValueType::BeginPrepareXid),
            0x0a => Some(ValueType::EndPrepareXid),
            0x0b => Some(ValueType::CommitXid),
            0x0c => Some(ValueType::RollbackXid),
            0x0d => Some(ValueType::Noop),
            0x0e => Some(ValueType::ColumnFamilyRangeDeletion),
            0x0f => Some(ValueType::RangeDeletion),
            _ => None,
        }
    }

    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// True for tombstone value types.
    pub fn is_tombstone(self) -> bool {
        matches!(
            self,
            ValueType::Deletion | ValueType::SingleDeletion | ValueType::RangeDeletion
        )
    }
}

/// One decoded record, borrowing its byte strings from the batch payload.
///
/// Column-family-qualified tags decode to the same variant as their base
/// tag, with the decoded id; base tags carry the default id `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record<'a> {
    Put {
        column_family: ColumnFamilyId,
        key: &'a [u8],
        value: &'a [u8],
    },
    Delete {
        column_family: ColumnFamilyId,
        key: &'a [u8],
    },
    SingleDelete {
        column_family: ColumnFamilyId,
        key: &'a [u8],
    },
    DeleteRange {
        column_family: ColumnFamilyId,
        begin_key: &'a [u8],
        end_key: &'a [u8],
    },
    Merge {
        column_family: ColumnFamilyId,
        key: &'a [u8],
        value: &'a [u8],
    },
    LogData {
        blob: &'a [u8],
    },
    Noop,
    BeginPrepare,
    EndPrepare {
        xid: &'a [u8],
    },
    Commit {
        xid: &'a [u8],
    },
    Rollback {
        xid: &'a [u8],
    },
}

impl Record<'_> {
    /// Whether the record contributes to the header count.
    pub fn is_counted(&self) -> bool {
        matches!(
            self,
            Record::Put { .. }
                | Record::Delete { .. }
                | Record::SingleDelete { .. }
                | Record::DeleteRange { .. }
                | Record::Merge { .. }
        )
    }
}

fn bad_record(what: &str) -> BasaltError {
    BasaltError::Corruption(format!("bad write batch {what} record"))
}

/// Decode the next record from the front of `input`, advancing the cursor
/// past it on success.
pub fn decode_record<'a>(input: &mut &'a [u8]) -> Result<Record<'a>> {
    let Some((&tag_byte, rest)) = input.split_first() else {
        return Err(bad_record("tag"));
    };
    let Some(tag) = ValueType::from_u8(tag_byte) else {
        return Err(BasaltError::Corruption(
            "unknown write batch tag".to_string(),
        ));
    };
    let mut cursor = rest;

    let record = match tag {
        ValueType::Value | ValueType::ColumnFamilyValue => {
            let column_family = if tag == ValueType::ColumnFamilyValue {
                get_varint32(&mut cursor).ok_or_else(|| bad_record("put"))?
            } else {
                0
            };
            let key = get_length_prefixed_slice(&mut cursor).ok_or_else(|| bad_record("put"))?;
            let value = get_length_prefixed_slice(&mut cursor).ok_or_else(|| bad_record("put"))?;
            Record::Put {
                column_family,
                key,
                value,
            }
        }
        ValueType::Deletion | ValueType::ColumnFamilyDeletion => {
            let column_family = if tag == ValueType::ColumnFamilyDeletion {
                get_varint32(&mut cursor).ok_or_else(|| bad_record("delete"))?
            } else {
                0
            };
            let key = get_length_prefixed_slice(&mut cursor).ok_or_else(|| bad_record("delete"))?;
            Record::Delete { column_family, key }
        }
        ValueType::SingleDeletion | ValueType::ColumnFamilySingleDeletion => {
            let column_family = if tag == ValueType::ColumnFamilySingleDeletion {
                get_varint32(&mut cursor).ok_or_else(|| bad_record("single delete"))?
            } else {
                0
            };
            let key =
                get_length_prefixed_slice(&mut cursor).ok_or_else(|| bad_record("single delete"))?;
            Record::SingleDelete { column_family, key }
        }
        ValueType::RangeDeletion | ValueType::ColumnFamilyRangeDeletion => {
            let column_family = if tag == ValueType::ColumnFamilyRangeDeletion {
                get_varint32(&mut cursor).ok_or_else(|| bad_record("delete range"))?
            } else {
                0
            };
            let begin_key =
                get_length_prefixed_slice(&mut cursor).ok_or_else(|| bad_record("delete range"))?;
            let end_key =
                get_length_prefixed_slice(&mut cursor).ok_or_else(|| bad_record("delete range"))?;
            Record::DeleteRange {
                column_family,
                begin_key,
                end_key,
            }
        }
        ValueType::Merge | ValueType::ColumnFamilyMerge => {
            let column_family = if tag == ValueType::ColumnFamilyMerge {
                get_varint32(&mut cursor).ok_or_else(|| bad_record("merge"))?
            } else {
                0
            };
            let key = get_length_prefixed_slice(&mut cursor).ok_or_else(|| bad_record("merge"))?;
            let value =
                get_length_prefixed_slice(&mut cursor).ok_or_else(|| bad_record("merge"))?;
            Record::Merge {
                column_family,
                key,
                value,
            }
        }
        ValueType::LogData => {
            let blob =
                get_length_prefixed_slice(&mut cursor).ok_or_else(|| bad_record("log data"))?;
            Record::LogData { blob }
        }
        ValueType::Noop => Record::Noop,
        ValueType::BeginPrepareXid => Record::BeginPrepare,
        ValueType::EndPrepareXid => {
            let xid =
                get_length_prefixed_slice(&mut cursor).ok_or_else(|| bad_record("end prepare"))?;
            Record::EndPrepare { xid }
        }
        ValueType::CommitXid => {
            let xid = get_length_prefixed_slice(&mut cursor).ok_or_else(|| bad_record("commit"))?;
            Record::Commit { xid }
        }
        ValueType::RollbackXid => {
            let xid =
                get_length_prefixed_slice(&mut cursor).ok_or_else(|| bad_record("rollback"))?;
            Record::Rollback { xid }
        }
    };

    *input = cursor;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coding::put_length_prefixed_slice;

    #[test]
    fn tag_bytes_are_frozen() {
        assert_eq!(ValueType::Deletion.as_u8(), 0x00);
        assert_eq!(ValueType::Value.as_u8(), 0x01);
        assert_eq!(ValueType::Merge.as_u8(), 0x02);
        assert_eq!(ValueType::LogData.as_u8(), 0x03);
        assert_eq!(ValueType::ColumnFamilyDeletion.as_u8(), 0x04);
        assert_eq!(ValueType::ColumnFamilyValue.as_u8(), 0x05);
        assert_eq!(ValueType::ColumnFamilyMerge.as_u8(), 0x06);
        assert_eq!(ValueType::SingleDeletion.as_u8(), 0x07);
        assert_eq!(ValueType::ColumnFamilySingleDeletion.as_u8(), 0x08);
        assert_eq!(ValueType::BeginPrepareXid.as_u8(), 0x09);
        assert_eq!(ValueType::EndPrepareXid.as_u8(), 0x0a);
        assert_eq!(ValueType::CommitXid.as_u8(), 0x0b);
        assert_eq!(ValueType::RollbackXid.as_u8(), 0x0c);
        assert_eq!(ValueType::Noop.as_u8(), 0x0d);
        assert_eq!(ValueType::ColumnFamilyRangeDeletion.as_u8(), 0x0e);
        assert_eq!(ValueType::RangeDeletion.as_u8(), 0x0f);
    }

    #[test]
    fn from_u8_roundtrip() {
        for byte in 0x00u8..=0x0f {
            let tag = ValueType::from_u8(byte).unwrap();
            assert_eq!(tag.as_u8(), byte);
        }
        assert_eq!(ValueType::from_u8(0x10), None);
        assert_eq!(ValueType::from_u8(0xff), None);
    }

    #[test]
    fn decode_put_record() {
        let mut raw = vec![ValueType::Value.as_u8()];
        put_length_prefixed_slice(&mut raw, b"key");
        put_length_prefixed_slice(&mut raw, b"value");
        let mut input = raw.as_slice();
        let record = decode_record(&mut input).unwrap();
        assert_eq!(
            record,
            Record::Put {
                column_family: 0,
                key: b"key",
                value: b"value"
            }
        );
        assert!(input.is_empty());
    }

    #[test]
    fn decode_cf_qualified_record() {
        let mut raw = vec![ValueType::ColumnFamilyDeletion.as_u8(), 0x07];
        put_length_prefixed_slice(&mut raw, b"k");
        let mut input = raw.as_slice();
        let record = decode_record(&mut input).unwrap();
        assert_eq!(
            record,
            Record::Delete {
                column_family: 7,
                key: b"k"
            }
        );
    }

    #[test]
    fn decode_unknown_tag() {
        let raw = [0xffu8];
        let mut input = raw.as_slice();
        let err = decode_record(&mut input).unwrap_err();
        assert!(err.to_string().contains("unknown write batch tag"));
    }

    #[test]
    fn decode_truncated_record() {
        let raw = [ValueType::Value.as_u8(), 0x05, b'a'];
        let mut input = raw.as_slice();
        assert!(decode_record(&mut input).is_err());
    }
}
