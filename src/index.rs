use crate::stream::reader::{bytes16, of, Decode};
use crate::stream::Stream;
use crate::{DecodeError, Result};
use bytes::Bytes;
use std::fmt;
use std::iter::FusedIterator;
use tracing::{debug, trace};

/*
Index file layout schema. Entries follow each other up to the end of the file, big-endian.
-------------------------------------------------------------------------------------------------
|                                    Entry #1                                       | ... |
-------------------------------------------------------------------------------------------------
| key_len (2B) | key | position (8B) | promoted_len (4B) | promoted index (promoted_len) | ... |
-------------------------------------------------------------------------------------------------

Promoted index layout, present only when promoted_len is not zero.
-------------------------------------------------------------------------------------------------
| deletion_time (4B) | timestamp (8B) | entries_count (4B) | Promoted #1 | ... | Promoted #N |
-------------------------------------------------------------------------------------------------

Promoted entry layout.
-------------------------------------------------------------------------------------
| start_len (2B) | start | end_len (2B) | end | offset (8B) | width (8B) |
-------------------------------------------------------------------------------------

Bytes left in the promoted index after the last promoted entry are skipped.
*/

/// Byte size of the promoted index header: deletion time, timestamp and entries count.
pub const PROMOTED_HEADER_SIZE: usize = 16;

/// Number of bytes a partition spans in the data file. The file does not store it, it is
/// the distance to the next partition's position, so it is unknown for the last one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionSize {
    Known(i64),
    Unknown,
}

impl PartitionSize {
    /// How reports have always spelled an unknown size.
    pub const UNKNOWN_RAW: i64 = -1;

    pub fn raw(self) -> i64 {
        match self {
            PartitionSize::Known(size) => size,
            PartitionSize::Unknown => Self::UNKNOWN_RAW,
        }
    }

    pub fn known(self) -> Option<i64> {
        match self {
            PartitionSize::Known(size) => Some(size),
            PartitionSize::Unknown => None,
        }
    }
}

impl fmt::Display for PartitionSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.raw(), f)
    }
}

/// Points at a clustering range inside a large partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotedEntry {
    pub start: Bytes,
    pub end: Bytes,
    pub offset: i64,
    pub width: i64,
}

impl Decode for PromotedEntry {
    fn decode(stream: &mut Stream<'_>) -> Result<Self> {
        let (start, end, offset, width) =
            stream.read(&(bytes16(), bytes16(), of::<i64>(), of::<i64>()))?;

        Ok(Self {
            start,
            end,
            offset,
            width,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotedIndex {
    /// Seconds since epoch.
    pub deletion_time: i32,
    pub timestamp: i64,
    /// Count as declared in the header, always equal to `entries.len()`.
    pub entries_count: i32,
    pub entries: Vec<PromotedEntry>,
}

impl Decode for PromotedIndex {
    fn decode(stream: &mut Stream<'_>) -> Result<Self> {
        let (deletion_time, timestamp, entries_count) =
            stream.read(&(of::<i32>(), of::<i64>(), of::<i32>()))?;

        let count = usize::try_from(entries_count).map_err(|_| DecodeError::InvalidLength {
            ty: "promoted entries count",
            length: entries_count as i64,
            offset: stream.offset() - 4,
        })?;

        // The count comes from the file, do not trust it for preallocation.
        let mut entries = Vec::with_capacity(count.min(stream.remaining() / 20));
        for _ in 0..count {
            entries.push(stream.decode()?);
        }

        Ok(Self {
            deletion_time,
            timestamp,
            entries_count,
            entries,
        })
    }
}

/// A decoded partition index entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub key: Bytes,
    /// Offset of the partition in the data file.
    pub position: i64,
    /// Byte size of the promoted index, zero when there is none.
    pub promoted_length: i32,
    pub size: PartitionSize,
    pub promoted: Option<PromotedIndex>,
}

/// Walks an index file buffer entry by entry.
///
/// Each entry needs a peek at the next one to learn its partition size. The iterator stops
/// for good after the first error.
#[derive(Debug, Clone)]
pub struct IndexReader<'a> {
    stream: Stream<'a>,
    failed: bool,
}

impl<'a> IndexReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            stream: Stream::new(data),
            failed: false,
        }
    }

    /// Offset where the next entry starts.
    pub fn offset(&self) -> usize {
        self.stream.offset()
    }

    fn next_entry(&mut self) -> Result<IndexEntry> {
        let start = self.stream.offset();
        let key = self.stream.bytes16()?;
        let (position, promoted_length) = self.stream.read(&(of::<i64>(), of::<i32>()))?;

        let promoted_at = self.stream.offset();
        let promoted_len =
            usize::try_from(promoted_length).map_err(|_| DecodeError::InvalidLength {
                ty: "promoted index",
                length: promoted_length as i64,
                offset: promoted_at - 4,
            })?;

        let size = self.partition_size(promoted_len, position)?;

        let promoted = if promoted_len > 0 {
            Some(self.stream.decode::<PromotedIndex>()?)
        } else {
            None
        };

        let consumed = self.stream.offset() - promoted_at;
        if consumed > promoted_len {
            return Err(DecodeError::PromotedOverrun {
                offset: promoted_at,
                declared: promoted_len,
                consumed,
            });
        }
        self.stream.skip(promoted_len - consumed)?;

        trace!(
            offset = start,
            key_len = key.len(),
            position,
            promoted_length,
            size = size.raw(),
            "decoded index entry"
        );

        Ok(IndexEntry {
            key,
            position,
            promoted_length,
            size,
            promoted,
        })
    }

    /// Peeks at the position of the entry that starts right after the promoted index.
    /// Must be called before the promoted index is consumed.
    fn partition_size(&self, promoted_len: usize, position: i64) -> Result<PartitionSize> {
        if promoted_len >= self.stream.remaining() {
            debug!(offset = self.stream.offset(), "last index entry, partition size unknown");
            return Ok(PartitionSize::Unknown);
        }

        let mut peek = self.stream;
        peek.skip(promoted_len)?;
        let next_at = peek.offset();
        let key_len = peek.uint16()?;
        peek.skip(key_len as usize)?;
        let next_position = peek.int64()?;

        match next_position.checked_sub(position) {
            Some(size) if size >= 0 => Ok(PartitionSize::Known(size)),
            _ => Err(DecodeError::InvalidLength {
                ty: "partition size",
                length: next_position.wrapping_sub(position),
                offset: next_at,
            }),
        }
    }
}

impl Iterator for IndexReader<'_> {
    type Item = Result<IndexEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.stream.is_exhausted() {
            return None;
        }

        let entry = self.next_entry();
        self.failed = entry.is_err();
        Some(entry)
    }
}

impl FusedIterator for IndexReader<'_> {}

/// Decodes every entry of an index file buffer.
pub fn decode(data: &[u8]) -> Result<Vec<IndexEntry>> {
    IndexReader::new(data).collect()
}
