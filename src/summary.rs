use crate::stream::reader::{of, Decode, Length};
use crate::stream::Stream;
use crate::{DecodeError, Result};
use bytes::Bytes;
use std::ops::Range;
use tracing::trace;

/*
Summary file layout schema.
--------------------------------------------------------------------------------------------
|    Header    |                     Entries (entries_size)              |  Boundary keys   |
--------------------------------------------------------------------------------------------
|     24B      | Offset #1 | ... | Offset #N | Entry #1 | ... | Entry #N | First | Last     |
--------------------------------------------------------------------------------------------

Header layout, big-endian.
-----------------------------------------------------------------------------------------------
| min_interval (4B) | entries_count (4B) | entries_size (8B) | sampling_level (4B) | size_at_full_sampling (4B) |
-----------------------------------------------------------------------------------------------

Offsets are little-endian int32, relative to the end of the header. Entry #i spans from
offset #i to offset #i+1 (entries_size for the last one) and holds the key followed by its
big-endian int64 position. Boundary keys are int32 big-endian length prefixed.
*/

pub const HEADER_SIZE: usize = 24;

/// Trailing position of every sampled entry.
const POSITION_SIZE: i64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryHeader {
    pub min_interval: i32,
    pub entries_count: i32,
    /// Byte size of the offsets and entries section.
    pub entries_size: i64,
    pub sampling_level: i32,
    pub size_at_full_sampling: i32,
}

impl Decode for SummaryHeader {
    fn decode(stream: &mut Stream<'_>) -> Result<Self> {
        Ok(Self {
            min_interval: stream.int32()?,
            entries_count: stream.int32()?,
            entries_size: stream.int64()?,
            sampling_level: stream.int32()?,
            size_at_full_sampling: stream.int32()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryEntry {
    pub key: Bytes,
    /// Position of the key in the index file.
    pub position: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub header: SummaryHeader,
    pub entries: Vec<SummaryEntry>,
    pub first_key: Bytes,
    pub last_key: Bytes,
    /// Offset right past the last key.
    pub total_size: usize,
}

/// Byte spans of the entries, relative to the end of the header. The offset table has one
/// offset per entry, the end of the last one is `entries_size`.
pub fn entry_spans(offsets: &[i32], entries_size: i64) -> Vec<Range<i64>> {
    offsets
        .iter()
        .map(|&offset| offset as i64)
        .zip(
            offsets
                .iter()
                .skip(1)
                .map(|&offset| offset as i64)
                .chain(std::iter::once(entries_size)),
        )
        .map(|(start, end)| start..end)
        .collect()
}

fn length(value: impl Length, ty: &'static str, offset: usize) -> Result<usize> {
    value.to_len().ok_or(DecodeError::InvalidLength {
        ty,
        length: value.raw(),
        offset,
    })
}

pub fn decode(data: &[u8]) -> Result<Summary> {
    let mut stream = Stream::new(data);
    let header: SummaryHeader = stream.decode()?;

    let count = length(header.entries_count, "entries count", 4)?;
    let entries_size = length(header.entries_size, "entries size", 8)?;

    let mut offsets = Vec::with_capacity(count.min(stream.remaining() / 4));
    for _ in 0..count {
        offsets.push(stream.int32_le()?);
    }

    let mut tail = Stream::at(data, HEADER_SIZE);
    tail.skip(entries_size)?;
    let first_key = tail.bytes(&of::<i32>())?;
    let last_key = tail.bytes(&of::<i32>())?;

    let mut entries = Vec::with_capacity(count);
    for (index, span) in entry_spans(&offsets, header.entries_size)
        .into_iter()
        .enumerate()
    {
        if span.start < 0
            || span.end - span.start < POSITION_SIZE
            || span.end > header.entries_size
        {
            return Err(DecodeError::InvalidSpan {
                index,
                start: span.start,
                end: span.end,
            });
        }

        let mut entry = Stream::at(data, HEADER_SIZE + span.start as usize);
        let key = entry.raw((span.end - span.start - POSITION_SIZE) as usize)?;
        let position = entry.int64()?;
        trace!(index, key_len = key.len(), position, "decoded summary entry");

        entries.push(SummaryEntry { key, position });
    }

    Ok(Summary {
        header,
        entries,
        first_key,
        last_key,
        total_size: tail.offset(),
    })
}
