use crate::index::{IndexEntry, PartitionSize};
use crate::summary::Summary;
use std::io::{self, Write};
use strum::{Display, EnumString};

/// Threshold that lets every partition through, the unknown size of the last one included.
pub const REPORT_EVERYTHING: i64 = -2;

/// Receives the decoded contents of index files, one file after another.
///
/// Calls come in this order for every file: `report_file`, `begin_entries`, then for every
/// reported partition `partition_start`, `promoted_start` and `promoted_entry` calls when it has
/// a promoted index, `partition_end`, and finally `end` with the count of all partitions.
pub trait Report {
    fn report_file(&mut self, file: &str) -> io::Result<()>;

    fn begin_entries(&mut self) -> io::Result<()>;

    fn partition_start(
        &mut self,
        key: &[u8],
        position: i64,
        promoted_length: i32,
        size: PartitionSize,
    ) -> io::Result<()>;

    fn promoted_start(
        &mut self,
        deletion_time: i32,
        timestamp: i64,
        entries_count: i32,
    ) -> io::Result<()>;

    fn promoted_entry(&mut self, start: &[u8], end: &[u8], offset: i64, width: i64)
        -> io::Result<()>;

    fn partition_end(&mut self) -> io::Result<()>;

    fn end(&mut self, partitions: u64) -> io::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ReportKind {
    Full,
    Summary,
    Null,
}

impl ReportKind {
    pub fn build<'w, W: Write + 'w>(self, out: W) -> Box<dyn Report + 'w> {
        match self {
            ReportKind::Full => Box::new(FullReport::new(out)),
            ReportKind::Summary => Box::new(SummaryReport::new(out)),
            ReportKind::Null => Box::new(NullReport),
        }
    }
}

/// Forwards one decoded entry to `report`, unless its size is below `threshold`.
pub fn report_entry(report: &mut dyn Report, entry: &IndexEntry, threshold: i64) -> io::Result<()> {
    let mut null = NullReport;
    let report: &mut dyn Report = if entry.size.raw() < threshold {
        &mut null
    } else {
        report
    };

    report.partition_start(&entry.key, entry.position, entry.promoted_length, entry.size)?;

    if let Some(promoted) = &entry.promoted {
        report.promoted_start(promoted.deletion_time, promoted.timestamp, promoted.entries_count)?;
        for e in &promoted.entries {
            report.promoted_entry(&e.start, &e.end, e.offset, e.width)?;
        }
    }

    report.partition_end()
}

/// Everything in the file, field by field.
#[derive(Debug)]
pub struct FullReport<W> {
    out: W,
}

impl<W: Write> FullReport<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Report for FullReport<W> {
    fn report_file(&mut self, file: &str) -> io::Result<()> {
        writeln!(self.out, "Parsing {file}")
    }

    fn begin_entries(&mut self) -> io::Result<()> {
        writeln!(self.out, "Index entries:")
    }

    fn partition_start(
        &mut self,
        key: &[u8],
        position: i64,
        promoted_length: i32,
        size: PartitionSize,
    ) -> io::Result<()> {
        writeln!(self.out, "\tKey:\t\t\t{}", hex::encode(key))?;
        writeln!(self.out, "\tPosition:\t\t{position}")?;
        writeln!(self.out, "\tPromoted length:\t{promoted_length}")?;
        writeln!(self.out, "\tPartition size:\t{size}")
    }

    fn promoted_start(
        &mut self,
        deletion_time: i32,
        timestamp: i64,
        entries_count: i32,
    ) -> io::Result<()> {
        writeln!(self.out, "\tDeletion time:\t\t{deletion_time}")?;
        writeln!(self.out, "\tTimestamp:\t\t{timestamp}")?;
        writeln!(self.out, "\tEntries count:\t\t{entries_count}")
    }

    fn promoted_entry(
        &mut self,
        start: &[u8],
        end: &[u8],
        offset: i64,
        width: i64,
    ) -> io::Result<()> {
        writeln!(self.out, "\t\tStart:\t{}", hex::encode(start))?;
        writeln!(self.out, "\t\tEnd:\t{}", hex::encode(end))?;
        writeln!(self.out, "\t\tOffset:\t{offset}")?;
        writeln!(self.out, "\t\tLength:\t{width}\n")
    }

    fn partition_end(&mut self) -> io::Result<()> {
        writeln!(self.out)
    }

    fn end(&mut self, partitions: u64) -> io::Result<()> {
        writeln!(self.out, "Total partitions:\t\t\t{partitions}")?;
        self.out.flush()
    }
}

#[derive(Debug, Default)]
struct Partition {
    key: Vec<u8>,
    position: i64,
    promoted_length: i32,
    size: i64,
}

/// One line per partition: position, promoted length, size, key and file.
#[derive(Debug)]
pub struct SummaryReport<W> {
    out: W,
    file: String,
    current: Partition,
}

impl<W: Write> SummaryReport<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            file: String::new(),
            current: Partition::default(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Report for SummaryReport<W> {
    fn report_file(&mut self, file: &str) -> io::Result<()> {
        self.file = file.to_string();
        Ok(())
    }

    fn begin_entries(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn partition_start(
        &mut self,
        key: &[u8],
        position: i64,
        promoted_length: i32,
        size: PartitionSize,
    ) -> io::Result<()> {
        self.current = Partition {
            key: key.to_vec(),
            position,
            promoted_length,
            size: size.raw(),
        };
        Ok(())
    }

    fn promoted_start(&mut self, _: i32, _: i64, _: i32) -> io::Result<()> {
        Ok(())
    }

    fn promoted_entry(&mut self, _: &[u8], _: &[u8], _: i64, _: i64) -> io::Result<()> {
        Ok(())
    }

    fn partition_end(&mut self) -> io::Result<()> {
        let p = &self.current;
        writeln!(
            self.out,
            "{:12} {:9} {:12} {} {}",
            p.position,
            p.promoted_length,
            p.size,
            hex::encode(&p.key),
            self.file
        )
    }

    fn end(&mut self, _: u64) -> io::Result<()> {
        self.out.flush()
    }
}

/// Swallows everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReport;

impl Report for NullReport {
    fn report_file(&mut self, _: &str) -> io::Result<()> {
        Ok(())
    }

    fn begin_entries(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn partition_start(&mut self, _: &[u8], _: i64, _: i32, _: PartitionSize) -> io::Result<()> {
        Ok(())
    }

    fn promoted_start(&mut self, _: i32, _: i64, _: i32) -> io::Result<()> {
        Ok(())
    }

    fn promoted_entry(&mut self, _: &[u8], _: &[u8], _: i64, _: i64) -> io::Result<()> {
        Ok(())
    }

    fn partition_end(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn end(&mut self, _: u64) -> io::Result<()> {
        Ok(())
    }
}

/// Writes the whole content of a decoded summary file.
pub fn dump_summary<W: Write>(out: &mut W, summary: &Summary) -> io::Result<()> {
    let header = &summary.header;
    writeln!(out, "Minimal interval:\t{}", header.min_interval)?;
    writeln!(out, "Number of entries:\t{}", header.entries_count)?;
    writeln!(out, "Summary entries size:\t{}", header.entries_size)?;
    writeln!(out, "Sampling level:\t\t{}", header.sampling_level)?;
    writeln!(out, "Size at full sampling:\t{}", header.size_at_full_sampling)?;
    writeln!(out, "First key:\t\t{}", hex::encode(&summary.first_key))?;
    writeln!(out, "Last key:\t\t{}", hex::encode(&summary.last_key))?;
    writeln!(out, "Total summary size:\t{}", summary.total_size)?;
    writeln!(out, "Entries:")?;

    for entry in &summary.entries {
        writeln!(
            out,
            "\tKey {} at position {}",
            hex::encode(&entry.key),
            entry.position
        )?;
    }

    out.flush()
}
