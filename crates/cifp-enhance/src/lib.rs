//! CIFP Enhancement Engine
//!
//! Streams an FAA CIFP file (ARINC 424 records, one per line) from a reader to
//! a writer, applying the enabled enhancements record by record. Memory use is
//! bounded by one record plus whatever state an enhancement keeps (the set of
//! localizer keys already written, for duplicate removal).
//!
//! # Example
//!
//! ```
//! use cifp_enhance::{process, Options};
//!
//! let input: &[u8] = b"HDR01FAACIFP18\n";
//! let mut output = Vec::new();
//! let stats = process(input, &mut output, &Options::new().remove_duplicate_localizers(true)).unwrap();
//! assert_eq!(stats.records_written, 1);
//! assert_eq!(output, input);
//! ```

pub mod record;

use std::collections::HashSet;
use std::io::{BufRead, Write};

use thiserror::Error;
use tracing::{debug, trace};

pub use record::{LocalizerKey, Record, RECORD_LENGTH};

/// Enhancements applied while streaming.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    /// Drop localizer records whose airport, localizer identifier and
    /// continuation number were already written.
    pub remove_duplicate_localizers: bool,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remove_duplicate_localizers(mut self, enabled: bool) -> Self {
        self.remove_duplicate_localizers = enabled;
        self
    }
}

/// Counters for one `process` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub records_read: u64,
    pub records_written: u64,
    pub duplicates_removed: u64,
}

#[derive(Error, Debug)]
pub enum EnhanceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Line {line} is {length} columns wide, records are at most {max} columns")]
    RecordTooLong { line: u64, length: usize, max: usize },
}

/// Stream records from `input` to `output`, applying `options`.
///
/// Line terminators (`\n` or `\r\n`) are normalized to `\n`; blank lines are
/// dropped. `output` is flushed before returning successfully.
pub fn process<R, W>(mut input: R, mut output: W, options: &Options) -> Result<Stats, EnhanceError>
where
    R: BufRead,
    W: Write,
{
    let mut stats = Stats::default();
    let mut seen_localizers: HashSet<LocalizerKey> = HashSet::new();
    let mut line = Vec::with_capacity(RECORD_LENGTH + 2);
    let mut line_number = 0u64;

    loop {
        line.clear();
        if input.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        line_number += 1;

        let record_bytes = trim_line_ending(&line);
        if record_bytes.is_empty() {
            continue;
        }
        if record_bytes.len() > RECORD_LENGTH {
            return Err(EnhanceError::RecordTooLong {
                line: line_number,
                length: record_bytes.len(),
                max: RECORD_LENGTH,
            });
        }
        stats.records_read += 1;

        let record = Record::new(record_bytes);
        if options.remove_duplicate_localizers {
            if let Some(key) = record.localizer_key() {
                if seen_localizers.contains(&key) {
                    trace!(line = line_number, "Dropping duplicate localizer record");
                    stats.duplicates_removed += 1;
                    continue;
                }
                seen_localizers.insert(key);
            }
        }

        output.write_all(record.as_bytes())?;
        output.write_all(b"\n")?;
        stats.records_written += 1;
    }

    output.flush()?;

    debug!(
        records_read = stats.records_read,
        records_written = stats.records_written,
        duplicates_removed = stats.duplicates_removed,
        "Enhancement complete"
    );

    Ok(stats)
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};

    const HEADER: &str = "HDR01FAACIFP18      001P013203946709  06-JUN-2020 10:07:06 U.S.A. DOT FAA";
    const LOCALIZER: &str =
        "SUSAP KSFOK2IISFO    0110950ILS                  N37362978W122213100          ";
    const LOCALIZER_OTHER_AIRPORT: &str =
        "SUSAP KOAKK2IISFO    0110950ILS                  N37362978W122213100          ";
    const WAYPOINT: &str =
        "SUSAP KSFOK2CAAAMY K20    W     N37403389W122270817                       E0140";

    fn run(lines: &[&str], options: Options) -> (String, Stats) {
        let input = lines.iter().map(|l| format!("{}\n", l)).collect::<String>();
        let mut output = Vec::new();
        let stats = process(Cursor::new(input), &mut output, &options).unwrap();
        (String::from_utf8(output).unwrap(), stats)
    }

    #[test]
    fn test_passthrough_without_options() {
        let lines = [HEADER, LOCALIZER, LOCALIZER, WAYPOINT];
        let (output, stats) = run(&lines, Options::new());

        assert_eq!(output.lines().collect::<Vec<_>>(), lines);
        assert_eq!(stats.records_read, 4);
        assert_eq!(stats.records_written, 4);
        assert_eq!(stats.duplicates_removed, 0);
    }

    #[test]
    fn test_removes_duplicate_localizers() {
        let lines = [HEADER, LOCALIZER, WAYPOINT, LOCALIZER, LOCALIZER_OTHER_AIRPORT];
        let (output, stats) = run(&lines, Options::new().remove_duplicate_localizers(true));

        assert_eq!(
            output.lines().collect::<Vec<_>>(),
            vec![HEADER, LOCALIZER, WAYPOINT, LOCALIZER_OTHER_AIRPORT]
        );
        assert_eq!(stats.duplicates_removed, 1);
        assert_eq!(stats.records_written, 4);
    }

    #[test]
    fn test_normalizes_line_endings_and_skips_blank_lines() {
        let input = format!("{}\r\n\r\n{}", HEADER, WAYPOINT);
        let mut output = Vec::new();
        let stats = process(Cursor::new(input), &mut output, &Options::new()).unwrap();

        assert_eq!(String::from_utf8(output).unwrap(), format!("{}\n{}\n", HEADER, WAYPOINT));
        assert_eq!(stats.records_read, 2);
    }

    #[test]
    fn test_rejects_overlong_record() {
        let long = "S".repeat(RECORD_LENGTH + 1);
        let input = format!("{}\n{}\n", HEADER, long);
        let err = process(Cursor::new(input), io::sink(), &Options::new()).unwrap_err();

        assert!(matches!(
            err,
            EnhanceError::RecordTooLong { line: 2, length, .. } if length == RECORD_LENGTH + 1
        ));
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_surfaces_write_errors() {
        let err = process(Cursor::new(format!("{}\n", HEADER)), FailingWriter, &Options::new())
            .unwrap_err();
        assert!(matches!(err, EnhanceError::Io(ref e) if e.kind() == io::ErrorKind::BrokenPipe));
    }
}
