//! A structured record of every cycle: one RON tuple per line, e.g.
//!
//! ```text
//! (cycle:1,outcome:Resolved((angle_degrees:210.0,distance_meters:0.2401)))
//! (cycle:2,outcome:TimedOut(missing:[0,2]))
//! ```

use crate::ranging_cycle::CycleOutcome;

use serde::{Deserialize, Serialize};
use std::{
    fmt,
    fs::{File, OpenOptions},
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

/// One line of the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    /// Cycle number, starting at 1.
    pub cycle: u64,
    /// How the cycle ended.
    pub outcome: CycleOutcome,
}

/// Failures reading or writing an outcome log.
#[derive(Debug)]
pub enum OutcomeLogError {
    /// The file could not be read or written.
    IoError(std::io::Error),
    /// A record could not be serialized.
    RonError(ron::Error),
    /// A line that is not an [`OutcomeRecord`], with its line number.
    RonSpannedError(usize, ron::de::SpannedError),
}

impl fmt::Display for OutcomeLogError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OutcomeLogError::IoError(error) => write!(f, "io error: {}", error),
            OutcomeLogError::RonError(error) => write!(f, "ron error: {}", error),
            OutcomeLogError::RonSpannedError(line, error) => {
                write!(f, "line {}: ron spanning error: {}", line, error)
            }
        }
    }
}

impl std::error::Error for OutcomeLogError {}

impl From<std::io::Error> for OutcomeLogError {
    fn from(value: std::io::Error) -> Self {
        Self::IoError(value)
    }
}

/// Appends [`OutcomeRecord`]s to anything [Write]able, flushing after each
/// one so a crash loses at most the cycle in progress.
pub struct OutcomeLog<W: Write> {
    out: W,
}

impl OutcomeLog<BufWriter<File>> {
    /// Opens `path` for appending, creating it if needed.
    pub fn append_to(path: impl AsRef<Path>) -> Result<Self, OutcomeLogError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> OutcomeLog<W> {
    /// A log that writes to `out`.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Appends `outcome` as the record of cycle number `cycle`.
    pub fn record(&mut self, cycle: u64, outcome: &CycleOutcome) -> Result<(), OutcomeLogError> {
        let record = OutcomeRecord {
            cycle,
            outcome: outcome.clone(),
        };
        let line = ron::ser::to_string(&record).map_err(OutcomeLogError::RonError)?;
        writeln!(self.out, "{}", line)?;
        self.out.flush()?;
        Ok(())
    }

    /// The writer underneath.
    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Reads back every record in a log. Blank lines are skipped.
pub fn read_records(input: impl BufRead) -> Result<Vec<OutcomeRecord>, OutcomeLogError> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| line.as_ref().map_or(true, |l| !l.trim().is_empty()))
        .map(|(n, line)| {
            let line = line?;
            ron::de::from_str(&line).map_err(|e| OutcomeLogError::RonSpannedError(n + 1, e))
        })
        .collect()
}

/// Reads back every record in the log at `path`.
pub fn read_path(path: impl AsRef<Path>) -> Result<Vec<OutcomeRecord>, OutcomeLogError> {
    read_records(BufReader::new(File::open(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beacon_hardware::HardwareError;
    use crate::localizer::BearingResult;
    use std::io::Cursor;

    fn some_outcomes() -> Vec<CycleOutcome> {
        vec![
            CycleOutcome::Resolved(BearingResult {
                angle_degrees: 210.0,
                distance_meters: 0.2401,
            }),
            CycleOutcome::TimedOut {
                missing: vec![0, 2],
            },
            CycleOutcome::Indeterminate {
                distance_meters: 0.5,
            },
            CycleOutcome::Aborted(HardwareError::Fault("E42".into())),
        ]
    }

    #[test]
    fn one_line_per_cycle() {
        let mut log = OutcomeLog::new(Vec::new());
        for (i, o) in some_outcomes().iter().enumerate() {
            log.record(i as u64 + 1, o).unwrap();
        }
        let text = String::from_utf8(log.into_inner()).unwrap();
        assert_eq!(text.lines().count(), 4);
        assert!(text.lines().next().unwrap().contains("Resolved"));

        let records = read_records(Cursor::new(text)).unwrap();
        let outcomes: Vec<_> = records.iter().map(|r| r.outcome.clone()).collect();
        assert_eq!(outcomes, some_outcomes());
        assert_eq!(records[3].cycle, 4);
    }

    #[test]
    fn appends_across_opens() {
        let tempfile = tempfile::NamedTempFile::new().unwrap();
        let outcomes = some_outcomes();
        {
            let mut log = OutcomeLog::append_to(tempfile.path()).unwrap();
            log.record(1, &outcomes[0]).unwrap();
        }
        {
            let mut log = OutcomeLog::append_to(tempfile.path()).unwrap();
            log.record(2, &outcomes[1]).unwrap();
        }
        let records = read_path(tempfile.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1], OutcomeRecord { cycle: 2, outcome: outcomes[1].clone() });
    }

    #[test]
    fn reports_the_bad_line() {
        let text = "(cycle:1,outcome:TimedOut(missing:[1]))\n\nnot a record\n";
        match read_records(Cursor::new(text)) {
            Err(OutcomeLogError::RonSpannedError(line, _)) => assert_eq!(line, 3),
            other => panic!("expected a parse error, got {:?}", other),
        }
    }
}
