//! On-disk usage log: encode, decode and merge

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::index::FrequencyIndex;

/// One decoded log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: String,
    pub count: u64,
    pub last_seen: u64,
}

/// The persisted log file: one record per line, `count TAB last_seen TAB
/// escaped-key`. The format is byte-stable; logs written by any version must
/// stay readable by any other.
pub struct UsageLog {
    path: PathBuf,
}

impl UsageLog {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Merge the persisted log into `index`: counts add to whatever the index
    /// already holds, timestamps are replaced by the decoded value. A missing
    /// or unreadable file leaves the index untouched.
    pub fn load_into(&self, index: &mut FrequencyIndex) {
        debug!("reading log file {}", self.path.display());
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) => {
                debug!("cannot read {}: {}", self.path.display(), e);
                return;
            }
        };
        for record in Records::new(BufReader::new(file)) {
            let count = record.count + index.count(&record.key);
            index.set(&record.key, count, record.last_seen);
        }
    }

    /// Stream records without touching any index. Used by the attribution
    /// pass, where the log must not be folded into the target directly.
    pub fn records(&self) -> io::Result<Records<BufReader<File>>> {
        Ok(Records::new(BufReader::new(File::open(&self.path)?)))
    }

    /// Overwrite the log with the current index contents.
    pub fn save(&self, index: &FrequencyIndex) -> io::Result<()> {
        let mut out = BufWriter::new(File::create(&self.path)?);
        write_index(index, &mut out)?;
        out.flush()
    }
}

/// Emit every entry as one line in index iteration order.
pub fn write_index<W: Write>(index: &FrequencyIndex, out: &mut W) -> io::Result<()> {
    for entry in index.iter() {
        write!(out, "{}\t{}\t", entry.count, entry.last_seen)?;
        for b in entry.key.bytes() {
            match b {
                b'\t' => out.write_all(b"\\t")?,
                b'\n' => out.write_all(b"\\n")?,
                b'\\' => out.write_all(b"\\\\")?,
                _ => out.write_all(&[b])?,
            }
        }
        out.write_all(b"\n")?;
    }
    Ok(())
}

/// Streaming decoder. Iteration ends at EOF or at the first structurally
/// invalid record; everything decoded before that point is kept.
pub struct Records<R: BufRead> {
    lines: Lines<R>,
}

impl<R: BufRead> Records<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }
}

impl<R: BufRead> Iterator for Records<R> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        let line = self.lines.next()?.ok()?;
        parse_record(&line)
    }
}

fn parse_record(line: &str) -> Option<Record> {
    let mut fields = line.splitn(3, '\t');
    let count = fields.next()?.parse().ok()?;
    let last_seen = fields.next()?.parse().ok()?;
    let key = unescape(fields.next()?);
    Some(Record {
        key,
        count,
        last_seen,
    })
}

/// Inverse of the encoder's escaping. A backslash followed by anything other
/// than `n`, `t` or `\` yields that character verbatim; a trailing lone
/// backslash is dropped.
fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}
