//! Process sampler (walks the proc filesystem once per cycle)

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use tracing::debug;

use crate::index::FrequencyIndex;
use crate::resolver::SearchPaths;

/// Map-file targets under these prefixes are never counted: anonymous and
/// deleted mappings plus trees that no package owns.
pub const DEFAULT_IGNORED_PREFIXES: &[&str] = &[
    "anon_inode",
    "/memfd",
    "/root",
    "/home",
    "/proc",
    "/dev",
    "/tmp",
    "/var",
];

/// Everything one collection cycle needs, carried explicitly so the sampler
/// can run against synthetic process trees in tests.
pub struct Sampler {
    proc_dir: PathBuf,
    search_paths: SearchPaths,
    collect_mapped: bool,
    ignored_prefixes: Vec<String>,
}

impl Sampler {
    pub fn new<P: Into<PathBuf>>(proc_dir: P, search_paths: SearchPaths) -> Self {
        Self {
            proc_dir: proc_dir.into(),
            search_paths,
            collect_mapped: false,
            ignored_prefixes: DEFAULT_IGNORED_PREFIXES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    pub fn with_mapped_files(mut self, enabled: bool) -> Self {
        self.collect_mapped = enabled;
        self
    }

    pub fn with_ignored_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.ignored_prefixes = prefixes;
        self
    }

    /// Run one collection cycle against `index`.
    ///
    /// Every update in the cycle shares a single wall-clock timestamp. An
    /// unreadable process directory is an error; failures on individual
    /// process entries are expected churn and are skipped.
    pub fn run_cycle(&self, index: &mut FrequencyIndex) -> Result<()> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        debug!("listing proc: {}", self.proc_dir.display());
        let entries = fs::read_dir(&self.proc_dir)
            .with_context(|| format!("cannot read {}", self.proc_dir.display()))?;

        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
                continue;
            }
            if !entry.path().is_dir() {
                continue;
            }
            self.sample_process(&entry.path(), now, index);
        }
        Ok(())
    }

    fn sample_process(&self, process_dir: &Path, now: u64, index: &mut FrequencyIndex) {
        // The process may have exited between enumeration and read, or be a
        // kernel thread with an empty cmdline. Both are routine.
        if let Ok(bytes) = fs::read(process_dir.join("cmdline")) {
            let first = bytes.split(|&b| b == 0).next().unwrap_or(&[]);
            if !first.is_empty() {
                let raw = String::from_utf8_lossy(first);
                match self.search_paths.resolve(&raw) {
                    Some(path) => {
                        let count = index.count(&path);
                        index.set(&path, count + 1, now);
                    }
                    None => debug!("could not resolve {:?}", raw),
                }
            }
        }

        if self.collect_mapped {
            self.sample_mapped_files(process_dir, now, index);
        }
    }

    /// Count every surviving `map_files` symlink target. A file mapped through
    /// several map entries is counted once per entry, not per process.
    fn sample_mapped_files(&self, process_dir: &Path, now: u64, index: &mut FrequencyIndex) {
        let Ok(entries) = fs::read_dir(process_dir.join("map_files")) else {
            return;
        };
        for entry in entries.flatten() {
            let Ok(target) = fs::read_link(entry.path()) else {
                continue;
            };
            let target = target.to_string_lossy().into_owned();
            if self.is_prefix_ignored(&target) {
                debug!("ignoring {}", target);
                continue;
            }
            let count = index.count(&target);
            index.set(&target, count + 1, now);
        }
    }

    fn is_prefix_ignored(&self, path: &str) -> bool {
        self.ignored_prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }
}
