//! Package attribution: fold per-executable counts into per-package rows

use std::process::Command;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::db::UsageLog;
use crate::index::FrequencyIndex;

/// External package-metadata source. The real implementation shells out to
/// the system's package manager wrappers; tests supply synthetic providers.
pub trait PackageProvider {
    /// Names of every installed package.
    fn packages(&self) -> Result<Vec<String>>;
    /// Absolute paths of the files owned by `name`.
    fn package_files(&self, name: &str) -> Result<Vec<String>>;
}

/// Provider backed by the two external helper programs:
/// `pkgwatch-list-packages` emits one package name per line and
/// `pkgwatch-list-package-files <name>` emits one owned path per line.
pub struct CommandProvider {
    list_packages: String,
    list_package_files: String,
}

impl CommandProvider {
    pub fn new() -> Self {
        Self {
            list_packages: "pkgwatch-list-packages".to_string(),
            list_package_files: "pkgwatch-list-package-files".to_string(),
        }
    }
}

impl Default for CommandProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageProvider for CommandProvider {
    fn packages(&self) -> Result<Vec<String>> {
        let mut cmd = Command::new(&self.list_packages);
        run_lines(&mut cmd).with_context(|| self.list_packages.clone())
    }

    fn package_files(&self, name: &str) -> Result<Vec<String>> {
        let mut cmd = Command::new(&self.list_package_files);
        cmd.arg(name);
        run_lines(&mut cmd).with_context(|| format!("{} {}", self.list_package_files, name))
    }
}

fn run_lines(cmd: &mut Command) -> Result<Vec<String>> {
    let output = cmd.output()?;
    if !output.status.success() {
        anyhow::bail!("exited with {}", output.status);
    }
    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// One package with its owned files, sorted ascending so record keys can be
/// located by binary search.
struct Package {
    name: String,
    files: Vec<String>,
}

/// Classify every persisted record by package ownership.
///
/// Every known package appears in the result, zero-valued if nothing matched
/// it. A record is credited to the first package (in provider enumeration
/// order) whose file list contains its key; records owned by no package are
/// dropped from the attributed view. A failing provider degrades to an empty
/// result and is never fatal.
pub fn attribute<P: PackageProvider>(provider: &P, log: &UsageLog) -> Result<FrequencyIndex> {
    let mut target = FrequencyIndex::new();

    let names = match provider.packages() {
        Ok(names) => names,
        Err(e) => {
            warn!("listing packages failed: {:#}", e);
            Vec::new()
        }
    };

    let mut packages = Vec::with_capacity(names.len());
    for name in names {
        target.set(&name, 0, 0);
        let mut files = match provider.package_files(&name) {
            Ok(files) => files,
            Err(e) => {
                warn!("listing files of {} failed: {:#}", name, e);
                Vec::new()
            }
        };
        files.sort_unstable();
        files.dedup();
        packages.push(Package { name, files });
    }
    debug!("indexed {} packages", packages.len());

    let records = log
        .records()
        .with_context(|| format!("cannot read {}", log.path().display()))?;
    for record in records {
        for package in &packages {
            if package.files.binary_search(&record.key).is_ok() {
                let (count, seen) = target.get(&package.name).unwrap_or((0, 0));
                target.set(
                    &package.name,
                    count + record.count,
                    seen.max(record.last_seen),
                );
                break;
            }
        }
    }

    Ok(target)
}
