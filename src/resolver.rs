//! Shell-like $PATH resolution for raw command tokens

use std::env;
use std::ffi::CString;

use anyhow::{bail, Result};

/// Ordered list of search directories, parsed once at startup from the `PATH`
/// environment variable. Immutable afterwards.
pub struct SearchPaths {
    dirs: Vec<String>,
}

impl SearchPaths {
    pub fn new(dirs: Vec<String>) -> Self {
        Self { dirs }
    }

    /// Split `PATH` on `:`. An unset or empty `PATH` leaves the collector
    /// unable to resolve anything, so it is a fatal configuration error.
    pub fn from_env() -> Result<Self> {
        match env::var("PATH") {
            Ok(s) if !s.is_empty() => {
                Ok(Self::new(s.split(':').map(str::to_string).collect()))
            }
            _ => bail!("PATH is not defined"),
        }
    }

    pub fn dirs(&self) -> &[String] {
        &self.dirs
    }

    /// Resolve a raw argv[0] token to an absolute executable path.
    ///
    /// Tokens already starting with `/` are returned unchanged. Anything else
    /// is probed against each search directory in order; the first directory
    /// holding an executable match wins, exactly like shell lookup. `None`
    /// is the routine outcome for tokens that resolve nowhere.
    pub fn resolve(&self, raw: &str) -> Option<String> {
        if raw.starts_with('/') {
            return Some(raw.to_string());
        }
        for dir in &self.dirs {
            let candidate = format!("{}/{}", dir, raw);
            if is_executable(&candidate) {
                return Some(candidate);
            }
        }
        None
    }
}

/// Ask the kernel whether the collector itself could execute `path`.
fn is_executable(path: &str) -> bool {
    let Ok(cpath) = CString::new(path) else {
        return false;
    };
    // SAFETY: cpath is a valid NUL-terminated string for the duration of the
    // call.
    unsafe { libc::access(cpath.as_ptr(), libc::X_OK) == 0 }
}
