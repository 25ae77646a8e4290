//! pkgwatch - samples the process table and tracks how often installed
//! executables are actually used.
//!
//! The collector walks the proc filesystem once per cycle, resolves each
//! running command to its executable, and maintains a durable count/last-seen
//! index. A separate reporting pass attributes accumulated counts to the
//! packages that own the executables.

pub mod attribution;
pub mod collector;
pub mod config;
pub mod db;
pub mod index;
pub mod resolver;
