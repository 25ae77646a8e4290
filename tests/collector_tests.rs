use std::fs;
use std::os::unix::fs::symlink;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use pkgwatch::collector::Sampler;
use pkgwatch::index::FrequencyIndex;
use pkgwatch::resolver::SearchPaths;
use tempfile::tempdir;

fn fake_process(proc_dir: &Path, pid: &str, cmdline: &[u8]) {
    let dir = proc_dir.join(pid);
    fs::create_dir(&dir).unwrap();
    fs::write(dir.join("cmdline"), cmdline).unwrap();
}

fn no_search_paths() -> SearchPaths {
    SearchPaths::new(Vec::new())
}

#[test]
fn test_absolute_command_counted_without_existence_check() {
    let proc_dir = tempdir().unwrap();
    fake_process(proc_dir.path(), "101", b"/usr/bin/widget\0--flag\0");

    let sampler = Sampler::new(proc_dir.path(), no_search_paths());
    let mut index = FrequencyIndex::new();
    sampler.run_cycle(&mut index).unwrap();

    assert_eq!(index.count("/usr/bin/widget"), 1);
    assert_eq!(index.len(), 1);
}

#[test]
fn test_relative_command_resolved_through_search_paths() {
    let bin_dir = tempdir().unwrap();
    let exe = bin_dir.path().join("widget");
    fs::write(&exe, "#!/bin/sh\n").unwrap();
    fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).unwrap();

    let proc_dir = tempdir().unwrap();
    fake_process(proc_dir.path(), "102", b"widget\0");

    let search = SearchPaths::new(vec![bin_dir.path().to_str().unwrap().to_string()]);
    let sampler = Sampler::new(proc_dir.path(), search);
    let mut index = FrequencyIndex::new();
    sampler.run_cycle(&mut index).unwrap();

    let expected = format!("{}/widget", bin_dir.path().display());
    assert_eq!(index.count(&expected), 1);
}

#[test]
fn test_unresolvable_command_skipped_silently() {
    let proc_dir = tempdir().unwrap();
    fake_process(proc_dir.path(), "103", b"no-such-binary\0");

    let sampler = Sampler::new(proc_dir.path(), no_search_paths());
    let mut index = FrequencyIndex::new();
    sampler.run_cycle(&mut index).unwrap();

    assert!(index.is_empty());
}

#[test]
fn test_empty_cmdline_skipped() {
    let proc_dir = tempdir().unwrap();
    fake_process(proc_dir.path(), "104", b"");

    let sampler = Sampler::new(proc_dir.path(), no_search_paths());
    let mut index = FrequencyIndex::new();
    sampler.run_cycle(&mut index).unwrap();

    assert!(index.is_empty());
}

#[test]
fn test_non_numeric_entries_ignored() {
    let proc_dir = tempdir().unwrap();
    fake_process(proc_dir.path(), "not-a-pid", b"/usr/bin/widget\0");
    fake_process(proc_dir.path(), "12ab", b"/usr/bin/widget\0");
    // A numerically named plain file must not be mistaken for a process.
    fs::write(proc_dir.path().join("999"), b"junk").unwrap();

    let sampler = Sampler::new(proc_dir.path(), no_search_paths());
    let mut index = FrequencyIndex::new();
    sampler.run_cycle(&mut index).unwrap();

    assert!(index.is_empty());
}

#[test]
fn test_repeat_cycles_accumulate() {
    let proc_dir = tempdir().unwrap();
    fake_process(proc_dir.path(), "105", b"/usr/bin/widget\0");

    let sampler = Sampler::new(proc_dir.path(), no_search_paths());
    let mut index = FrequencyIndex::new();
    sampler.run_cycle(&mut index).unwrap();
    sampler.run_cycle(&mut index).unwrap();
    sampler.run_cycle(&mut index).unwrap();

    assert_eq!(index.count("/usr/bin/widget"), 3);
}

#[test]
fn test_entries_in_one_cycle_share_a_timestamp() {
    let proc_dir = tempdir().unwrap();
    fake_process(proc_dir.path(), "106", b"/usr/bin/one\0");
    fake_process(proc_dir.path(), "107", b"/usr/bin/two\0");

    let sampler = Sampler::new(proc_dir.path(), no_search_paths());
    let mut index = FrequencyIndex::new();
    sampler.run_cycle(&mut index).unwrap();

    let (_, t1) = index.get("/usr/bin/one").unwrap();
    let (_, t2) = index.get("/usr/bin/two").unwrap();
    assert_eq!(t1, t2);
}

#[test]
fn test_mapped_files_counted_per_mapping_entry() {
    let proc_dir = tempdir().unwrap();
    fake_process(proc_dir.path(), "108", b"/usr/bin/widget\0");
    let map_dir = proc_dir.path().join("108").join("map_files");
    fs::create_dir(&map_dir).unwrap();
    // The same library mapped through two ranges counts twice.
    symlink("/usr/lib/libwidget.so", map_dir.join("7f0000-7f1000")).unwrap();
    symlink("/usr/lib/libwidget.so", map_dir.join("7f2000-7f3000")).unwrap();
    symlink("/usr/lib/libother.so", map_dir.join("7f4000-7f5000")).unwrap();

    let sampler = Sampler::new(proc_dir.path(), no_search_paths()).with_mapped_files(true);
    let mut index = FrequencyIndex::new();
    sampler.run_cycle(&mut index).unwrap();

    assert_eq!(index.count("/usr/lib/libwidget.so"), 2);
    assert_eq!(index.count("/usr/lib/libother.so"), 1);
}

#[test]
fn test_mapped_files_ignored_prefixes_excluded() {
    let proc_dir = tempdir().unwrap();
    fake_process(proc_dir.path(), "109", b"");
    let map_dir = proc_dir.path().join("109").join("map_files");
    fs::create_dir(&map_dir).unwrap();
    symlink("/dev/zero", map_dir.join("a0-a1")).unwrap();
    symlink("/tmp/scratch.bin", map_dir.join("b0-b1")).unwrap();
    symlink("anon_inode:[eventpoll]", map_dir.join("c0-c1")).unwrap();
    symlink("/usr/lib/libkept.so", map_dir.join("d0-d1")).unwrap();

    let sampler = Sampler::new(proc_dir.path(), no_search_paths()).with_mapped_files(true);
    let mut index = FrequencyIndex::new();
    sampler.run_cycle(&mut index).unwrap();

    assert_eq!(index.count("/usr/lib/libkept.so"), 1);
    assert_eq!(index.len(), 1, "ignored prefixes must never enter the index");
}

#[test]
fn test_mapped_files_disabled_by_default() {
    let proc_dir = tempdir().unwrap();
    fake_process(proc_dir.path(), "110", b"");
    let map_dir = proc_dir.path().join("110").join("map_files");
    fs::create_dir(&map_dir).unwrap();
    symlink("/usr/lib/libwidget.so", map_dir.join("e0-e1")).unwrap();

    let sampler = Sampler::new(proc_dir.path(), no_search_paths());
    let mut index = FrequencyIndex::new();
    sampler.run_cycle(&mut index).unwrap();

    assert!(index.is_empty());
}

#[test]
fn test_empty_proc_dir_leaves_index_unchanged() {
    let proc_dir = tempdir().unwrap();

    let sampler = Sampler::new(proc_dir.path(), no_search_paths());
    let mut index = FrequencyIndex::new();
    index.set("/bin/prior", 4, 40);
    sampler.run_cycle(&mut index).unwrap();

    assert_eq!(index.len(), 1);
    assert_eq!(index.get("/bin/prior"), Some((4, 40)));
}

#[test]
fn test_missing_proc_dir_is_an_error() {
    let gone = tempdir().unwrap();
    let path = gone.path().join("nope");

    let sampler = Sampler::new(path, no_search_paths());
    let mut index = FrequencyIndex::new();
    assert!(sampler.run_cycle(&mut index).is_err());
}
