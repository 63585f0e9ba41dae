use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use std::fs::File;
use std::process::Command;

fn tar_names<R: std::io::Read>(reader: R) -> Vec<String> {
    let mut ar = tar::Archive::new(reader);
    ar.entries()
        .unwrap()
        .map(|e| {
            e.unwrap()
                .path()
                .unwrap()
                .to_string_lossy()
                .trim_end_matches('/')
                .to_string()
        })
        .collect()
}

#[test]
fn creates_archive_and_lists_entries_when_not_a_terminal() {
    let td = assert_fs::TempDir::new().unwrap();
    let data = td.child("projects");
    data.create_dir_all().unwrap();
    data.child("a.txt").write_str("hello world").unwrap();
    data.child("sub/b.txt").write_str("nested contents here").unwrap();

    let dest = td.child("projects.tar");
    Command::cargo_bin("packup")
        .unwrap()
        .args([
            "--from",
            data.path().to_str().unwrap(),
            "--to",
            dest.path().to_str().unwrap(),
        ])
        .assert()
        .success()
        // stdout is piped, so the run logs one line per archived entry
        .stdout(predicate::str::contains("a.txt"))
        .stdout(predicate::str::contains("Creating \"projects.tar\""));

    dest.assert(predicate::path::exists());
    let names = tar_names(File::open(dest.path()).unwrap());
    assert!(names.iter().any(|n| n == "projects/sub/b.txt"));
    assert!(names.iter().all(|n| n == "projects" || n.starts_with("projects/")));
}

#[test]
fn missing_extension_is_rejected_without_creating_a_file() {
    let td = assert_fs::TempDir::new().unwrap();
    let data = td.child("projects");
    data.create_dir_all().unwrap();
    data.child("a.txt").write_str("hello").unwrap();

    let dest = td.child("backup");
    Command::cargo_bin("packup")
        .unwrap()
        .args([
            "--from",
            data.path().to_str().unwrap(),
            "--to",
            dest.path().to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("extension"));

    dest.assert(predicate::path::missing());
}

#[test]
fn exclude_pattern_prunes_the_subtree() {
    let td = assert_fs::TempDir::new().unwrap();
    let data = td.child("projects");
    data.create_dir_all().unwrap();
    data.child("a.txt").write_str("keep me").unwrap();
    data.child("sub/b.txt").write_str("drop me").unwrap();

    let dest = td.child("projects.tar");
    Command::cargo_bin("packup")
        .unwrap()
        .args([
            "--from",
            data.path().to_str().unwrap(),
            "--to",
            dest.path().to_str().unwrap(),
            "--exclude",
            "sub",
        ])
        .assert()
        .success();

    let names = tar_names(File::open(dest.path()).unwrap());
    assert!(names.iter().any(|n| n == "projects/a.txt"));
    assert!(!names.iter().any(|n| n.contains("sub")));
}

#[test]
fn gzip_writes_a_valid_compressed_archive() {
    let td = assert_fs::TempDir::new().unwrap();
    let data = td.child("projects");
    data.create_dir_all().unwrap();
    data.child("a.txt")
        .write_str(&"squeeze this line down. ".repeat(2048))
        .unwrap();

    let dest = td.child("projects.tar.gz");
    Command::cargo_bin("packup")
        .unwrap()
        .args([
            "--from",
            data.path().to_str().unwrap(),
            "--to",
            dest.path().to_str().unwrap(),
            "--gzip",
            "--verbose",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Compression ratio"));

    let gz = flate2::read::GzDecoder::new(File::open(dest.path()).unwrap());
    let names = tar_names(gz);
    assert!(names.iter().any(|n| n == "projects/a.txt"));
}

#[test]
fn silent_suppresses_all_non_error_output() {
    let td = assert_fs::TempDir::new().unwrap();
    let data = td.child("projects");
    data.create_dir_all().unwrap();
    data.child("a.txt").write_str("quiet").unwrap();

    let dest = td.child("projects.tar");
    Command::cargo_bin("packup")
        .unwrap()
        .args([
            "--from",
            data.path().to_str().unwrap(),
            "--to",
            dest.path().to_str().unwrap(),
            "--silent",
        ])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());

    dest.assert(predicate::path::exists());
}

#[test]
fn verbose_and_silent_conflict() {
    let td = assert_fs::TempDir::new().unwrap();
    let data = td.child("projects");
    data.create_dir_all().unwrap();

    Command::cargo_bin("packup")
        .unwrap()
        .args([
            "--from",
            data.path().to_str().unwrap(),
            "--to",
            "out.tar",
            "--verbose",
            "--silent",
        ])
        .assert()
        .failure();
}

#[test]
fn missing_source_directory_fails_with_one_error_line() {
    let td = assert_fs::TempDir::new().unwrap();
    Command::cargo_bin("packup")
        .unwrap()
        .args([
            "--from",
            td.child("nowhere").path().to_str().unwrap(),
            "--to",
            td.child("out.tar").path().to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a readable directory"));
}

#[test]
fn bad_exclude_pattern_fails_at_startup() {
    let td = assert_fs::TempDir::new().unwrap();
    let data = td.child("projects");
    data.create_dir_all().unwrap();

    Command::cargo_bin("packup")
        .unwrap()
        .args([
            "--from",
            data.path().to_str().unwrap(),
            "--to",
            td.child("out.tar").path().to_str().unwrap(),
            "--exclude",
            "[invalid",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid exclude pattern"));
}
