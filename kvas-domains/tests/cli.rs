use assert_cmd::Command;
use predicates::prelude::*;
use std::fs::{self, write};
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::thread;
use tempfile::tempdir;

const PRIMARY_BODY: &str = "a.example.com\nb.example.com\nfull:c.example.com\n";

/// Serves `PRIMARY_BODY` to every request on a random local port.
fn serve_primary() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            let mut buf = [0u8; 2048];
            let _ = stream.read(&mut buf);
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nContent-Type: text/plain\r\nConnection: close\r\n\r\n{PRIMARY_BODY}",
                PRIMARY_BODY.len()
            );
            let _ = stream.write_all(response.as_bytes());
        }
    });
    format!("http://{addr}/inside-kvas.lst")
}

fn write_config(dir: &Path, out: &Path, primary_url: &str) -> PathBuf {
    let config_path = dir.join("kvas.yaml");
    write(
        &config_path,
        format!(
            "output:\n  dir: {}\nsources:\n  primary:\n    name: itdog\n    url: {primary_url}\nfetch:\n  timeout_secs: 5\n",
            out.display()
        ),
    )
    .unwrap();
    config_path
}

/// File names and contents under `dir`, sorted by name.
fn snapshot_dir(dir: &Path) -> Vec<(String, Vec<u8>)> {
    let mut entries: Vec<(String, Vec<u8>)> = fs::read_dir(dir)
        .unwrap()
        .map(|e| {
            let path = e.unwrap().path();
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            (name, fs::read(&path).unwrap_or_default())
        })
        .collect();
    entries.sort();
    entries
}

#[test]
fn help_lists_the_build_command() {
    let mut cmd = Command::cargo_bin("kvas-domains").expect("Binary exists");
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("build"));
}

#[test]
fn missing_config_fails() {
    let mut cmd = Command::cargo_bin("kvas-domains").expect("Binary exists");
    cmd.arg("build")
        .arg("--config")
        .arg("/nonexistent/kvas.yaml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config file"));
}

#[test]
fn unreachable_sources_fail_the_build_but_write_reports() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("dist");
    let config_path = dir.path().join("kvas.yaml");
    // Port 9 on localhost refuses connections.
    write(
        &config_path,
        format!(
            "output:\n  dir: {}\n  repo: owner/kvas\nsources:\n  primary:\n    name: itdog\n    url: http://127.0.0.1:9/inside-kvas.lst\nfetch:\n  timeout_secs: 2\n",
            out.display()
        ),
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("kvas-domains").expect("Binary exists");
    cmd.arg("build")
        .arg("--config")
        .arg(&config_path)
        .assert()
        .failure();

    assert!(out.join("report.md").exists());
    assert!(out.join("alert.txt").exists());
    assert!(!out.join("inside-kvas.lst").exists());
    assert!(!out.join("state.json").exists());
}

#[test]
fn build_writes_lists_state_and_reports() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("dist");
    let config_path = write_config(dir.path(), &out, &serve_primary());

    Command::cargo_bin("kvas-domains")
        .expect("Binary exists")
        .arg("build")
        .arg("--config")
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("3 / 3000 lines"));

    assert_eq!(
        fs::read_to_string(out.join("inside-kvas.lst")).unwrap(),
        "a.example.com\nb.example.com\nc.example.com\n"
    );
    assert!(out.join("state.json").exists());
    assert!(out.join("stats.json").exists());
    assert!(out.join("report.md").exists());
}

#[test]
fn failed_list_write_leaves_state_untouched() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("dist");
    // A directory where the final list should go makes the write fail.
    fs::create_dir_all(out.join("inside-kvas.lst").join("blocker")).unwrap();
    let config_path = write_config(dir.path(), &out, &serve_primary());

    Command::cargo_bin("kvas-domains")
        .expect("Binary exists")
        .arg("build")
        .arg("--config")
        .arg(&config_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to write domain lists"));

    assert!(!out.join("state.json").exists());
    assert!(!out.join("stats.json").exists());
}

#[test]
fn dry_run_writes_nothing() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("dist");
    fs::create_dir_all(&out).unwrap();
    write(out.join("inside-kvas.lst"), "old.example.com\n").unwrap();
    write(out.join("report.md"), "# old report\n").unwrap();
    let before = snapshot_dir(&out);
    // Port 9 on localhost refuses connections.
    let config_path = write_config(dir.path(), &out, "http://127.0.0.1:9/inside-kvas.lst");

    Command::cargo_bin("kvas-domains")
        .expect("Binary exists")
        .arg("build")
        .arg("--config")
        .arg(&config_path)
        .arg("--dry-run")
        .assert()
        .failure();

    assert_eq!(snapshot_dir(&out), before);
}

#[test]
fn dry_run_reports_unreadable_state() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("dist");
    fs::create_dir_all(&out).unwrap();
    write(out.join("state.json"), "{ not json").unwrap();
    let before = snapshot_dir(&out);
    let config_path = write_config(dir.path(), &out, &serve_primary());

    Command::cargo_bin("kvas-domains")
        .expect("Binary exists")
        .arg("build")
        .arg("--config")
        .arg(&config_path)
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("severity Warning"))
        .stdout(predicate::str::contains(
            "warning: state: previous snapshot unreadable",
        ));

    assert_eq!(snapshot_dir(&out), before);
}
