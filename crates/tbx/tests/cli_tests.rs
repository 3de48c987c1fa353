// TBX - Traceback Explorer
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use tracing::info;

fn tbx() -> Command {
    let mut cmd = Command::cargo_bin("tbx").unwrap();
    cmd.env_remove("RUST_LOG").env_remove("TB_EXPLORER_HOST").env_remove("DF_EXPLORER_HOST");
    cmd
}

#[test]
fn test_help_command() {
    tbx_common::logging::ensure_test_logging(None);
    info!("Testing CLI help command");

    tbx().arg("--help").assert().success().stdout(predicate::str::contains("Traceback Explorer"));
}

#[test]
fn test_version_command() {
    tbx_common::logging::ensure_test_logging(None);
    info!("Running test");
    tbx().arg("--version").assert().success().stdout(predicate::str::contains("tbx"));
}

#[test]
fn test_serve_subcommand_help() {
    tbx_common::logging::ensure_test_logging(None);
    info!("Running test");
    tbx()
        .args(["serve", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Path of the data storing folder"));
}

#[test]
fn test_missing_subcommand() {
    tbx_common::logging::ensure_test_logging(None);
    info!("Running test");
    tbx().assert().failure().stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_demo_then_inspect() {
    tbx_common::logging::ensure_test_logging(None);
    let dir = TempDir::new().unwrap();
    let dump = dir.path().join("demo.dump");

    tbx()
        .args(["demo", "--output"])
        .arg(&dump)
        .assert()
        .success()
        .stdout(predicate::str::contains("Traceback written to"));

    tbx()
        .arg("inspect")
        .arg(&dump)
        .assert()
        .success()
        .stdout(predicate::str::contains("Traceback (most recent call last):"))
        .stdout(predicate::str::contains("in ratio"))
        .stdout(predicate::str::contains("x = 42 (int)"))
        .stdout(predicate::str::contains("not transmitted: stdout"))
        .stdout(predicate::str::contains("DemoError: division by zero"));
}

#[test]
fn test_inspect_corrupt_dump() {
    tbx_common::logging::ensure_test_logging(None);
    let dir = TempDir::new().unwrap();
    let dump = dir.path().join("broken.dump");
    std::fs::write(&dump, b"garbage").unwrap();

    tbx().arg("inspect").arg(&dump).assert().failure().stderr(predicate::str::contains("corrupt"));
}

#[test]
fn test_upload_without_host() {
    tbx_common::logging::ensure_test_logging(None);
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("frame.arrow");
    std::fs::write(&file, b"columns").unwrap();

    tbx()
        .arg("upload-df")
        .arg(&file)
        .arg("sales")
        .assert()
        .failure()
        .stderr(predicate::str::contains("DF_EXPLORER_HOST"));
}
