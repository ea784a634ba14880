use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn sensormirror(cwd: &Path) -> Command {
    let mut cmd = Command::cargo_bin("sensormirror").unwrap();
    cmd.current_dir(cwd)
        .env_remove("RUST_LOG")
        .env_remove("SENSORMIRROR_ARCHIVE_ROOT");
    cmd
}

/// `parquet data/AB07/{osimxml, 2020_01_01/{levelground/{imu,conditions}, stair/imu}}`
fn create_archive(root: &Path) {
    let participant = root.join("parquet data").join("AB07");
    fs::create_dir_all(participant.join("osimxml")).unwrap();
    for (task, sensor) in [
        ("levelground", "imu"),
        ("levelground", "conditions"),
        ("stair", "imu"),
    ] {
        let dir = participant.join("2020_01_01").join(task).join(sensor);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("trial_01.parquet"), format!("{}/{}", task, sensor)).unwrap();
    }
}

#[test]
fn extract_mirrors_requested_pairs_and_warns() {
    let temp = TempDir::new().unwrap();
    create_archive(temp.path());

    sensormirror(temp.path())
        .args([
            "--output-format",
            "plain",
            "extract",
            "-p",
            "AB07",
            "-t",
            "levelground,stair,ramp",
            "-s",
            "imu,gcRight",
        ])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("task ramp not found"))
        .stdout(predicate::str::contains("Pairs copied: 2"));

    let date = temp.path().join("AB07_modified").join("2020_01_01");
    assert!(date.join("levelground/imu/trial_01.parquet").is_file());
    assert!(date.join("stair/imu/trial_01.parquet").is_file());
    assert!(!date.join("levelground/conditions").exists());
    assert!(temp.path().join(".sensormirror").is_dir());
}

#[test]
fn extract_clean_run_exits_zero() {
    let temp = TempDir::new().unwrap();
    create_archive(temp.path());

    sensormirror(temp.path())
        .args(["-q", "extract", "-p", "AB07", "-t", "stair", "-s", "imu", "--no-report"])
        .assert()
        .success();

    assert!(temp.path().join("AB07_modified/2020_01_01/stair/imu").is_dir());
    assert!(!temp.path().join(".sensormirror").exists());
}

#[test]
fn extract_missing_participant_exits_three() {
    let temp = TempDir::new().unwrap();
    create_archive(temp.path());

    sensormirror(temp.path())
        .args(["--output-format", "plain", "extract", "-p", "AB99", "--no-report"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("AB99"));

    assert!(!temp.path().join("AB99_modified").exists());
}

#[test]
fn extract_missing_archive_root_exits_four() {
    let temp = TempDir::new().unwrap();

    sensormirror(temp.path())
        .args(["extract", "--archive-root", "nowhere"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("nowhere"));
}

#[test]
fn extract_dry_run_writes_nothing() {
    let temp = TempDir::new().unwrap();
    create_archive(temp.path());

    sensormirror(temp.path())
        .args(["--output-format", "json", "extract", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"participant\": \"AB07\""))
        .stdout(predicate::str::contains("2020_01_01"));

    assert!(!temp.path().join("AB07_modified").exists());
    assert!(!temp.path().join(".sensormirror").exists());
}

#[test]
fn extract_reads_config_file() {
    let temp = TempDir::new().unwrap();
    create_archive(temp.path());
    fs::write(
        temp.path().join("sensormirror.toml"),
        "[selection]\ntasks = [\"stair\"]\nsensors = [\"imu\"]\n\n[output]\nmirror_root = \"out\"\nsuffix = \"_imu\"\n",
    )
    .unwrap();

    sensormirror(temp.path())
        .args(["-q", "extract"])
        .assert()
        .success();

    assert!(temp.path().join("out/AB07_imu/2020_01_01/stair/imu").is_dir());
}

#[test]
fn invalid_config_value_exits_one() {
    let temp = TempDir::new().unwrap();
    create_archive(temp.path());
    fs::write(
        temp.path().join("bad.toml"),
        "[selection]\nparticipant_pattern = \"(\"\n",
    )
    .unwrap();

    sensormirror(temp.path())
        .args(["-c", "bad.toml", "extract"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Participant pattern"));
}

#[test]
fn init_config_writes_sample() {
    let temp = TempDir::new().unwrap();

    sensormirror(temp.path())
        .args(["init-config", "mine.toml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("mine.toml"));

    let content = fs::read_to_string(temp.path().join("mine.toml")).unwrap();
    assert!(content.contains("auxiliary_dir = \"osimxml\""));

    sensormirror(temp.path())
        .args(["init-config", "mine.toml"])
        .assert()
        .code(1);
}

#[test]
fn pack_then_unpack_round_trip() {
    let temp = TempDir::new().unwrap();
    create_archive(temp.path());
    let data = temp.path().join("parquet data");

    sensormirror(temp.path())
        .args(["-q", "pack", "parquet data", "--remove-sources"])
        .assert()
        .success();

    assert!(data.join("AB07.tar.gz").is_file());
    assert!(!data.join("AB07").exists());

    sensormirror(temp.path())
        .args(["-q", "unpack", "parquet data", "--remove-sources"])
        .assert()
        .success();

    assert!(!data.join("AB07.tar.gz").exists());
    assert_eq!(
        fs::read_to_string(data.join("AB07/2020_01_01/stair/imu/trial_01.parquet")).unwrap(),
        "stair/imu"
    );
}

#[test]
fn pack_dry_run_lists_folders() {
    let temp = TempDir::new().unwrap();
    create_archive(temp.path());

    sensormirror(temp.path())
        .args(["--output-format", "plain", "pack", "parquet data", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("AB07"));

    assert!(!temp.path().join("parquet data/AB07.tar.gz").exists());
}

#[test]
fn rejects_path_like_sensor_names() {
    let temp = TempDir::new().unwrap();

    sensormirror(temp.path())
        .args(["extract", "-s", "../etc"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("single directory name"));
}

#[test]
fn pack_zip_then_unpack_round_trip() {
    let temp = TempDir::new().unwrap();
    create_archive(temp.path());
    let data = temp.path().join("parquet data");

    sensormirror(temp.path())
        .args(["-q", "pack", "parquet data", "--format", "zip", "--remove-sources"])
        .assert()
        .success();

    assert!(data.join("AB07.zip").is_file());
    assert!(!data.join("AB07").exists());

    sensormirror(temp.path())
        .args(["-q", "unpack", "parquet data"])
        .assert()
        .success();

    assert!(data.join("AB07.zip").exists());
    assert!(data.join("AB07/osimxml").is_dir());
    assert_eq!(
        fs::read_to_string(data.join("AB07/2020_01_01/levelground/imu/trial_01.parquet"))
            .unwrap(),
        "levelground/imu"
    );
}
