// End-to-end tests for the geotag-renamer CLI. Geocoding is always disabled so
// nothing here touches the network.
use assert_cmd::Command;
use assert_fs::prelude::*;
use predicates::prelude::*;
use std::fs;

fn cli(home: &assert_fs::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("geotag-renamer-cli").unwrap();
    cmd.env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.child("config").path())
        .env("RUST_LOG", "warn");
    cmd
}

fn photo_dir(temp: &assert_fs::TempDir) -> assert_fs::fixture::ChildPath {
    let photos = temp.child("photos");
    photos.create_dir_all().unwrap();
    photos.child("20241226_0001.jpg").write_binary(b"old").unwrap();
    photos.child("IMG_1234.jpg").write_binary(b"new").unwrap();
    photos
}

#[test]
fn dry_run_prints_plan_and_changes_nothing() {
    let temp = assert_fs::TempDir::new().unwrap();
    let photos = photo_dir(&temp);

    cli(&temp)
        .arg("rename")
        .arg(photos.path())
        .arg("--no-geocoding")
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"IMG_1234\.jpg -> \d{14}_0002\.jpg").unwrap())
        .stdout(predicate::str::contains("20241226_0001.jpg skipped"))
        .stderr(predicate::str::contains("dry run"));

    photos.child("IMG_1234.jpg").assert(predicate::path::exists());
}

#[test]
fn json_output_is_machine_readable() {
    let temp = assert_fs::TempDir::new().unwrap();
    let photos = photo_dir(&temp);

    cli(&temp)
        .arg("rename")
        .arg(photos.path())
        .args(["--no-geocoding", "--output", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"action\": \"rename\""))
        .stdout(predicate::str::contains("\"reason\": \"already-processed\""));
}

#[test]
fn apply_then_undo_round_trip() {
    let temp = assert_fs::TempDir::new().unwrap();
    let photos = photo_dir(&temp);

    cli(&temp)
        .arg("rename")
        .arg(photos.path())
        .args(["--no-geocoding", "--apply"])
        .assert()
        .success()
        .stderr(predicate::str::contains("applied: 1"));

    photos.child("IMG_1234.jpg").assert(predicate::path::missing());
    let renamed: Vec<String> = fs::read_dir(photos.path())
        .unwrap()
        .flatten()
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|name| name.ends_with("_0002.jpg"))
        .collect();
    assert_eq!(renamed.len(), 1);

    cli(&temp)
        .arg("undo")
        .assert()
        .success()
        .stdout(predicate::str::contains("restored: 1"));
    photos.child("IMG_1234.jpg").assert(predicate::path::exists());
}

#[test]
fn custom_separator_is_used() {
    let temp = assert_fs::TempDir::new().unwrap();
    let photos = temp.child("photos");
    photos.child("a.png").write_binary(b"x").unwrap();

    cli(&temp)
        .arg("rename")
        .arg(photos.path())
        .args(["--no-geocoding", "--separator", "-"])
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"a\.png -> \d{14}-0001\.png").unwrap());
}

#[test]
fn videos_are_listed_not_renamed() {
    let temp = assert_fs::TempDir::new().unwrap();
    let photos = temp.child("photos");
    photos.child("clip.mp4").write_binary(b"video").unwrap();

    cli(&temp)
        .arg("rename")
        .arg(photos.path())
        .args(["--no-geocoding", "--apply"])
        .assert()
        .success()
        .stdout(predicate::str::contains("videos (not renamed):"))
        .stdout(predicate::str::contains("clip.mp4"));

    photos.child("clip.mp4").assert(predicate::path::exists());
}

#[test]
fn missing_directory_fails() {
    let temp = assert_fs::TempDir::new().unwrap();

    cli(&temp)
        .arg("rename")
        .arg(temp.child("nowhere").path())
        .arg("--no-geocoding")
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn watermark_requires_external_compositor() {
    let temp = assert_fs::TempDir::new().unwrap();
    let photos = photo_dir(&temp);

    cli(&temp)
        .arg("rename")
        .arg(photos.path())
        .args(["--no-geocoding", "--watermark"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--compositor-cmd"));
}

#[test]
fn config_file_overrides_defaults() {
    let temp = assert_fs::TempDir::new().unwrap();
    let config = temp.child("custom.toml");
    config
        .write_str("separator = \"-\"\ngeocoding = false\n")
        .unwrap();

    cli(&temp)
        .arg("--config")
        .arg(config.path())
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("separator = \"-\""))
        .stdout(predicate::str::contains("geocoding = false"));
}

#[test]
fn undo_without_history_fails() {
    let temp = assert_fs::TempDir::new().unwrap();

    cli(&temp)
        .arg("undo")
        .assert()
        .failure()
        .stderr(predicate::str::contains("nothing to undo"));
}

#[test]
fn config_init_writes_file_once() {
    let temp = assert_fs::TempDir::new().unwrap();
    let config = temp.child("settings").child("geotag.toml");

    cli(&temp)
        .arg("--config")
        .arg(config.path())
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("wrote"));
    config.assert(predicate::str::contains("separator = \"_\""));
    config.assert(predicate::str::contains("map_opacity = 70"));

    cli(&temp)
        .arg("--config")
        .arg(config.path())
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
}

#[test]
fn config_init_uses_os_config_directory() {
    let temp = assert_fs::TempDir::new().unwrap();

    cli(&temp).args(["config", "init"]).assert().success();

    temp.child("config")
        .child("geotag-renamer")
        .child("config.toml")
        .assert(predicate::path::exists());
}
