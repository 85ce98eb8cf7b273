//! CLI-level tests for the configuration maintenance commands

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

fn wpforge(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("wpforge").unwrap();
    cmd.args(["--config", config.to_str().unwrap()]);
    cmd
}

#[test]
fn set_then_get_round_trips_across_processes() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");

    wpforge(&config)
        .args(["config", "set", "forge_token", "tok_123"])
        .assert()
        .success();

    // A separate process must read the persisted value back untouched
    wpforge(&config)
        .args(["config", "get", "forge_token"])
        .assert()
        .success()
        .stdout(predicate::str::contains("tok_123"));
}

#[test]
fn special_characters_survive_the_persistence_layer() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    let value = "abc+def/ghi==";

    wpforge(&config)
        .args(["config", "set", "cloudflare_token", value])
        .assert()
        .success();

    wpforge(&config)
        .args(["config", "get", "cloudflare_token"])
        .assert()
        .success()
        .stdout(predicate::str::contains(value));
}

#[test]
fn listing_hides_reserved_timestamp_keys() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");

    wpforge(&config)
        .args(["config", "set", "staging_domain", "staging.example.com"])
        .assert()
        .success();

    wpforge(&config)
        .args(["config", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("staging_domain"))
        .stdout(predicate::str::contains("created_at").not())
        .stdout(predicate::str::contains("updated_at").not());
}

#[test]
fn getting_a_missing_key_exits_non_zero() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");

    wpforge(&config)
        .args(["config", "get", "forge_token"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown configuration key"));
}

#[test]
fn deleted_keys_are_gone() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");

    wpforge(&config)
        .args(["config", "set", "forge_token", "tok_123"])
        .assert()
        .success();
    wpforge(&config)
        .args(["config", "delete", "forge_token"])
        .assert()
        .success();
    wpforge(&config)
        .args(["config", "get", "forge_token"])
        .assert()
        .failure();
}

#[test]
fn reserved_keys_cannot_be_edited() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");

    wpforge(&config)
        .args(["config", "set", "created_at", "2020-01-01"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("managed automatically"));

    wpforge(&config)
        .args(["config", "delete", "updated_at"])
        .assert()
        .failure();
}
