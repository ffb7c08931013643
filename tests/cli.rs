use assert_cmd::Command;
use predicates::prelude::*;

fn temp_conf(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("stratus-cli-{}-{}.json", name, std::process::id()))
}

#[test]
fn test_help_lists_subcommands() {
    Command::cargo_bin("stratus")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("mongo"))
        .stdout(predicate::str::contains("reset-id"));
}

#[test]
fn test_reset_id_writes_config() {
    let path = temp_conf("reset-id");

    Command::cargo_bin("stratus")
        .unwrap()
        .env("STRATUS_CONF", &path)
        .arg("reset-id")
        .assert()
        .success();

    let cfg: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(cfg["node_id"].as_str().unwrap().len(), 32);

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_mongo_sets_uri() {
    let path = temp_conf("mongo");

    Command::cargo_bin("stratus")
        .unwrap()
        .env("STRATUS_CONF", &path)
        .args(["mongo", "mongodb://db.local:27017/stratus"])
        .assert()
        .success();

    let cfg: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(
        cfg["mongo_uri"].as_str().unwrap(),
        "mongodb://db.local:27017/stratus"
    );

    std::fs::remove_file(&path).unwrap();
}
