#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const SAMPLE: &str = "first_name,last_name,day,month,year\n\
                      Ada,Lovelace,10,12,1815\n\
                      Grace,Hopper,9,12,1906\n";

const ENV_KEYS: &[&str] = &[
    "DATA_PATH",
    "GITHUB_TOKEN",
    "BIRTHDAY_APP_EDIT_CSV_TOKEN",
    "GITHUB_APP_ID",
    "GITHUB_APP_INSTALLATION_ID",
    "GITHUB_APP_PRIVATE_KEY",
    "GITHUB_API_URL",
    "GITHUB_REPO_OWNER",
    "GITHUB_REPO",
    "PORT",
];

fn birthdays(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("birthdays").unwrap();
    cmd.current_dir(dir.path());
    for key in ENV_KEYS {
        cmd.env_remove(key);
    }
    cmd.env("DATA_PATH", dir.path().join("birthdays.csv"));
    cmd
}

fn write_data(dir: &TempDir, text: &str) {
    std::fs::write(dir.path().join("birthdays.csv"), text).unwrap();
}

// ---------------------------------------------------------------------------
// birthdays validate
// ---------------------------------------------------------------------------

#[test]
fn validate_accepts_good_file() {
    let dir = TempDir::new().unwrap();
    write_data(&dir, SAMPLE);
    birthdays(&dir)
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("2 records OK"));
}

#[test]
fn validate_reports_row_and_rule() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("other.csv");
    std::fs::write(&path, "Ada,Lovelace,10,12,1815\nFeb,Thirty,30,2,2001\n").unwrap();
    birthdays(&dir)
        .arg("validate")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("row 2: Invalid calendar date"));
}

#[test]
fn validate_rejects_tiny_payload() {
    let dir = TempDir::new().unwrap();
    write_data(&dir, "a,b\n");
    birthdays(&dir)
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid or empty CSV"));
}

#[test]
fn validate_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    birthdays(&dir)
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot read"));
}

#[test]
fn validate_json_output() {
    let dir = TempDir::new().unwrap();
    write_data(&dir, SAMPLE);
    let out = birthdays(&dir)
        .args(["validate", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(json["count"], 2);
}

// ---------------------------------------------------------------------------
// birthdays upcoming
// ---------------------------------------------------------------------------

#[test]
fn upcoming_prints_sorted_table() {
    let dir = TempDir::new().unwrap();
    write_data(&dir, SAMPLE);
    let out = birthdays(&dir)
        .args(["upcoming", "--sort", "day:asc"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("#"));
    assert!(text.contains("NEXT BIRTHDAY"));
    let grace = text.find("Grace Hopper").unwrap();
    let ada = text.find("Ada Lovelace").unwrap();
    assert!(grace < ada);
}

#[test]
fn upcoming_json_keeps_stored_index() {
    let dir = TempDir::new().unwrap();
    write_data(&dir, SAMPLE);
    let out = birthdays(&dir)
        .args(["upcoming", "--sort", "first_name:desc", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
    let rows = json.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["first_name"], "Grace");
    assert_eq!(rows[0]["index"], 1);
}

#[test]
fn upcoming_rejects_unknown_period() {
    let dir = TempDir::new().unwrap();
    write_data(&dir, SAMPLE);
    birthdays(&dir)
        .args(["upcoming", "--period", "someday"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid period 'someday'"));
}

#[test]
fn upcoming_on_missing_file_is_empty() {
    let dir = TempDir::new().unwrap();
    birthdays(&dir)
        .arg("upcoming")
        .assert()
        .success()
        .stdout(predicate::str::contains("No birthdays in period 'all'"));
}

// ---------------------------------------------------------------------------
// birthdays publish
// ---------------------------------------------------------------------------

#[test]
fn publish_without_credentials_names_env_vars() {
    let dir = TempDir::new().unwrap();
    write_data(&dir, SAMPLE);
    birthdays(&dir)
        .arg("publish")
        .assert()
        .failure()
        .stderr(predicate::str::contains("GITHUB_TOKEN"));
}

#[test]
fn publish_opens_pull_request() {
    let dir = TempDir::new().unwrap();
    write_data(&dir, SAMPLE);

    let mut server = mockito::Server::new();
    server
        .mock("GET", "/repos/o/r/git/ref/heads/main")
        .with_status(200)
        .with_body(r#"{"object":{"sha":"base"}}"#)
        .create();
    server
        .mock("POST", "/repos/o/r/git/refs")
        .with_status(201)
        .with_body("{}")
        .create();
    server
        .mock("GET", "/repos/o/r/contents/birthdays.csv")
        .match_query(mockito::Matcher::Any)
        .with_status(404)
        .create();
    server
        .mock("PUT", "/repos/o/r/contents/birthdays.csv")
        .with_status(201)
        .with_body("{}")
        .create();
    server
        .mock("POST", "/repos/o/r/pulls")
        .with_status(201)
        .with_body(r#"{"number":3,"html_url":"https://github.com/o/r/pull/3"}"#)
        .create();

    birthdays(&dir)
        .env("GITHUB_API_URL", server.url())
        .env("GITHUB_TOKEN", "t0k")
        .env("GITHUB_REPO_OWNER", "o")
        .env("GITHUB_REPO", "r")
        .arg("publish")
        .assert()
        .success()
        .stdout(predicate::str::contains("https://github.com/o/r/pull/3"));
}

// ---------------------------------------------------------------------------
// birthdays --help
// ---------------------------------------------------------------------------

#[test]
fn help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    birthdays(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("upcoming"))
        .stdout(predicate::str::contains("publish"));
}
