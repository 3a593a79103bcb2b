use std::fs;

use assert_cmd::Command;

fn jsonnorm() -> Command {
    Command::cargo_bin("jsonnorm").expect("Binary not built")
}

#[test]
fn normalize_writes_a_sibling_document() {
    let dir = tempfile::tempdir().expect("Failed to create a temporary directory");
    let schema = dir.path().join("list.json");
    fs::write(
        &schema,
        r##"{"oneOf": [{"type": "null"}, {"$ref": "#"}]}"##,
    )
    .expect("Failed to write");

    jsonnorm()
        .arg("normalize")
        .arg("--dir")
        .arg(dir.path())
        .current_dir(dir.path())
        .assert()
        .success();

    let normalized = fs::read_to_string(dir.path().join("list_Normalized.json"))
        .expect("Missing normalized output");
    let document: serde_json::Value =
        serde_json::from_str(&normalized).expect("Invalid JSON output");
    assert_eq!(document["oneOf"][1]["$ref"], serde_json::json!("#"));
}

#[test]
fn recursion_writes_a_report() {
    let dir = tempfile::tempdir().expect("Failed to create a temporary directory");
    fs::write(dir.path().join("self.json"), r##"{"$ref": "#"}"##).expect("Failed to write");
    fs::write(dir.path().join("plain.json"), r#"{"type": "object"}"#).expect("Failed to write");
    let report = dir.path().join("report.csv");

    jsonnorm()
        .arg("recursion")
        .arg("--dir")
        .arg(dir.path())
        .arg("--report")
        .arg(&report)
        .current_dir(dir.path())
        .assert()
        .success();

    let report = fs::read_to_string(&report).expect("Missing report");
    let mut lines = report.lines();
    assert_eq!(
        lines.next(),
        Some("name,recursiv,unguarded_recursiv,invalid_reference,illegal_draft")
    );
    let rows: Vec<&str> = lines.collect();
    assert_eq!(rows.len(), 2);
    assert!(rows
        .iter()
        .any(|row| row.contains("self.json") && row.contains("TRUE,TRUE")));
    assert!(rows
        .iter()
        .any(|row| row.contains("plain.json") && !row.contains("TRUE")));
}

#[test]
fn skipped_schema_fails_the_batch() {
    let dir = tempfile::tempdir().expect("Failed to create a temporary directory");
    fs::write(
        dir.path().join("remote.json"),
        r#"{"$ref": "http://example.com/other.json"}"#,
    )
    .expect("Failed to write");

    jsonnorm()
        .arg("normalize")
        .arg("--dir")
        .arg(dir.path())
        .current_dir(dir.path())
        .assert()
        .failure();
}
