use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

fn write_stack(dir: &Path, yaml: &str) -> std::path::PathBuf {
    let path = dir.join("stack.yaml");
    std::fs::write(&path, yaml).unwrap();
    path
}

fn compliant() -> Command {
    Command::cargo_bin("compliant").unwrap()
}

#[test]
fn rules_lists_the_catalogue_for_a_kind() {
    compliant()
        .args(["rules", "--kind", "s3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("s3\tbucket-ssl-requests-only\tS3_BUCKET_SSL_REQUESTS_ONLY"))
        .stdout(predicate::str::contains("dynamodb").not());
}

#[test]
fn synth_writes_the_template() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_stack(dir.path(), r#"
project: orders
provider: { aws: { region: eu-west-1 } }
resources:
  - kind: table
    name: Orders
    partition_key: { name: pk, type: STRING }
"#);
    let out = dir.path().join("out");
    compliant()
        .arg("synth")
        .arg("-f").arg(&file)
        .arg("-o").arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("orders.template.json"));

    let template: serde_json::Value =
        serde_json::from_slice(&std::fs::read(out.join("orders.template.json")).unwrap()).unwrap();
    assert_eq!(template["Resources"]["Orders"]["Type"], "AWS::DynamoDB::Table");
    assert_eq!(template["Resources"]["Orders"]["DeletionPolicy"], "Retain");
    assert_eq!(template["Resources"]["OrdersDynamoDbBackupVault"]["Type"], "AWS::Backup::BackupVault");
}

#[test]
fn synth_fails_with_diagnostics() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_stack(dir.path(), r#"
resources:
  - kind: bucket
    name: Assets
"#);
    compliant()
        .arg("synth")
        .arg("-f").arg(&file)
        .arg("-o").arg(dir.path().join("out"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("[Assets] bucket-logging-enabled"));
    assert!(!dir.path().join("out").exists());
}

#[test]
fn validate_prints_the_report() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_stack(dir.path(), r#"
resources:
  - kind: bucket
    name: Assets
    disabled_rules: [bucket-logging-enabled, event-notifications-enabled]
"#);
    compliant()
        .arg("validate")
        .arg("-f").arg(&file)
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"path\": \"Assets\""))
        .stdout(predicate::str::contains("lifecycle-policy-check"))
        .stdout(predicate::str::contains("bucket-logging-enabled").not());
}

#[test]
fn unknown_rule_names_the_valid_tokens() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_stack(dir.path(), r#"
resources:
  - kind: function
    name: Handler
    runtime: nodejs18.x
    handler: index.handler
    code: { inline: "exports.handler = async () => {}" }
    disabled_rules: [inside-vpcs]
"#);
    compliant()
        .arg("validate")
        .arg("-f").arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown lambda rule 'inside-vpcs'"));
}

#[test]
fn encrypted_stack_needs_an_identity() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("stack.yaml.age");
    std::fs::write(&file, b"not really encrypted").unwrap();
    compliant()
        .arg("synth")
        .arg("-f").arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--age-identity"));
}

#[test]
fn missing_file_flag_is_reported() {
    compliant()
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--file"));
}
