// SPDX-License-Identifier: MIT OR Apache-2.0
//! Validates that `xtask schema` generates well-formed JSON Schema files.

use assert_cmd::Command;

const EXPECTED_SCHEMAS: &[&str] = &["discovery_request.schema.json", "template_spec.schema.json", "xdscp_config.schema.json"];

#[test]
fn generated_schemas_are_valid_json() {
    let tmp = tempfile::tempdir().expect("create temp dir");

    #[allow(deprecated)] // cargo_bin works fine; the replacement macro is unstable
    Command::cargo_bin("xtask")
        .unwrap()
        .args(["schema", "--out-dir"])
        .arg(tmp.path())
        .assert()
        .success();

    for name in EXPECTED_SCHEMAS {
        let path = tmp.path().join(name);
        let content = std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("read {}: {e}", path.display()));

        let value: serde_json::Value = serde_json::from_str(&content).unwrap_or_else(|e| panic!("parse {}: {e}", path.display()));

        let obj = value.as_object().expect("schema should be a JSON object");
        assert!(obj.contains_key("$schema") || obj.contains_key("type") || obj.contains_key("$ref"), "{name} missing top-level schema key");
    }
}
