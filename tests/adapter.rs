use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::NamedTempFile;

const MISSING_K6: &str = "/nonexistent/bin/k6";

struct Outcome {
    code: i32,
    stdout: String,
    stderr: String,
}

impl Outcome {
    /// The `{"result": ...}` object on stdout.
    fn result(&self) -> String {
        let lines: Vec<&str> = self.stdout.lines().collect();
        assert_eq!(lines.len(), 1, "stdout must be exactly one line: {:?}", self.stdout);
        let value: Value = serde_json::from_str(lines[0]).expect("stdout is JSON");
        value["result"].as_str().expect("result is a string").to_string()
    }

    /// The `{"error": ...}` object among the stderr diagnostics.
    fn error(&self) -> String {
        self.stderr
            .lines()
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .find_map(|value| value.get("error").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| panic!("no error object on stderr:\n{}", self.stderr))
    }
}

fn run(input: &str, k6_bin: &Path, args: &[&str]) -> Outcome {
    let mut child = Command::new(env!("CARGO_BIN_EXE_k6-adapter"))
        .args(args)
        .env_remove("K6_ADAPTER_CONFIG")
        .env_remove("K6_DEFAULT_DURATION")
        .env_remove("K6_DEFAULT_VUS")
        .env_remove("K6_TIMEOUT")
        .env_remove("K6_SIM_SEED")
        .env_remove("K6_ADAPTER_LEGACY_ERRORS")
        .env_remove("K6_ADAPTER_LOG")
        .env("K6_BIN", k6_bin)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to start k6-adapter");

    child
        .stdin
        .take()
        .unwrap()
        .write_all(input.as_bytes())
        .unwrap();
    let output = child.wait_with_output().unwrap();

    Outcome {
        code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    }
}

fn run_offline(input: &str, args: &[&str]) -> Outcome {
    run(input, Path::new(MISSING_K6), args)
}

fn script(suffix: &str) -> NamedTempFile {
    let mut file = NamedTempFile::with_suffix(suffix).unwrap();
    writeln!(file, "import http from 'k6/http';\nexport default function () {{ http.get('http://localhost'); }}").unwrap();
    file
}

fn request(method: &str, params: Value) -> String {
    serde_json::json!({ "method": method, "params": params }).to_string() + "\n"
}

fn metric_fields<'a>(report: &'a str, name: &str) -> Vec<&'a str> {
    report
        .lines()
        .map(str::trim_start)
        .find(|line| line.strip_prefix(name).map_or(false, |rest| rest.starts_with('.')))
        .and_then(|line| line.split_once(": "))
        .map(|(_, value)| value.split_whitespace().collect())
        .unwrap_or_else(|| panic!("metric {} missing:\n{}", name, report))
}

#[test]
fn simulated_run_reports_iterations() {
    let file = script(".js");
    let input = request(
        "execute_k6_test",
        serde_json::json!({"script_file": file.path(), "duration": "5s", "vus": 1}),
    );

    let outcome = run_offline(&input, &[]);
    assert_eq!(outcome.code, 0, "stderr:\n{}", outcome.stderr);

    let report = outcome.result();
    assert!(report.contains("iterations"));
    assert!(report.contains("✓"));
    assert_eq!(metric_fields(&report, "iterations")[0], "5");
    assert_eq!(metric_fields(&report, "vus"), vec!["1", "min=1", "max=1"]);
    assert_eq!(metric_fields(&report, "vus_max"), vec!["1", "min=1", "max=1"]);
}

#[test]
fn simulated_run_applies_default_duration_and_vus() {
    let file = script(".js");
    let input = request("execute_k6_test", serde_json::json!({"script_file": file.path()}));

    let outcome = run_offline(&input, &[]);
    assert_eq!(outcome.code, 0, "stderr:\n{}", outcome.stderr);

    let report = outcome.result();
    assert_eq!(metric_fields(&report, "iterations")[0], "300");
    assert_eq!(metric_fields(&report, "vus"), vec!["10", "min=10", "max=10"]);
    assert_eq!(metric_fields(&report, "vus_max"), vec!["10", "min=10", "max=10"]);
}

#[cfg(unix)]
#[test]
fn literal_request_for_tmp_script() {
    std::fs::write("/tmp/t.js", "export default function () {}\n").unwrap();
    let input = r#"{"method":"execute_k6_test","params":{"script_file":"/tmp/t.js","duration":"5s","vus":1}}"#;

    let outcome = run_offline(&format!("{}\n", input), &[]);
    assert_eq!(outcome.code, 0, "stderr:\n{}", outcome.stderr);
    assert!(outcome.result().contains("iterations"));
}

#[test]
fn missing_method_is_an_error() {
    let outcome = run_offline("{\"params\": {}}\n", &[]);
    assert_eq!(outcome.code, 1);
    assert!(outcome.stdout.is_empty());
    assert!(outcome.error().contains("method"));
}

#[test]
fn unknown_method_is_an_error() {
    let outcome = run_offline(&request("execute_jmeter_test", serde_json::json!({})), &[]);
    assert_eq!(outcome.code, 1);
    assert_eq!(outcome.error(), "Unknown method: execute_jmeter_test");
}

#[test]
fn empty_and_malformed_input() {
    let outcome = run_offline("", &[]);
    assert_eq!(outcome.code, 1);
    assert_eq!(outcome.error(), "No request received");

    let outcome = run_offline("{\"method\": \n", &[]);
    assert_eq!(outcome.code, 1);
    assert!(outcome.error().starts_with("Invalid JSON"));
}

#[test]
fn validation_errors_use_error_channel_by_default() {
    let input = request(
        "execute_k6_test",
        serde_json::json!({"script_file": "/nonexistent/dir/test.js"}),
    );
    let outcome = run_offline(&input, &[]);
    assert_eq!(outcome.code, 1);
    assert!(outcome.stdout.is_empty());
    assert!(outcome.error().contains("Script file not found"));

    let file = script(".ts");
    let input = request("execute_k6_test", serde_json::json!({"script_file": file.path()}));
    let outcome = run_offline(&input, &[]);
    assert_eq!(outcome.code, 1);
    assert!(outcome.error().contains("Invalid file type"));
}

#[test]
fn legacy_error_channel_reports_validation_errors_as_results() {
    let input = request(
        "execute_k6_test",
        serde_json::json!({"script_file": "/nonexistent/dir/test.js"}),
    );
    let outcome = run_offline(&input, &["--legacy-error-channel"]);
    assert_eq!(outcome.code, 0);
    let result = outcome.result();
    assert!(result.starts_with("Error: "));
    assert!(result.contains("Script file not found"));

    let file = script(".txt");
    let input = request("execute_k6_test", serde_json::json!({"script_file": file.path()}));
    let outcome = run_offline(&input, &["--legacy-error-channel"]);
    assert_eq!(outcome.code, 0);
    assert!(outcome.result().contains("Invalid file type"));

    // Request-level errors are never moved into the result payload.
    let outcome = run_offline(&request("nope", serde_json::json!({})), &["--legacy-error-channel"]);
    assert_eq!(outcome.code, 1);
}

#[test]
fn explicit_options_are_required() {
    let file = script(".js");
    let input = request(
        "execute_k6_test_with_options",
        serde_json::json!({"script_file": file.path(), "duration": "5s"}),
    );
    let outcome = run_offline(&input, &[]);
    assert_eq!(outcome.code, 1);
    assert!(outcome.error().contains("vus"));

    let input = request(
        "execute_k6_test_with_options",
        serde_json::json!({"script_file": file.path(), "duration": "2s", "vus": 3}),
    );
    let outcome = run_offline(&input, &[]);
    assert_eq!(outcome.code, 0);
    assert_eq!(metric_fields(&outcome.result(), "iterations")[0], "6");
}

#[test]
fn invalid_duration_is_rejected() {
    let file = script(".js");
    let input = request(
        "execute_k6_test",
        serde_json::json!({"script_file": file.path(), "duration": "5 parsecs"}),
    );
    let outcome = run_offline(&input, &[]);
    assert_eq!(outcome.code, 1);
    assert!(outcome.error().starts_with("Invalid duration"));
}

#[test]
fn seeded_simulation_is_reproducible() {
    let file = script(".js");
    let input = request(
        "execute_k6_test",
        serde_json::json!({"script_file": file.path(), "duration": "3s", "vus": 2}),
    );
    let first = run_offline(&input, &["--seed", "42"]).result();
    let second = run_offline(&input, &["--seed", "42"]).result();
    assert_eq!(first, second);

    let with_param = request(
        "execute_k6_test",
        serde_json::json!({"script_file": file.path(), "duration": "3s", "vus": 2, "seed": 42}),
    );
    assert_eq!(run_offline(&with_param, &[]).result(), first);
}

#[test]
fn check_installation_without_k6() {
    let outcome = run_offline(&request("check_k6_installation", serde_json::json!({})), &[]);
    assert_eq!(outcome.code, 0);
    assert!(outcome.result().contains("simulation mode"));
}

#[test]
fn invalid_configuration_is_reported_as_json() {
    let outcome = run_offline(&request("check_k6_installation", serde_json::json!({})), &["--timeout", "soon"]);
    assert_eq!(outcome.code, 1);
    assert!(outcome.error().starts_with("Configuration error"));
}

#[cfg(unix)]
mod with_fake_k6 {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn fake_k6(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("k6");
        std::fs::write(
            &path,
            format!(
                "#!/bin/sh\nif [ \"$1\" = \"version\" ]; then echo \"k6 v0.0.0-fake\"; exit 0; fi\n{}\n",
                body
            ),
        )
        .unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn defaults_are_passed_to_k6() {
        let dir = TempDir::new().unwrap();
        let bin = fake_k6(&dir, "echo \"$*\"");
        let file = script(".js");

        let outcome = run(
            &request("execute_k6_test", serde_json::json!({"script_file": file.path()})),
            &bin,
            &[],
        );
        assert_eq!(outcome.code, 0, "stderr:\n{}", outcome.stderr);
        assert!(outcome.result().starts_with("run -d 30s -u 10 "));
    }

    #[test]
    fn configured_defaults_are_passed_to_k6() {
        let dir = TempDir::new().unwrap();
        let bin = fake_k6(&dir, "echo \"$*\"");
        let file = script(".js");

        let outcome = run(
            &request("execute_k6_test", serde_json::json!({"script_file": file.path()})),
            &bin,
            &["--default-duration", "1m", "--default-vus", "3"],
        );
        assert_eq!(outcome.code, 0);
        assert!(outcome.result().starts_with("run -d 1m -u 3 "));
    }

    #[test]
    fn k6_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let bin = fake_k6(&dir, "echo 'script error: SyntaxError' >&2\nexit 107");
        let file = script(".js");
        let input = request("execute_k6_test", serde_json::json!({"script_file": file.path()}));

        let outcome = run(&input, &bin, &[]);
        assert_eq!(outcome.code, 1);
        assert!(outcome.error().contains("SyntaxError"));

        let outcome = run(&input, &bin, &["--legacy-error-channel"]);
        assert_eq!(outcome.code, 0);
        let result = outcome.result();
        assert!(result.starts_with("Error executing k6 test:\n"));
        assert!(result.contains("SyntaxError"));
    }

    #[test]
    fn hung_k6_times_out() {
        let dir = TempDir::new().unwrap();
        let bin = fake_k6(&dir, "sleep 60");
        let file = script(".js");
        let input = request(
            "execute_k6_test",
            serde_json::json!({"script_file": file.path(), "duration": "1s", "vus": 1}),
        );

        let started = std::time::Instant::now();
        let outcome = run(&input, &bin, &["--timeout", "1s"]);
        assert_eq!(outcome.code, 1);
        assert!(outcome.error().contains("exceeded timeout"));
        assert!(started.elapsed() < std::time::Duration::from_secs(30));
    }
}
