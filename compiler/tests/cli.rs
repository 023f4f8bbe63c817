// CLI tests: drive the built `sgc` binary on the sample programs.
//
// These check exit codes, output selection and that identical inputs give
// byte-identical output.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn sgc_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_sgc"))
}

fn sample(name: &str) -> String {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .join("samples")
        .join(name)
        .to_string_lossy()
        .into_owned()
}

fn run_sgc(args: &[&str]) -> Output {
    Command::new(sgc_binary())
        .args(args)
        .output()
        .expect("failed to run sgc")
}

fn stdout_of(args: &[&str]) -> String {
    let output = run_sgc(args);
    assert!(
        output.status.success(),
        "sgc failed with args {:?}\nstderr: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).expect("non-UTF8 output")
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("sgc_cli_{}_{}", std::process::id(), name))
}

#[test]
fn default_emit_prints_propagated_graph() {
    let out = stdout_of(&[&sample("counting.str")]);
    assert!(out.starts_with("pipeline Counting#0()\n"), "{out}");
    assert!(out.contains("add Scale#1(0);"));
    assert!(out.contains("add Scale#2(1);"));
    assert!(out.contains("add Scale#3(2);"));
    assert!(!out.contains("for ("));
}

#[test]
fn no_const_prop_keeps_the_loop() {
    let out = stdout_of(&[&sample("counting.str"), "--no-const-prop"]);
    assert!(out.contains("for (int i = 0; i < 3; i += 1) {"), "{out}");
}

#[test]
fn unroll_limit_flag_is_honored() {
    let out = stdout_of(&[&sample("counting.str"), "--unroll-limit", "2"]);
    assert!(out.contains("for (int i = 0; i < 3; i += 1) {"), "{out}");
}

#[test]
fn config_file_is_read_and_flags_override_it() {
    let config = temp_path("config.json");
    std::fs::write(&config, r#"{ "unroll_limit": 2 }"#).unwrap();
    let config_str = config.to_str().unwrap();

    let limited = stdout_of(&[&sample("counting.str"), "--config", config_str]);
    assert!(limited.contains("for ("));

    let overridden = stdout_of(&[
        &sample("counting.str"),
        "--config",
        config_str,
        "--unroll-limit",
        "8",
    ]);
    assert!(!overridden.contains("for ("));
    let _ = std::fs::remove_file(&config);
}

#[test]
fn emit_dot_and_json() {
    let dot = stdout_of(&[&sample("feedback.str"), "--emit", "dot"]);
    assert!(dot.starts_with("digraph streams {"));
    assert!(dot.contains("label=\"delay 5\""));

    let json = stdout_of(&[&sample("feedback.str"), "--emit", "json"]);
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["root"], 0);
    assert_eq!(value["nodes"].as_array().unwrap().len(), 4);
}

#[test]
fn build_info_is_stable() {
    let first = stdout_of(&[&sample("counting.str"), "--emit", "build-info"]);
    let second = stdout_of(&[&sample("counting.str"), "--emit", "build-info"]);
    assert_eq!(first, second);
    let value: serde_json::Value = serde_json::from_str(&first).unwrap();
    assert_eq!(value["source_hash"].as_str().unwrap().len(), 64);

    let materialized = stdout_of(&[
        &sample("counting.str"),
        "--emit",
        "build-info",
        "--strategy",
        "materialized",
    ]);
    assert_ne!(first, materialized);
}

#[test]
fn output_file_matches_stdout() {
    let path = temp_path("graph.txt");
    let path_str = path.to_str().unwrap();
    let stdout = stdout_of(&[&sample("filterbank.str")]);
    let written = stdout_of(&[&sample("filterbank.str"), "-o", path_str]);
    assert!(written.is_empty());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), stdout);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn identical_runs_are_byte_identical() {
    for name in ["counting.str", "feedback.str", "filterbank.str", "runtime_bound.str"] {
        let first = stdout_of(&[&sample(name), "--emit", "dot"]);
        let second = stdout_of(&[&sample(name), "--emit", "dot"]);
        assert_eq!(first, second, "{name}");
    }
}

#[test]
fn verbose_reports_cycles_on_stderr() {
    let output = run_sgc(&[&sample("counting.str"), "--verbose"]);
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("sgc: Counting (n0): cycle 1, env=0, unrolled=1"), "{stderr}");
    assert!(stderr.contains("sgc: const_prop complete"), "{stderr}");
}

#[test]
fn missing_file_exits_with_2() {
    let output = run_sgc(&["/nonexistent/input.str"]);
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.starts_with("sgc: error: /nonexistent/input.str"), "{stderr}");
}

#[test]
fn compile_errors_exit_with_1() {
    let path = temp_path("arity.str");
    std::fs::write(
        &path,
        "filter A(int k) { work push k { push(k); } }\npipeline P() { init { add A(); } }\n",
    )
    .unwrap();
    let output = run_sgc(&[path.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error[E0100]: 'A' takes 1 argument but 0 were supplied"), "{stderr}");
    assert!(output.stdout.is_empty());
    let _ = std::fs::remove_file(&path);
}

#[test]
fn parse_errors_exit_with_1() {
    let path = temp_path("syntax.str");
    std::fs::write(&path, "pipeline P( {").unwrap();
    let output = run_sgc(&[path.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("parse error"));
    let _ = std::fs::remove_file(&path);
}
