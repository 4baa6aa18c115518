//! Run the `grunt` binary against program files.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

fn grunt_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_grunt"))
}

fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("write temp file");
    path
}

fn run(args: &[&str], stdin: &str) -> Output {
    let mut child = Command::new(grunt_binary())
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn grunt");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(stdin.as_bytes())
        .expect("write stdin");
    child.wait_with_output().expect("wait for grunt")
}

fn stdout_lines(out: &Output) -> Vec<String> {
    String::from_utf8_lossy(&out.stdout)
        .lines()
        .map(str::to_owned)
        .collect()
}

#[test]
fn runs_program_file() {
    let dir = tempfile::tempdir().unwrap();
    let prog = write_file(
        dir.path(),
        "part.g",
        "#1 = 2\nFOR #i 1 2\nG1 X[#i * #1]\nENDFOR\nWRITE \"done\"\nM2\n",
    );
    let out = run(&["-q", "-f", prog.to_str().unwrap()], "");
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(
        stdout_lines(&out),
        vec!["CMD G1 X=2.0", "CMD G1 X=4.0", "MSG done", "CMD M2"]
    );
}

#[test]
fn program_error_exit_status() {
    let dir = tempfile::tempdir().unwrap();
    let prog = write_file(dir.path(), "bad.g", "G0\n#x = 1 / 0\n");
    let out = run(&["-q", "-f", prog.to_str().unwrap()], "");
    assert_eq!(out.status.code(), Some(1));
    assert_eq!(stdout_lines(&out), vec!["CMD G0"]);
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("line 2: division by zero"), "{stderr}");
}

#[test]
fn program_from_stdin() {
    let out = run(&["-q", "-f", "-"], "WRITE 4 1.5\nG28\n");
    assert!(out.status.success());
    assert_eq!(stdout_lines(&out), vec!["PIN 4 1.5", "CMD G28"]);
}

#[test]
fn recv_reads_stdin_when_program_is_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let prog = write_file(dir.path(), "ask.g", "#m = RECV 5\nWRITE \"got [#m]\"\n");
    let out = run(&["-q", "-f", prog.to_str().unwrap()], "\nanswer\n");
    assert!(out.status.success());
    assert_eq!(stdout_lines(&out), vec!["MSG got answer"]);
}

#[test]
fn explicit_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let rc = write_file(dir.path(), "grunt.rc", "/pin 7 123.45\n/var #feed 90\n/command G77\n");
    let prog = write_file(dir.path(), "p.g", "#s = READ 7\nG77 S[#s] F[#feed]\n");
    let flag = format!("-f{}", rc.display());
    let out = run(&["-q", &flag, prog.to_str().unwrap()], "");
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(stdout_lines(&out), vec!["CMD G77 F=90.0 S=123.45"]);
}

#[test]
fn usage_error() {
    let out = run(&["-z"], "");
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains("Usage:"));

    let out = run(&[], "");
    assert_eq!(out.status.code(), Some(2));
}

#[test]
fn missing_program_file() {
    let out = run(&["-q", "-f", "/nonexistent/prog.g"], "");
    assert_eq!(out.status.code(), Some(2));
}
