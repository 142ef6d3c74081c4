#![cfg(all(unix, feature = "cli"))]

use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::{json, Value};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/fwcli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn forkwire() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_forkwire"));
    command
        .env_remove("FORKWIRE_PORT")
        .env_remove("FORKWIRE_LOG")
        .arg("--log-level")
        .arg("error")
        .arg("--format")
        .arg("json");
    command
}

fn json_lines(output: &Output) -> Vec<Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("stdout line should be JSON"))
        .collect()
}

fn with_suffix(medium: &Path, suffix: &str) -> PathBuf {
    let mut path = medium.as_os_str().to_owned();
    path.push(suffix);
    PathBuf::from(path)
}

fn wait_for_file(path: &Path, timeout: Duration) {
    let start = Instant::now();
    while !path.exists() {
        if start.elapsed() >= timeout {
            panic!("{} did not appear", path.display());
        }
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn launch_spawns_serve_and_delivers_values_in_order() {
    let dir = unique_temp_dir("launch");
    let medium = dir.join("medium");

    let output = forkwire()
        .arg("launch")
        .arg(&medium)
        .arg("--json")
        .arg("1")
        .arg("--json")
        .arg(r#"{"k":"v"}"#)
        .arg("--progress")
        .arg("build:50")
        .output()
        .expect("launch should run");

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let lines = json_lines(&output);
    let report = lines
        .iter()
        .find(|line| line.get("sent").is_some())
        .expect("launch report should be printed");
    assert_eq!(report["sent"], json!(3));
    assert_eq!(report["received"], json!(0));
    assert_eq!(report["transport"], json!("tcp-loopback"));

    let received: Vec<&Value> = lines
        .iter()
        .filter(|line| line.get("sent").is_none())
        .collect();
    assert_eq!(
        received,
        vec![
            &json!(1),
            &json!({"k": "v"}),
            &json!({"__TYPE": "ProgressUpdate", "state": "build", "percent": 50}),
        ]
    );

    // The worker removes its rendezvous files on exit.
    assert!(!with_suffix(&medium, ".port").exists());
    assert!(!with_suffix(&medium, ".ready").exists());
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn port_override_connects_to_running_serve() {
    let dir = unique_temp_dir("override");
    let medium = dir.join("medium");

    let child = forkwire()
        .arg("serve")
        .arg("--file")
        .arg(&medium)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("serve should start");

    wait_for_file(&with_suffix(&medium, ".ready"), Duration::from_secs(5));
    let bytes = std::fs::read(with_suffix(&medium, ".port")).expect("port file");
    let port = u32::from_be_bytes(bytes[..4].try_into().expect("4 bytes"));

    let output = forkwire()
        .env("FORKWIRE_PORT", port.to_string())
        .arg("launch")
        .arg(dir.join("unused"))
        .arg("--json")
        .arg(r#""hello""#)
        .output()
        .expect("launch should run");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let report = json_lines(&output)
        .into_iter()
        .find(|line| line.get("sent").is_some())
        .expect("launch report should be printed");
    assert_eq!(report["worker_id"], Value::Null);

    let served = child.wait_with_output().expect("serve should exit");
    assert!(served.status.success());
    assert_eq!(json_lines(&served), vec![json!("hello")]);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn launch_with_exiting_worker_returns_2() {
    let dir = unique_temp_dir("exiting");

    let output = forkwire()
        .arg("launch")
        .arg(dir.join("medium"))
        .arg("--worker")
        .arg("sh")
        .arg("--worker-arg=-c")
        .arg("--worker-arg")
        .arg("exit 5")
        .arg("--json")
        .arg("1")
        .output()
        .expect("launch should run");

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("exited"), "stderr: {stderr}");
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn launch_with_missing_worker_returns_2() {
    let dir = unique_temp_dir("missing");

    let output = forkwire()
        .arg("launch")
        .arg(dir.join("medium"))
        .arg("--worker")
        .arg(dir.join("no-such-program"))
        .output()
        .expect("launch should run");

    assert_eq!(output.status.code(), Some(2));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn invalid_port_override_returns_64() {
    let dir = unique_temp_dir("badport");

    let output = forkwire()
        .env("FORKWIRE_PORT", "not-a-port")
        .arg("launch")
        .arg(dir.join("medium"))
        .output()
        .expect("launch should run");

    assert_eq!(output.status.code(), Some(64));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn launch_rejects_null_value() {
    let dir = unique_temp_dir("null");

    let output = forkwire()
        .arg("launch")
        .arg(dir.join("medium"))
        .arg("--json")
        .arg("null")
        .output()
        .expect("launch should run");

    assert_eq!(output.status.code(), Some(64));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn serve_on_published_medium_returns_3() {
    let dir = unique_temp_dir("in-use");
    let medium = dir.join("medium");
    std::fs::write(with_suffix(&medium, ".port"), [0u8, 0, 0x1F, 0x90]).expect("port file");

    let output = forkwire()
        .arg("serve")
        .arg("--file")
        .arg(&medium)
        .output()
        .expect("serve should run");

    assert_eq!(output.status.code(), Some(3));
    // The existing port file belongs to someone else and is left alone.
    assert!(with_suffix(&medium, ".port").exists());
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn probe_reads_published_port() {
    let dir = unique_temp_dir("probe");
    let medium = dir.join("medium");
    std::fs::write(with_suffix(&medium, ".port"), [0u8, 0, 0x1F, 0x90]).expect("port file");
    std::fs::write(with_suffix(&medium, ".ready"), b"").expect("ready file");

    let output = forkwire()
        .arg("probe")
        .arg(&medium)
        .output()
        .expect("probe should run");

    assert!(output.status.success());
    let lines = json_lines(&output);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["ready"], json!(true));
    assert_eq!(lines[0]["port"], json!(8080));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn probe_before_ready_returns_1() {
    let dir = unique_temp_dir("probe-pending");

    let output = forkwire()
        .arg("probe")
        .arg(dir.join("medium"))
        .output()
        .expect("probe should run");

    assert_eq!(output.status.code(), Some(1));
    let lines = json_lines(&output);
    assert_eq!(lines[0]["ready"], json!(false));
    assert_eq!(lines[0]["port"], Value::Null);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn version_prints_package_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_forkwire"))
        .arg("version")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("forkwire {}", env!("CARGO_PKG_VERSION")));
}
