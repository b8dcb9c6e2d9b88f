#![cfg(feature = "cli")]

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Child, Command, Stdio};

use planeview::image::{CubeShape, ImageBackend, Plane, RawCube};

fn planeview() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_planeview"));
    cmd.env_remove("PLANEVIEW_HOST")
        .env_remove("PLANEVIEW_PORT")
        .env_remove("PLANEVIEW_SESSION")
        .args(["--log-level", "error", "--format", "json"]);
    cmd
}

fn write_cube(path: &Path) {
    let shape = CubeShape::new(4, 2, 1, 2);
    let mut cube = RawCube::create(path, shape).expect("cube should be creatable");
    cube.put_plane(
        [0, 0, 0, 1],
        &Plane::new(4, 2, (0..8).map(|v| v as f32).collect()).expect("plane should be valid"),
    )
    .expect("plane should be writable");
}

/// Start `serve --once` and return the child with the port it announced.
fn spawn_server(image: &Path) -> (Child, u16) {
    let mut child = planeview()
        .arg("serve")
        .arg(image)
        .arg("--once")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("serve should start");

    let stdout = child.stdout.take().expect("stdout should be piped");
    let mut line = String::new();
    BufReader::new(stdout)
        .read_line(&mut line)
        .expect("serve should announce its endpoint");
    let announced: serde_json::Value =
        serde_json::from_str(&line).expect("announcement should be JSON");
    assert_eq!(announced["event"], "listening");
    assert_eq!(announced["shape"], serde_json::json!([4, 2, 1, 2]));
    let port = announced["port"].as_u64().expect("port should be numeric") as u16;
    (child, port)
}

#[test]
fn version_prints_package_version() {
    let output = planeview().arg("version").output().expect("version should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("planeview {}", env!("CARGO_PKG_VERSION")));
}

#[test]
fn free_port_reports_a_port() {
    let output = planeview().arg("free-port").output().expect("free-port should run");
    assert!(output.status.success());
    let json: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("output should be JSON");
    assert!(json["port"].as_u64().is_some_and(|port| port > 0));
}

#[test]
fn request_against_server_returns_plane() {
    let dir = tempfile::tempdir().expect("temp dir should be creatable");
    let image = dir.path().join("cube.pv");
    write_cube(&image);
    let (mut child, port) = spawn_server(&image);

    let output = planeview()
        .args(["request", "plane", "--port", &port.to_string()])
        .args(["--json", r#"{"index":[0,1],"quantize":{"bits":8}}"#])
        .output()
        .expect("request should run");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let json: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("output should be JSON");
    assert_eq!(json["id"], "plane");
    assert_eq!(json["reply"]["index"], serde_json::json!([0, 1]));
    assert_eq!(json["reply"]["pixels"]["dtype"], "uint8");
    assert_eq!(json["reply"]["pixels"]["shape"], serde_json::json!([2, 4]));

    let status = child.wait().expect("server should exit after one display");
    assert!(status.success());
}

#[test]
fn unregistered_id_exits_with_remote_error() {
    let dir = tempfile::tempdir().expect("temp dir should be creatable");
    let image = dir.path().join("cube.pv");
    write_cube(&image);
    let (mut child, port) = spawn_server(&image);

    let output = planeview()
        .args(["request", "no-such-handler", "--port", &port.to_string()])
        .output()
        .expect("request should run");
    assert_eq!(output.status.code(), Some(4));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unregistered_handler"));

    let _ = child.wait();
}

#[test]
fn serve_missing_image_fails() {
    let dir = tempfile::tempdir().expect("temp dir should be creatable");
    let output = planeview()
        .arg("serve")
        .arg(dir.path().join("missing.pv"))
        .output()
        .expect("serve should run");
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to open image"));
}

#[test]
fn request_without_port_is_usage_error() {
    let output = planeview()
        .args(["request", "shape"])
        .output()
        .expect("request should run");
    assert_eq!(output.status.code(), Some(64));
}
