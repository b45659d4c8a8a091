use std::process::Command;

fn cc_client() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_cc-client"));
    cmd.env("RUST_LOG", "error");
    cmd
}

/// A zero chunk size is rejected before any file is created.
#[test]
fn rejects_zero_chunk_size() {
    let dir = tempfile::tempdir().unwrap();
    let status = cc_client()
        .args(["cubic"])
        .arg(dir.path())
        .args(["--payload-size", "100", "--chunk-size", "0"])
        .status()
        .unwrap();

    assert!(!status.success());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

/// A chunk larger than the payload offers the whole payload in one call.
#[cfg(target_os = "linux")]
#[test]
fn chunk_larger_than_payload_sends_once() {
    use std::io::Read;

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let receiver = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut received = Vec::new();
        stream.read_to_end(&mut received).unwrap();
        received.len()
    });

    let dir = tempfile::tempdir().unwrap();
    let status = cc_client()
        .args(["reno"])
        .arg(dir.path())
        .args(["--host", "127.0.0.1", "--port", &port.to_string()])
        .args(["--payload-size", "100", "--chunk-size", "200"])
        .status()
        .unwrap();
    assert!(status.success());
    assert_eq!(receiver.join().unwrap(), 100);

    let rtt = std::fs::read_to_string(dir.path().join("H1-H2-RTT.dat")).unwrap();
    assert_eq!(rtt.lines().count(), 1);
    let summary: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("H1-H2-SUMMARY.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(summary["bytes_sent"], 100);
    assert_eq!(summary["send_calls"], 1);
}

#[test]
fn missing_arguments_is_a_usage_error() {
    let status = cc_client().status().unwrap();
    assert_eq!(status.code(), Some(2));
}

/// Nothing listens on the port, so the connect fails and the run exits
/// non-zero after opening its series files.
#[cfg(target_os = "linux")]
#[test]
fn refused_connection_exits_non_zero() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let dir = tempfile::tempdir().unwrap();

    let status = cc_client()
        .args(["reno"])
        .arg(dir.path())
        .args(["--host", "127.0.0.1", "--port", &port.to_string()])
        .args(["--payload-size", "4096"])
        .status()
        .unwrap();

    assert!(!status.success());
    assert!(!dir.path().join("H1-H2-SUMMARY.json").exists());
}

/// The fatal error line reaches `--log-file` even though the run fails.
#[cfg(target_os = "linux")]
#[test]
fn fatal_error_is_written_to_log_file() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let dir = tempfile::tempdir().unwrap();
    let log_file = dir.path().join("client.log");

    let status = cc_client()
        .args(["reno"])
        .arg(dir.path())
        .args(["--host", "127.0.0.1", "--port", &port.to_string()])
        .args(["--payload-size", "4096"])
        .arg("--log-file")
        .arg(&log_file)
        .status()
        .unwrap();
    assert!(!status.success());

    let log = std::fs::read_to_string(&log_file).unwrap();
    assert!(log.contains("ERROR"), "log: {:?}", log);
    assert!(log.contains("Connection setup failed"), "log: {:?}", log);
}

#[cfg(target_os = "linux")]
#[test]
fn full_run_against_local_listener() {
    use std::io::Read;

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let receiver = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut received = Vec::new();
        stream.read_to_end(&mut received).unwrap();
        received.len()
    });

    let dir = tempfile::tempdir().unwrap();
    let status = cc_client()
        .args(["reno"])
        .arg(dir.path())
        .args(["--host", "127.0.0.1", "--port", &port.to_string()])
        .args(["--payload-size", "65536", "--label", "LO"])
        .status()
        .unwrap();
    assert!(status.success());
    assert_eq!(receiver.join().unwrap(), 65536);

    for name in [
        "LO-SENDING-RATE.dat",
        "LO-RTT.dat",
        "LO-FLOW-COMPLETION-TIME.dat",
        "LO-SUMMARY.json",
    ] {
        assert!(dir.path().join(name).exists(), "missing {}", name);
    }
    let rtt = std::fs::read_to_string(dir.path().join("LO-RTT.dat")).unwrap();
    assert!(rtt.lines().count() >= 64);
}
