use std::process::{Child, Command, Stdio};
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

const PERFSTORE_EXE: &str = env!("CARGO_BIN_EXE_perfstore");

fn spawn(addr: &str, envs: &[(&str, &str)]) -> Child {
    Command::new(PERFSTORE_EXE)
        .arg("run")
        .env("PERF__METRICS_ADDR", addr)
        .env("PERF__STORAGE__TYPE", "memory")
        .env("PERF__DATASET__SIZE", "50")
        .env("PERF__DATASET__PRESET_CONCURRENCY", "5")
        .env("PERF__WORKLOAD__WORKERS", "4")
        .env("PERF__WORKLOAD__RATE_LIMIT", "50")
        .env("PERF__LOGGING__FORMAT", "simplified")
        .envs(envs.iter().copied())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .expect("Failed to spawn subprocess")
}

fn assert_clean_shutdown(mut child: Child) {
    let pid = Pid::from_raw(child.id() as i32);
    signal::kill(pid, Signal::SIGINT).expect("Failed to send SIGINT");

    let output = child.wait().expect("Failed to wait on child process");

    assert!(
        output.success(),
        "Process exited with non-zero status: {:?}",
        output.code()
    );
}

#[tokio::test]
async fn test_basic() {
    let port = 10000 + rand::random::<u16>() % 10000;
    let addr = format!("127.0.0.1:{port}");

    let child = spawn(&addr, &[]);

    // Give the process time to preset and run a few iterations.
    std::thread::sleep(Duration::from_secs(2));

    let body = reqwest::get(format!("http://{addr}/metrics"))
        .await
        .expect("Failed to scrape metrics")
        .text()
        .await
        .unwrap();

    assert!(
        body.contains(r#"operations_success_total{backend="memory",op="insert"} 50"#),
        "{body}"
    );
    assert!(body.contains(r#"op="update""#), "{body}");

    let health = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert!(health.status().is_success());

    assert_clean_shutdown(child);
}

#[tokio::test]
async fn test_invalid_config() {
    let port = 10000 + rand::random::<u16>() % 10000;
    let addr = format!("127.0.0.1:{port}");

    let mut child = spawn(&addr, &[("PERF__WORKLOAD__READ_OP_PERCENT", "1.5")]);
    let output = child.wait().expect("Failed to wait on child process");

    assert!(!output.success());
}

#[tokio::test]
async fn test_unusable_storage() {
    let port = 10000 + rand::random::<u16>() % 10000;
    let addr = format!("127.0.0.1:{port}");

    // A directory cannot be created below a regular file.
    let file = tempfile::NamedTempFile::new().unwrap();
    let path = file.path().join("data");

    let mut child = spawn(
        &addr,
        &[
            ("PERF__STORAGE__TYPE", "filesystem"),
            ("PERF__STORAGE__PATH", path.to_str().unwrap()),
        ],
    );
    let output = child.wait().expect("Failed to wait on child process");

    assert!(!output.success());
    assert!(!path.exists());
}
