use std::fs;
use std::time::Duration;

mod common;
use common::{dir_is_empty, run_with_timeout, wait_until, TestContext};

#[test]
fn missing_destination_fails_before_running() {
    let ctx = TestContext::new();
    let mut cmd = ctx.daemon_command();
    cmd.arg("--aws-creds-file").arg(&ctx.creds_file);
    fs::write(ctx.spool.join("untouched.gz"), b"data").expect("write file");

    let output = run_with_timeout(cmd, Duration::from_secs(10));
    assert!(!output.status.success(), "daemon should refuse to start");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("s3-bucket-path"), "stderr:\n{stderr}");
    assert!(ctx.spool.join("untouched.gz").exists());
}

#[test]
fn missing_credentials_fail_before_running() {
    let ctx = TestContext::new();
    let mut cmd = ctx.daemon_command();
    cmd.arg("--s3-bucket-path").arg("s3://bucket/offload/");

    let output = run_with_timeout(cmd, Duration::from_secs(10));
    assert!(!output.status.success(), "daemon should refuse to start");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("AWS_CREDS_FILE"), "stderr:\n{stderr}");
}

#[cfg(unix)]
#[test]
fn offloads_files_and_reports_on_sigterm() {
    let ctx = TestContext::new();
    fs::write(ctx.spool.join("a.gz"), vec![0u8; 2048]).expect("a.gz");
    fs::write(ctx.spool.join("b.gz"), vec![0u8; 1024]).expect("b.gz");
    fs::write(ctx.spool.join("notes.txt"), b"stays").expect("notes.txt");

    let mut cmd = ctx.daemon_command();
    cmd.arg("--s3-bucket-path")
        .arg("s3://bucket/offload/")
        .arg("--aws-creds-file")
        .arg(&ctx.creds_file)
        .arg("--process-interval")
        .arg("50ms");
    let daemon = ctx.spawn(cmd);

    let drained = wait_until(Duration::from_secs(15), || {
        !ctx.spool.join("a.gz").exists() && !ctx.spool.join("b.gz").exists()
    });
    assert!(drained, "daemon did not offload spooled files");

    // A few more empty cycles exercise the no-match path.
    std::thread::sleep(Duration::from_millis(200));

    let output = daemon.terminate(Duration::from_secs(15));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "daemon exit: {:?}\nstderr:\n{stderr}", output.status);
    assert!(
        stderr.contains("Final summary: 2 files transferred, 2 files deleted"),
        "stderr:\n{stderr}"
    );
    assert!(stderr.contains("shutdown complete"), "stderr:\n{stderr}");
    assert!(!stderr.contains("error processing files"), "stderr:\n{stderr}");
    assert!(ctx.spool.join("notes.txt").exists());
    assert!(dir_is_empty(&ctx.sinks), "job output files left behind");
}

#[cfg(unix)]
#[test]
fn environment_credentials_are_accepted() {
    let ctx = TestContext::new();
    fs::write(ctx.spool.join("c.gz"), b"abc").expect("c.gz");

    let mut cmd = ctx.daemon_command();
    cmd.env("S3_BUCKET_PATH", "s3://bucket/env/")
        .env("AWS_ACCESS_KEY_ID", "AKIDTEST")
        .env("AWS_SECRET_ACCESS_KEY", "secret")
        .env("AWS_DEFAULT_REGION", "us-east-2")
        .arg("--process-interval")
        .arg("50ms");
    let daemon = ctx.spawn(cmd);

    assert!(
        wait_until(Duration::from_secs(15), || !ctx.spool.join("c.gz").exists()),
        "daemon did not offload c.gz"
    );

    let output = daemon.terminate(Duration::from_secs(15));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "stderr:\n{stderr}");
    assert!(stderr.contains("region: us-east-2"), "stderr:\n{stderr}");
    assert!(!stderr.contains("AKIDTEST"), "credentials leaked:\n{stderr}");
}
