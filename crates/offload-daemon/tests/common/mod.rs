#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::tempdir;

use wait_timeout::ChildExt;

/// Reports every regular file matched by the source glob as uploaded, or the
/// "no match" envelope when nothing matched.
pub const FAKE_TOOL: &str = r#"#!/bin/sh
eval "src=\${$(($# - 1))}"
eval "dst=\${$#}"
echo "INFO fake s5cmd $*" >&2
found=0
for f in $src; do
  [ -f "$f" ] || continue
  found=1
  size=$(wc -c < "$f" | tr -d ' ')
  printf '{"operation":"cp","success":true,"source":"%s","destination":"%s","object":{"type":"file","size":%s}}\n' "$f" "$dst" "$size"
done
if [ "$found" -eq 0 ]; then
  printf '{"error":"no match found for \\"%s\\""}\n' "$src"
  exit 1
fi
"#;

pub struct TestContext {
    pub _work: tempfile::TempDir,
    pub workspace: PathBuf,
    pub spool: PathBuf,
    pub sinks: PathBuf,
    pub tool: PathBuf,
    pub creds_file: PathBuf,
    pub daemon_bin: PathBuf,
}

impl TestContext {
    pub fn new() -> Self {
        let work = tempdir().expect("tempdir");
        let workspace = work.path().to_path_buf();

        let spool = workspace.join("spool");
        fs::create_dir_all(&spool).expect("spool dir");
        let sinks = workspace.join("sinks");
        fs::create_dir_all(&sinks).expect("sink dir");

        let tool = workspace.join("fake-s5cmd");
        fs::write(&tool, FAKE_TOOL).expect("write fake tool");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).expect("chmod tool");
        }

        let creds_file = workspace.join("credentials");
        fs::write(&creds_file, "[default]\n").expect("write credentials");

        Self {
            _work: work,
            workspace,
            spool,
            sinks,
            tool,
            creds_file,
            daemon_bin: PathBuf::from(env!("CARGO_BIN_EXE_s5-offload")),
        }
    }

    /// Daemon command with a clean environment and the fake tool wired in.
    pub fn daemon_command(&self) -> Command {
        let mut cmd = Command::new(&self.daemon_bin);
        cmd.env_clear()
            .env("PATH", std::env::var_os("PATH").unwrap_or_default())
            .env("NO_COLOR", "1")
            .arg("--folder-prefix")
            .arg(&self.spool)
            .arg("--path-suffix")
            .arg("/*.gz")
            .arg("--s5cmd-binary")
            .arg(&self.tool)
            .arg("--sink-dir")
            .arg(&self.sinks)
            .stdin(Stdio::null());
        cmd
    }

    pub fn spawn(&self, mut cmd: Command) -> ChildGuard {
        let child = cmd
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .expect("spawn daemon");
        ChildGuard::new(child)
    }
}

pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(25));
    }
    condition()
}

pub fn dir_is_empty(path: &Path) -> bool {
    fs::read_dir(path).map(|mut it| it.next().is_none()).unwrap_or(false)
}

pub fn run_with_timeout(mut cmd: Command, timeout: Duration) -> std::process::Output {
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    let mut child = cmd.spawn().expect("spawn command");

    match child.wait_timeout(timeout).expect("wait for process") {
        Some(_status) => child
            .wait_with_output()
            .expect("collect command output after completion"),
        None => {
            let _ = child.kill();
            let output = child
                .wait_with_output()
                .expect("collect output after killing command");
            panic!(
                "command timed out after {:?}\nstdout:\n{}\nstderr:\n{}",
                timeout,
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
        }
    }
}

pub struct ChildGuard {
    pub child: Option<Child>,
}

impl ChildGuard {
    pub fn new(child: Child) -> Self {
        Self { child: Some(child) }
    }

    /// Send SIGTERM and collect the output once the daemon exits.
    #[cfg(unix)]
    pub fn terminate(mut self, timeout: Duration) -> std::process::Output {
        let mut child = self.child.take().expect("child still running");
        let pid = child.id() as libc::pid_t;
        // SAFETY: pid belongs to a child we spawned and have not reaped yet.
        let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
        assert_eq!(rc, 0, "failed to signal daemon");

        match child.wait_timeout(timeout).expect("wait for daemon") {
            Some(_status) => child.wait_with_output().expect("collect daemon output"),
            None => {
                let _ = child.kill();
                let output = child.wait_with_output().expect("collect output after kill");
                panic!(
                    "daemon ignored SIGTERM for {:?}\nstderr:\n{}",
                    timeout,
                    String::from_utf8_lossy(&output.stderr)
                );
            }
        }
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
