//! Builds and runs one copy-tool invocation per cycle.

use std::ffi::OsString;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use uuid::Uuid;

/// Log verbosity requested from the copy tool.
pub const TOOL_LOG_LEVEL: &str = "info";

pub const ENV_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const ENV_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const ENV_DEFAULT_REGION: &str = "AWS_DEFAULT_REGION";

/// Unique token for one cycle; names its sink file and tags its log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn sink_file_name(&self) -> String {
        format!("{}.json", self.0)
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// How the copy tool obtains its object-storage credentials.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Shared credentials file plus the profile to read from it.
    File { path: PathBuf, profile: String },
    /// Values forwarded into the child's environment.
    Environment {
        access_key_id: String,
        secret_access_key: String,
        default_region: String,
    },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::File { path, profile } => f
                .debug_struct("File")
                .field("path", path)
                .field("profile", profile)
                .finish(),
            Credentials::Environment { default_region, .. } => f
                .debug_struct("Environment")
                .field("access_key_id", &"<redacted>")
                .field("secret_access_key", &"<redacted>")
                .field("default_region", default_region)
                .finish(),
        }
    }
}

/// Everything needed to run a recursive copy of the matching files.
#[derive(Debug, Clone)]
pub struct CopyJob {
    pub binary: PathBuf,
    pub source_root: PathBuf,
    pub glob_suffix: String,
    pub destination: String,
    pub endpoint_url: Option<String>,
    pub credentials: Credentials,
}

impl CopyJob {
    /// Source argument handed to the tool.
    pub fn source_glob(&self) -> PathBuf {
        join_glob(&self.source_root, &self.glob_suffix)
    }

    pub fn arguments(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> =
            vec!["--json".into(), "--log".into(), TOOL_LOG_LEVEL.into()];

        if let Some(endpoint) = self.endpoint_url.as_deref().filter(|e| !e.is_empty()) {
            args.push("--endpoint-url".into());
            args.push(endpoint.into());
        }

        if let Credentials::File { path, profile } = &self.credentials {
            args.push("--credentials-file".into());
            args.push(path.clone().into_os_string());
            args.push("--profile".into());
            args.push(profile.into());
        }

        args.push("cp".into());
        args.push(self.source_glob().into_os_string());
        args.push(self.destination.clone().into());
        args
    }

    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(self.arguments()).stdin(Stdio::null());
        if let Credentials::Environment {
            access_key_id,
            secret_access_key,
            default_region,
        } = &self.credentials
        {
            cmd.env(ENV_ACCESS_KEY_ID, access_key_id)
                .env(ENV_SECRET_ACCESS_KEY, secret_access_key)
                .env(ENV_DEFAULT_REGION, default_region);
        }
        cmd
    }

    /// Run the tool to completion with stdout and stderr both written to `output`.
    pub fn run(&self, output: File) -> io::Result<ExitStatus> {
        let stderr = output.try_clone()?;
        let mut cmd = self.command();
        cmd.stdout(Stdio::from(output)).stderr(Stdio::from(stderr));
        cmd.status()
    }
}

/// Strip exactly one leading separator from a glob suffix.
pub fn normalize_glob_suffix(suffix: &str) -> &str {
    suffix.strip_prefix('/').unwrap_or(suffix)
}

/// Join a normalized glob suffix onto `root`.
///
/// Repeated separators and `.` segments collapse; `..` is kept as written.
/// A suffix that still looks absolute after normalization stays under `root`.
pub fn join_glob(root: &Path, suffix: &str) -> PathBuf {
    let mut joined = root.to_path_buf();
    for component in Path::new(normalize_glob_suffix(suffix)).components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
            other => joined.push(other),
        }
    }
    joined
}

/// Transient output file for one run, removed when dropped.
#[derive(Debug)]
pub struct SinkFile {
    path: PathBuf,
}

impl SinkFile {
    /// Create (or truncate) the sink and return the guard with a writable handle.
    pub fn create(path: PathBuf) -> io::Result<(Self, File)> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        Ok((Self { path }, file))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SinkFile {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            if err.kind() != io::ErrorKind::NotFound {
                log::warn!(
                    "failed to remove job output file {}: {}",
                    self.path.display(),
                    err
                );
            }
        }
    }
}
