use clap::Parser;
use eyre::{bail, eyre, Context, Result};
use offload_core::invoker::{ENV_ACCESS_KEY_ID, ENV_DEFAULT_REGION, ENV_SECRET_ACCESS_KEY};
use offload_core::metrics::DEFAULT_PREFIX;
use offload_core::{CopyJob, Credentials};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_FOLDER_PREFIX: &str = "/tmp/";
const DEFAULT_PATH_SUFFIX: &str = "/**/**/*.gz";
const DEFAULT_PROCESS_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_STATSD_ADDRESS: &str = "127.0.0.1:8125";
const DEFAULT_BINARY: &str = "s5cmd";
const DEFAULT_PROFILE: &str = "default";

pub(crate) const PRECEDENCE_NOTE: &str = "Settings resolve as: command-line flag, then \
    environment variable, then config file, then built-in default. A flag overrides its \
    environment variable when both are set.";

#[derive(Debug, Clone)]
pub(crate) struct MetricsConfig {
    pub(crate) address: String,
    pub(crate) prefix: String,
}

#[derive(Debug)]
pub(crate) struct OffloadRuntime {
    pub(crate) job: CopyJob,
    pub(crate) sink_dir: PathBuf,
    pub(crate) process_interval: Duration,
    pub(crate) report_interval: Duration,
    pub(crate) metrics: Option<MetricsConfig>,
    pub(crate) warnings: Vec<String>,
}

#[derive(Parser, Debug)]
#[command(
    name = "s5-offload",
    version,
    about = "Offload spooled files to object storage with s5cmd, deleting each one after a confirmed upload",
    after_help = PRECEDENCE_NOTE
)]
pub(crate) struct DaemonArgs {
    /// Path to a TOML configuration file. Defaults to /etc/s5-offload/config.toml when present.
    #[arg(long, env = "OFFLOAD_CONFIG")]
    pub(crate) config: Option<PathBuf>,
    /// Folder prefix for files to be offloaded
    #[arg(long, env = "FOLDER_PREFIX")]
    pub(crate) folder_prefix: Option<PathBuf>,
    /// Path suffix used for glob matching under the folder prefix
    #[arg(long, env = "PATH_SUFFIX")]
    pub(crate) path_suffix: Option<String>,
    /// Interval between processing runs (e.g. 500ms, 1s, 2m)
    #[arg(long, env = "PROCESS_INTERVAL", value_parser = parse_duration)]
    pub(crate) process_interval: Option<Duration>,
    /// Interval between summary log lines
    #[arg(long, env = "REPORT_INTERVAL", value_parser = parse_duration)]
    pub(crate) report_interval: Option<Duration>,
    /// Send metrics to a Netdata/StatsD listener
    #[arg(long, env = "NETDATA_ENABLED", value_parser = parse_bool, num_args = 0..=1, default_missing_value = "true")]
    pub(crate) netdata_enabled: Option<bool>,
    /// StatsD address (UDP)
    #[arg(long, env = "NETDATA_ADDRESS")]
    pub(crate) netdata_address: Option<String>,
    /// Prefix for emitted metric names
    #[arg(long, env = "METRICS_PREFIX")]
    pub(crate) metrics_prefix: Option<String>,
    /// Path to the s5cmd binary
    #[arg(long, env = "S5CMD_BINARY")]
    pub(crate) s5cmd_binary: Option<PathBuf>,
    /// Destination bucket path (e.g. s3://my-bucket/path/)
    #[arg(long, env = "S3_BUCKET_PATH")]
    pub(crate) s3_bucket_path: Option<String>,
    /// Path to an AWS shared credentials file
    #[arg(long, env = "AWS_CREDS_FILE")]
    pub(crate) aws_creds_file: Option<PathBuf>,
    /// Custom S3-compatible endpoint
    #[arg(long, env = "AWS_ENDPOINT_URL")]
    pub(crate) aws_endpoint_url: Option<String>,
    /// Profile to use from the credentials file
    #[arg(long, env = "AWS_PROFILE")]
    pub(crate) aws_profile: Option<String>,
    /// Directory for transient job output files (defaults to the working directory)
    #[arg(long, env = "SINK_DIR")]
    pub(crate) sink_dir: Option<PathBuf>,
    /// Verbose (debug) logging
    #[arg(short, long)]
    pub(crate) verbose: bool,
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    offload: RawOffloadSection,
    #[serde(default)]
    metrics: RawMetricsSection,
}

#[derive(Debug, Default, Deserialize)]
struct RawOffloadSection {
    folder_prefix: Option<PathBuf>,
    path_suffix: Option<String>,
    process_interval: Option<String>,
    report_interval: Option<String>,
    s5cmd_binary: Option<PathBuf>,
    s3_bucket_path: Option<String>,
    aws_creds_file: Option<PathBuf>,
    aws_endpoint_url: Option<String>,
    aws_profile: Option<String>,
    sink_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMetricsSection {
    enabled: Option<bool>,
    address: Option<String>,
    prefix: Option<String>,
}

fn default_config_path() -> PathBuf {
    PathBuf::from("/etc/s5-offload/config.toml")
}

/// Parse a Go-style duration (`500ms`, `1m30s`, `1h15m`, `100us`) or a bare
/// number of seconds.
pub(crate) fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("empty duration".to_string());
    }
    if let Ok(seconds) = raw.parse::<f64>() {
        return Duration::try_from_secs_f64(seconds)
            .map_err(|err| format!("invalid duration '{raw}': {err}"));
    }

    let mut nanos = 0f64;
    let mut rest = raw;
    while !rest.is_empty() {
        let split = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(split);
        let value: f64 = number
            .parse()
            .map_err(|_| format!("invalid duration '{raw}'"))?;
        let split = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(split);
        let scale = match unit {
            "ns" => 1.0,
            "us" | "\u{b5}s" | "\u{3bc}s" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            other => return Err(format!("unknown duration unit '{other}' in '{raw}'")),
        };
        nanos += value * scale;
        rest = tail;
    }

    if !nanos.is_finite() || nanos > u64::MAX as f64 {
        return Err(format!("duration '{raw}' is out of range"));
    }
    Ok(Duration::from_nanos(nanos.round() as u64))
}

pub(crate) fn parse_bool(raw: &str) -> Result<bool, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(format!("expected true/false/1/0/yes/no, got '{other}'")),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn non_empty_path(value: Option<PathBuf>) -> Option<PathBuf> {
    value.filter(|p| !p.as_os_str().is_empty())
}

/// Choose the credential channel. Environment credentials win when all three
/// variables are set; otherwise a credentials file is required.
pub(crate) fn resolve_credentials<F>(
    creds_file: Option<PathBuf>,
    profile: String,
    lookup: F,
) -> Result<Credentials>
where
    F: Fn(&str) -> Option<String>,
{
    let env = |key: &str| non_empty(lookup(key));
    if let (Some(access_key_id), Some(secret_access_key), Some(default_region)) = (
        env(ENV_ACCESS_KEY_ID),
        env(ENV_SECRET_ACCESS_KEY),
        env(ENV_DEFAULT_REGION),
    ) {
        return Ok(Credentials::Environment {
            access_key_id,
            secret_access_key,
            default_region,
        });
    }

    match non_empty_path(creds_file) {
        Some(path) => Ok(Credentials::File { path, profile }),
        None => bail!(
            "either --aws-creds-file (AWS_CREDS_FILE) or the environment variables {ENV_ACCESS_KEY_ID}, {ENV_SECRET_ACCESS_KEY} and {ENV_DEFAULT_REGION} are required"
        ),
    }
}

pub(crate) fn load_runtime(args: &DaemonArgs) -> Result<OffloadRuntime> {
    load_runtime_with(args, |key| std::env::var(key).ok())
}

pub(crate) fn load_runtime_with<F>(args: &DaemonArgs, lookup: F) -> Result<OffloadRuntime>
where
    F: Fn(&str) -> Option<String>,
{
    let mut warnings = Vec::new();

    let config_path = if let Some(path) = &args.config {
        Some(path.clone())
    } else {
        let candidate = default_config_path();
        if candidate.exists() {
            Some(candidate)
        } else {
            None
        }
    };

    let raw = if let Some(ref path) = config_path {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str::<RawConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?
    } else {
        RawConfig::default()
    };
    let file = raw.offload;

    let destination = non_empty(args.s3_bucket_path.clone())
        .or_else(|| non_empty(file.s3_bucket_path))
        .ok_or_else(|| eyre!("--s3-bucket-path (or S3_BUCKET_PATH) is required"))?;

    let profile = non_empty(args.aws_profile.clone())
        .or_else(|| non_empty(file.aws_profile))
        .unwrap_or_else(|| DEFAULT_PROFILE.to_string());
    let creds_file = non_empty_path(args.aws_creds_file.clone()).or(file.aws_creds_file);
    let credentials = resolve_credentials(creds_file, profile, &lookup)?;

    let file_duration = |raw: Option<String>, name: &str| -> Result<Option<Duration>> {
        raw.map(|value| {
            parse_duration(&value).map_err(|err| eyre!("invalid {name} in config file: {err}"))
        })
        .transpose()
    };
    let process_interval = match args.process_interval {
        Some(interval) => interval,
        None => file_duration(file.process_interval, "process_interval")?
            .unwrap_or(DEFAULT_PROCESS_INTERVAL),
    };
    if process_interval.is_zero() {
        bail!("process interval must be greater than zero");
    }
    let report_interval = match args.report_interval {
        Some(interval) => interval,
        None => file_duration(file.report_interval, "report_interval")?
            .unwrap_or(DEFAULT_REPORT_INTERVAL),
    };
    if report_interval < process_interval {
        warnings.push(format!(
            "report interval {report_interval:?} is shorter than the process interval {process_interval:?}; reporting after every run"
        ));
    }

    let sink_dir = match non_empty_path(args.sink_dir.clone()).or(file.sink_dir) {
        Some(dir) => dir,
        None => std::env::current_dir().context("failed to determine working directory")?,
    };
    if !sink_dir.is_dir() {
        bail!("sink directory {} does not exist", sink_dir.display());
    }

    let metrics_enabled = args
        .netdata_enabled
        .or(raw.metrics.enabled)
        .unwrap_or(false);
    let metrics = metrics_enabled.then(|| MetricsConfig {
        address: non_empty(args.netdata_address.clone())
            .or_else(|| non_empty(raw.metrics.address.clone()))
            .unwrap_or_else(|| DEFAULT_STATSD_ADDRESS.to_string()),
        prefix: non_empty(args.metrics_prefix.clone())
            .or_else(|| non_empty(raw.metrics.prefix.clone()))
            .unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
    });

    let job = CopyJob {
        binary: non_empty_path(args.s5cmd_binary.clone())
            .or(file.s5cmd_binary)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BINARY)),
        source_root: non_empty_path(args.folder_prefix.clone())
            .or(file.folder_prefix)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_FOLDER_PREFIX)),
        glob_suffix: args
            .path_suffix
            .clone()
            .or(file.path_suffix)
            .unwrap_or_else(|| DEFAULT_PATH_SUFFIX.to_string()),
        destination,
        endpoint_url: non_empty(args.aws_endpoint_url.clone())
            .or_else(|| non_empty(file.aws_endpoint_url)),
        credentials,
    };

    if !job.source_root.is_dir() {
        warnings.push(format!(
            "folder prefix {} does not exist yet; runs will match nothing until it does",
            job.source_root.display()
        ));
    }

    Ok(OffloadRuntime {
        job,
        sink_dir,
        process_interval,
        report_interval,
        metrics,
        warnings,
    })
}
