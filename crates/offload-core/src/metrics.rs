//! Best-effort StatsD-style metric emission.
//!
//! Each metric travels as its own UDP datagram (`name:value|g` or
//! `name:value|c`). Nothing is acknowledged or retried.

use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use eyre::{bail, eyre, Context, Result};

use crate::summary::RunSummary;

/// Series prefix existing Netdata charts and alarms are keyed on.
pub const DEFAULT_PREFIX: &str = "s5commander";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    fn suffix(self) -> &'static str {
        match self {
            MetricKind::Gauge => "g",
            MetricKind::Counter => "c",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Int(i64),
    /// Rendered with two decimals.
    Float(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub name: String,
    pub value: MetricValue,
    pub kind: MetricKind,
}

impl Metric {
    pub fn gauge(name: impl Into<String>, value: MetricValue) -> Self {
        Self {
            name: name.into(),
            value,
            kind: MetricKind::Gauge,
        }
    }

    pub fn counter(name: impl Into<String>, delta: i64) -> Self {
        Self {
            name: name.into(),
            value: MetricValue::Int(delta),
            kind: MetricKind::Counter,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            MetricValue::Int(v) => write!(f, "{}:{}|{}", self.name, v, self.kind.suffix()),
            MetricValue::Float(v) => write!(f, "{}:{:.2}|{}", self.name, v, self.kind.suffix()),
        }
    }
}

/// Destination for metric snapshots.
pub trait MetricsSink: Send {
    /// Emit a batch. Errors are informational; callers log and move on.
    fn emit(&self, batch: &[Metric]) -> Result<()>;
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn emit(&self, _batch: &[Metric]) -> Result<()> {
        Ok(())
    }
}

/// UDP sink speaking the StatsD line protocol (Netdata's statsd plugin, etc).
#[derive(Debug)]
pub struct StatsdSink {
    socket: UdpSocket,
    target: SocketAddr,
}

impl StatsdSink {
    pub fn connect(address: &str) -> Result<Self> {
        let target = address
            .to_socket_addrs()
            .wrap_err_with(|| format!("invalid statsd address {address}"))?
            .next()
            .ok_or_else(|| eyre!("statsd address {address} did not resolve"))?;
        let bind: SocketAddr = if target.is_ipv4() {
            "0.0.0.0:0".parse()?
        } else {
            "[::]:0".parse()?
        };
        let socket = UdpSocket::bind(bind).context("bind statsd socket")?;
        socket
            .connect(target)
            .wrap_err_with(|| format!("failed to connect to statsd at {target}"))?;
        Ok(Self { socket, target })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

impl MetricsSink for StatsdSink {
    fn emit(&self, batch: &[Metric]) -> Result<()> {
        let mut failed = 0usize;
        let mut last_err = None;
        for metric in batch {
            if let Err(err) = self.socket.send(metric.to_string().as_bytes()) {
                failed += 1;
                last_err = Some(err);
            }
        }
        if let Some(err) = last_err {
            bail!(
                "{failed} of {} datagrams to {} were not sent: {err}",
                batch.len(),
                self.target
            );
        }
        Ok(())
    }
}

/// Gauges for a single run plus operational counters.
pub fn run_snapshot(prefix: &str, summary: &RunSummary, now_unix: i64) -> Vec<Metric> {
    vec![
        Metric::gauge(
            format!("{prefix}.current.files_transferred"),
            MetricValue::Int(summary.files_transferred as i64),
        ),
        Metric::gauge(
            format!("{prefix}.current.files_deleted"),
            MetricValue::Int(summary.files_deleted as i64),
        ),
        Metric::gauge(
            format!("{prefix}.current.megabytes_transferred"),
            MetricValue::Float(summary.megabytes()),
        ),
        Metric::gauge(
            format!("{prefix}.current.files_failed_delete"),
            MetricValue::Int(summary.failed_count() as i64),
        ),
        Metric::gauge(
            format!("{prefix}.current.success_rate"),
            MetricValue::Float(summary.success_rate()),
        ),
        Metric::counter(format!("{prefix}.runs_completed"), 1),
        Metric::gauge(format!("{prefix}.last_activity"), MetricValue::Int(now_unix)),
    ]
}

/// Session totals sent once on shutdown.
pub fn shutdown_snapshot(prefix: &str, session: &RunSummary, total_runs: u64) -> Vec<Metric> {
    vec![
        Metric::gauge(
            format!("{prefix}.session.final_files_transferred"),
            MetricValue::Int(session.files_transferred as i64),
        ),
        Metric::gauge(
            format!("{prefix}.session.final_files_deleted"),
            MetricValue::Int(session.files_deleted as i64),
        ),
        Metric::gauge(
            format!("{prefix}.session.final_megabytes_transferred"),
            MetricValue::Float(session.megabytes()),
        ),
        Metric::gauge(
            format!("{prefix}.session.final_files_failed_delete"),
            MetricValue::Int(session.failed_count() as i64),
        ),
        Metric::gauge(
            format!("{prefix}.session.final_success_rate"),
            MetricValue::Float(session.success_rate()),
        ),
        Metric::gauge(
            format!("{prefix}.session.total_runs"),
            MetricValue::Int(total_runs as i64),
        ),
        Metric::counter(format!("{prefix}.shutdown"), 1),
    ]
}
