//! Decoder for the copy tool's `--json` output.
//!
//! The tool writes one JSON object per line for every operation it performs,
//! interleaved with diagnostic lines that are not JSON at all. Lines that do not
//! decode as a [`TransferRecord`] are skipped. A whole-invocation failure is
//! reported instead as a single `{"error": "..."}` envelope.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::Deserialize;

/// Operation tag emitted for a copy.
pub const COPY_OPERATION: &str = "cp";
/// Object type tag emitted for regular files.
pub const FILE_OBJECT: &str = "file";
/// Marker the tool uses when the source glob matched nothing.
pub const NO_MATCH_MARKER: &str = "no match found for";

/// One per-item result line.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TransferRecord {
    pub operation: String,
    pub success: bool,
    pub source: String,
    pub destination: String,
    pub object: ObjectInfo,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ObjectInfo {
    #[serde(rename = "type")]
    pub kind: String,
    pub size: u64,
}

impl TransferRecord {
    /// True only for a successful copy of a regular file.
    pub fn is_confirmed_file_copy(&self) -> bool {
        self.operation == COPY_OPERATION && self.success && self.object.kind == FILE_OBJECT
    }

    pub fn source_path(&self) -> PathBuf {
        PathBuf::from(&self.source)
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: String,
}

/// Streams records out of a newline-delimited reader.
///
/// A trailing fragment without a terminating newline ends the stream and is
/// not decoded.
pub struct RecordReader<R> {
    reader: R,
    line: Vec<u8>,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::new(),
        }
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = io::Result<TransferRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.line.clear();
            match self.reader.read_until(b'\n', &mut self.line) {
                Ok(0) => return None,
                Ok(_) if self.line.last() != Some(&b'\n') => return None,
                Ok(_) => {
                    if let Ok(record) = serde_json::from_slice::<TransferRecord>(&self.line) {
                        return Some(Ok(record));
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

/// Open a sink file for record streaming.
pub fn read_records(path: &Path) -> Result<RecordReader<BufReader<File>>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open job result file {}", path.display()))?;
    Ok(RecordReader::new(BufReader::new(file)))
}

/// Message of a whole-invocation error envelope, if `contents` is one.
pub fn error_envelope(contents: &[u8]) -> Option<String> {
    if contents.is_empty() {
        return None;
    }
    serde_json::from_slice::<ErrorEnvelope>(contents)
        .ok()
        .map(|envelope| envelope.error)
}

/// Whether an envelope message says the source glob matched nothing.
pub fn is_no_match(message: &str) -> bool {
    message.contains(NO_MATCH_MARKER)
}

/// Read a failed invocation's sink and decode its error envelope.
///
/// A missing sink is not an error; it simply carries no envelope.
pub fn read_error_envelope(path: &Path) -> Result<Option<String>> {
    let contents = match fs::read(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("could not read output file {}", path.display()))
        }
    };
    Ok(error_envelope(&contents))
}
