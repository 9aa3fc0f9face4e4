//! Replays recorded native results from JSON snapshot files.
//!
//! A snapshot holds the memory regions a set of results points into and,
//! per request kind, the ordered responses the library gave. Responses
//! for a kind are served in order and the last one repeats.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use super::{NativeSurface, RawResult, Request, RequestKind};
use crate::config::LayoutVersion;
use crate::decoder::{MemoryImage, NativeAddr, NativeMemory};
use crate::error::{Error, ErrorCode, NativeError, Result};

/// On-disk form of a snapshot.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SnapshotFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<LayoutVersion>,
    #[serde(default)]
    pub regions: Vec<Region>,
    #[serde(default)]
    pub responses: Vec<Response>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Region {
    pub base: NativeAddr,
    /// Region contents, hex encoded.
    pub hex: String,
}

/// One recorded answer to a native call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub request: RequestKind,
    #[serde(default)]
    pub result: NativeAddr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<i32>,
    /// Set when the call failed; `result` is ignored then.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errno: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Response {
    pub fn ok(request: RequestKind, result: NativeAddr, count: Option<i32>) -> Self {
        Self { request, result, count, errno: None, message: None }
    }

    pub fn failed(request: RequestKind, code: ErrorCode) -> Self {
        Self { request, result: NativeAddr::NULL, count: None, errno: Some(code.0), message: None }
    }

    fn answer(&self) -> std::result::Result<RawResult, NativeError> {
        if let Some(code) = self.errno {
            return Err(NativeError {
                call: self.request.native_call(),
                code: ErrorCode(code),
                message: self.message.clone(),
            });
        }
        let raw = RawResult::new(self.request, self.result);
        Ok(match self.count {
            Some(count) => raw.with_count(count),
            None => raw,
        })
    }
}

impl SnapshotFile {
    /// Captures an image and its responses.
    pub fn capture(memory: &MemoryImage, responses: &[Response], layout: Option<LayoutVersion>) -> Self {
        Self {
            layout,
            regions: memory
                .regions()
                .map(|(base, bytes)| Region { base, hex: hex::encode(bytes) })
                .collect(),
            responses: responses.to_vec(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Snapshot {
            path: "<memory>".to_string(),
            reason: e.to_string(),
        })
    }
}

/// A [`NativeSurface`] answering from recorded snapshots.
#[derive(Debug)]
pub struct SnapshotSurface {
    memory: MemoryImage,
    responses: BTreeMap<RequestKind, Vec<Response>>,
    cursors: HashMap<RequestKind, usize>,
    layout: Option<LayoutVersion>,
}

impl SnapshotSurface {
    pub fn from_image(memory: MemoryImage, responses: Vec<Response>, layout: Option<LayoutVersion>) -> Self {
        let mut by_kind: BTreeMap<RequestKind, Vec<Response>> = BTreeMap::new();
        for response in responses {
            by_kind.entry(response.request).or_default().push(response);
        }
        Self { memory, responses: by_kind, cursors: HashMap::new(), layout }
    }

    /// Loads a snapshot file, or every `*.json` file below a directory in
    /// file name order.
    pub fn open(path: &Path) -> Result<Self> {
        let files: Vec<_> = if path.is_dir() {
            WalkDir::new(path)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.into_path())
                .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
                .collect()
        } else {
            vec![path.to_path_buf()]
        };

        if files.is_empty() {
            return Err(snapshot_error(path, "no snapshot files found"));
        }

        let mut memory = MemoryImage::new();
        let mut responses = Vec::new();
        let mut layout: Option<LayoutVersion> = None;
        for file in &files {
            let text = fs::read_to_string(file).map_err(|e| snapshot_error(file, e))?;
            let snapshot: SnapshotFile = serde_json::from_str(&text).map_err(|e| snapshot_error(file, e))?;

            match (layout, snapshot.layout) {
                (Some(seen), Some(this)) if seen != this => {
                    return Err(snapshot_error(
                        file,
                        format!("layout {} conflicts with {}", this.as_str(), seen.as_str()),
                    ));
                }
                (None, Some(this)) => layout = Some(this),
                _ => {}
            }

            for region in snapshot.regions {
                let bytes = hex::decode(&region.hex)
                    .map_err(|e| snapshot_error(file, format!("region {}: {e}", region.base)))?;
                memory.map(region.base, bytes).map_err(|e| snapshot_error(file, e))?;
            }
            debug!(file = %file.display(), responses = snapshot.responses.len(), "loaded snapshot");
            responses.extend(snapshot.responses);
        }

        info!(files = files.len(), responses = responses.len(), "snapshot ready");
        Ok(Self::from_image(memory, responses, layout))
    }
}

fn snapshot_error(path: &Path, reason: impl ToString) -> Error {
    Error::Snapshot { path: path.display().to_string(), reason: reason.to_string() }
}

impl NativeSurface for SnapshotSurface {
    fn name(&self) -> &'static str {
        "snapshot"
    }

    fn memory(&self) -> &dyn NativeMemory {
        &self.memory
    }

    fn call(&mut self, request: &Request) -> std::result::Result<RawResult, NativeError> {
        let kind = request.kind();
        let Some(recorded) = self.responses.get(&kind).filter(|r| !r.is_empty()) else {
            return Err(NativeError {
                call: kind.native_call(),
                code: ErrorCode::BAD_ARGS,
                message: Some("no recorded response".to_string()),
            });
        };
        let cursor = self.cursors.entry(kind).or_insert(0);
        let index = (*cursor).min(recorded.len() - 1);
        *cursor += 1;
        debug!(%kind, index, ?request, "replaying recorded response");
        recorded[index].answer()
    }

    fn layout_hint(&self) -> Option<LayoutVersion> {
        self.layout
    }
}
