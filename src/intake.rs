//! File intake: turns a dropped or picked path into a validated [`FileHandle`]
//! and builds the preview shown next to the upload progress.

use crate::error::{ScanError, NOT_AN_IMAGE};
use anyhow::{Context, Result};
use base64::Engine as _;
use reqwest::Url;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where a file selection came from. Intake treats both the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IntakeSource {
    /// Dropped onto the upload area (a terminal paste of a path).
    Drop,
    /// Chosen through the path prompt or given on the command line.
    Picker,
}

/// A user-selected file with its declared media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    pub name: String,
    pub path: PathBuf,
    pub media_type: String,
    pub source: IntakeSource,
}

impl FileHandle {
    pub fn from_path(path: impl Into<PathBuf>, source: IntakeSource) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let media_type = declared_media_type(&path).to_string();
        Self {
            name,
            path,
            media_type,
            source,
        }
    }
}

/// Media type declared for a path, derived from its extension.
pub fn declared_media_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("webp") => "image/webp",
        Some("tif") | Some("tiff") => "image/tiff",
        Some("heic") => "image/heic",
        Some("svg") => "image/svg+xml",
        Some("dcm") => "application/dicom",
        Some("txt") => "text/plain",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

pub fn is_image_media_type(media_type: &str) -> bool {
    media_type
        .split_once('/')
        .map(|(top, sub)| top.eq_ignore_ascii_case("image") && !sub.is_empty())
        .unwrap_or(false)
}

/// Reject anything not declared as an image. Runs before any network activity.
pub fn validate(handle: &FileHandle) -> Result<(), ScanError> {
    if is_image_media_type(&handle.media_type) {
        Ok(())
    } else {
        Err(ScanError::validation(NOT_AN_IMAGE))
    }
}

/// Normalise text dropped onto the terminal into a single path.
///
/// Handles quoting, percent-encoded `file://` URIs and backslash-escaped
/// spaces as emitted by common terminal emulators. Only the first non-empty
/// line is used.
pub fn parse_dropped_path(text: &str) -> Option<PathBuf> {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty())?;

    let unquoted = ['\'', '"']
        .iter()
        .find_map(|q| line.strip_prefix(*q).and_then(|rest| rest.strip_suffix(*q)))
        .unwrap_or(line);

    if unquoted.starts_with("file://") {
        return Url::parse(unquoted).ok()?.to_file_path().ok();
    }

    let unescaped = unquoted.replace("\\ ", " ");
    if unescaped.is_empty() {
        return None;
    }
    Some(PathBuf::from(unescaped))
}

/// Transient highlight state of the upload area. Never touches the session.
///
/// Terminals report no drag hover, so the highlight follows the path prompt:
/// opening it enters the zone, typing keeps it active, cancelling leaves it.
#[derive(Debug, Default, Clone, Copy)]
pub struct DropZone {
    pub drag_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragEvent {
    Enter,
    Over,
    Leave,
}

impl DropZone {
    pub fn on_drag(&mut self, ev: DragEvent) {
        self.drag_active = matches!(ev, DragEvent::Enter | DragEvent::Over);
    }

    /// A drop ends any highlight and yields a handle for the dropped text, if
    /// it names a path.
    pub fn on_drop(&mut self, text: &str) -> Option<FileHandle> {
        self.drag_active = false;
        parse_dropped_path(text).map(|p| FileHandle::from_path(p, IntakeSource::Drop))
    }
}

/// Renderable preview of a selected file. Cloning shares the encoded buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Preview {
    #[serde(skip)]
    pub data_url: Arc<str>,
    pub bytes: usize,
}

impl Preview {
    pub fn from_bytes(media_type: &str, bytes: &[u8]) -> Self {
        let payload = base64::engine::general_purpose::STANDARD.encode(bytes);
        Self {
            data_url: Arc::from(format!("data:{media_type};base64,{payload}")),
            bytes: bytes.len(),
        }
    }
}

/// Read the file and encode it as a data URL. Runs independently of the upload.
pub async fn load_preview(handle: &FileHandle) -> Result<Preview> {
    let bytes = tokio::fs::read(&handle.path)
        .await
        .with_context(|| format!("read {}", handle.path.display()))?;
    Ok(Preview::from_bytes(&handle.media_type, &bytes))
}

/// The file currently owned by a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectedFile {
    pub name: String,
    pub media_type: String,
    pub preview: Option<Preview>,
}

impl SelectedFile {
    pub fn new(handle: &FileHandle) -> Self {
        Self {
            name: handle.name.clone(),
            media_type: handle.media_type.clone(),
            preview: None,
        }
    }
}
