//! Session state machine for one upload attempt.
//!
//! The session is the single source of truth rendered by every front end. It is
//! owned by the controller task, which is its only writer; presentation layers
//! receive [`SessionSnapshot`]s.
//!
//! Each attempt is identified by a generation number. Selecting a file,
//! rejecting a file and resetting all start a new generation, and any
//! [`ScanEvent`] tagged with another generation is dropped. This is what keeps
//! a slow response for a replaced file from touching the newer attempt.

use crate::error::ScanError;
use crate::intake::{FileHandle, SelectedFile};
use crate::model::{Prediction, ScanEvent};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No file chosen.
    Idle,
    /// File accepted; preview and upload in flight.
    Processing,
    /// Result available. Left only through an explicit reset or new selection.
    Complete,
    /// Error message available; the file stays visible.
    Failed,
}

/// Outcome of applying a [`ScanEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Event belongs to an older attempt and was discarded.
    Stale,
    /// Event was current but had no effect in this phase.
    Ignored,
    Changed,
    /// Interpretation succeeded; the caller should schedule the cosmetic hold
    /// and deliver [`ScanEvent::HoldElapsed`] afterwards.
    HoldStarted,
}

#[derive(Debug, Clone)]
pub struct Session {
    generation: u64,
    selected_file: Option<SelectedFile>,
    upload_percent: u8,
    phase: Phase,
    result: Option<Prediction>,
    error_message: Option<String>,
    // Result interpreted but not yet shown; cleared on every transition out of
    // the hold.
    pending: Option<Prediction>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::idle(0)
    }

    fn idle(generation: u64) -> Self {
        Self {
            generation,
            selected_file: None,
            upload_percent: 0,
            phase: Phase::Idle,
            result: None,
            error_message: None,
            pending: None,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn upload_percent(&self) -> u8 {
        self.upload_percent
    }

    pub fn result(&self) -> Option<&Prediction> {
        self.result.as_ref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn selected_file(&self) -> Option<&SelectedFile> {
        self.selected_file.as_ref()
    }

    /// Replace the session with a fresh `processing` attempt for an accepted
    /// file. Returns the new generation to tag background work with.
    pub fn begin_attempt(&mut self, handle: &FileHandle) -> u64 {
        let generation = self.generation + 1;
        *self = Self {
            selected_file: Some(SelectedFile::new(handle)),
            phase: Phase::Processing,
            ..Self::idle(generation)
        };
        generation
    }

    /// Replace the session with a `failed` attempt for a file that intake
    /// rejected. No background work is started for it.
    pub fn reject(&mut self, handle: &FileHandle, error: &ScanError) -> u64 {
        let generation = self.generation + 1;
        *self = Self {
            selected_file: Some(SelectedFile::new(handle)),
            phase: Phase::Failed,
            error_message: Some(error.user_message().to_string()),
            ..Self::idle(generation)
        };
        generation
    }

    /// Explicit "remove image" / "upload new image". Valid from any phase.
    pub fn reset(&mut self) {
        *self = Self::idle(self.generation + 1);
    }

    pub fn apply(&mut self, event: ScanEvent) -> Applied {
        if event.generation() != self.generation {
            return Applied::Stale;
        }

        match event {
            ScanEvent::Progress { percent, .. } => {
                let percent = percent.min(100);
                if self.phase != Phase::Processing || percent <= self.upload_percent {
                    return Applied::Ignored;
                }
                self.upload_percent = percent;
                Applied::Changed
            }
            ScanEvent::PreviewReady { preview, .. } => match self.selected_file.as_mut() {
                Some(file) if file.preview.is_none() => {
                    file.preview = Some(preview);
                    Applied::Changed
                }
                _ => Applied::Ignored,
            },
            ScanEvent::PreviewFailed { .. } => Applied::Ignored,
            ScanEvent::Succeeded { prediction, .. } => {
                if self.phase != Phase::Processing || self.pending.is_some() {
                    return Applied::Ignored;
                }
                self.upload_percent = 100;
                self.pending = Some(*prediction);
                Applied::HoldStarted
            }
            ScanEvent::HoldElapsed { .. } => {
                if self.phase != Phase::Processing {
                    return Applied::Ignored;
                }
                match self.pending.take() {
                    Some(prediction) => {
                        self.error_message = None;
                        self.result = Some(prediction);
                        self.phase = Phase::Complete;
                        Applied::Changed
                    }
                    None => Applied::Ignored,
                }
            }
            ScanEvent::Failed { error, .. } => {
                if self.phase != Phase::Processing {
                    return Applied::Ignored;
                }
                self.pending = None;
                self.result = None;
                self.error_message = Some(error.user_message().to_string());
                self.phase = Phase::Failed;
                Applied::Changed
            }
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            generation: self.generation,
            phase: self.phase,
            selected_file: self.selected_file.clone(),
            upload_percent: self.upload_percent,
            result: self.result.clone(),
            error_message: self.error_message.clone(),
        }
    }
}

/// Read-only view of a [`Session`] for rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub generation: u64,
    pub phase: Phase,
    pub selected_file: Option<SelectedFile>,
    pub upload_percent: u8,
    pub result: Option<Prediction>,
    pub error_message: Option<String>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Session::new().snapshot()
    }
}

impl SessionSnapshot {
    /// Whether the "Analyzing..." progress bar should be shown.
    pub fn is_processing(&self) -> bool {
        self.phase == Phase::Processing
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, Phase::Complete | Phase::Failed)
    }
}
