use crate::intake::{parse_dropped_path, DragEvent, DropZone, FileHandle, IntakeSource};
use crate::orchestrator::{AppEvent, UiCommand};
use crate::session::{Phase, SessionSnapshot};

/// What a key press or paste asks the UI loop to do.
#[derive(Debug)]
pub(crate) enum UiAction {
    None,
    Send(UiCommand),
    Quit,
}

/// Presentation state. Owned by the UI thread only; session data arrives as
/// snapshots from the controller and is never mutated here.
#[derive(Default)]
pub(crate) struct UiState {
    pub snapshot: SessionSnapshot,
    pub drop_zone: DropZone,
    /// Path prompt contents while browsing for a file.
    pub path_input: Option<String>,
    pub info: String,
    pub show_help: bool,
    pub server: String,
}

impl UiState {
    pub fn apply_event(&mut self, ev: AppEvent) {
        match ev {
            AppEvent::Snapshot(s) => self.snapshot = *s,
            AppEvent::Info(info) => self.info = info.to_message(),
        }
    }

    pub fn status_label(&self) -> &'static str {
        match self.snapshot.phase {
            Phase::Idle => "Waiting for image",
            Phase::Processing => "Analyzing...",
            Phase::Complete => "Processing Complete",
            Phase::Failed => "Analysis failed",
        }
    }

    /// Open the path prompt; the upload area stays highlighted while it is open.
    pub fn open_picker(&mut self) {
        self.path_input = Some(String::new());
        self.drop_zone.on_drag(DragEvent::Enter);
    }

    pub fn cancel_picker(&mut self) {
        self.path_input = None;
        self.drop_zone.on_drag(DragEvent::Leave);
    }

    pub fn type_into_picker(&mut self, text: &str) {
        if let Some(input) = self.path_input.as_mut() {
            input.push_str(text);
            self.drop_zone.on_drag(DragEvent::Over);
        }
    }

    pub fn backspace_picker(&mut self) {
        if let Some(input) = self.path_input.as_mut() {
            input.pop();
            self.drop_zone.on_drag(DragEvent::Over);
        }
    }

    /// Submit the path prompt. Empty input just closes it.
    pub fn submit_picker(&mut self) -> UiAction {
        self.drop_zone.on_drag(DragEvent::Leave);
        let Some(text) = self.path_input.take() else {
            return UiAction::None;
        };
        match parse_dropped_path(&text) {
            Some(path) => UiAction::Send(UiCommand::SelectFile(FileHandle::from_path(
                path,
                IntakeSource::Picker,
            ))),
            None => UiAction::None,
        }
    }

    /// Pasted text is a drop onto the upload area, unless the path prompt is open.
    pub fn on_paste(&mut self, text: &str) -> UiAction {
        if self.path_input.is_some() {
            self.type_into_picker(text.lines().next().unwrap_or_default());
            return UiAction::None;
        }
        match self.drop_zone.on_drop(text) {
            Some(handle) => UiAction::Send(UiCommand::SelectFile(handle)),
            None => {
                self.info = "Drop did not contain a file path".into();
                UiAction::None
            }
        }
    }

    /// "Remove image": available whenever a file is shown.
    pub fn remove_image(&mut self) -> UiAction {
        if self.snapshot.selected_file.is_some() {
            UiAction::Send(UiCommand::Reset)
        } else {
            UiAction::None
        }
    }

    /// "Upload new image": only offered once results are shown.
    pub fn upload_new(&mut self) -> UiAction {
        if self.snapshot.phase == Phase::Complete {
            UiAction::Send(UiCommand::Reset)
        } else {
            UiAction::None
        }
    }
}
