//! Application-level orchestration.
//!
//! This module owns the scan session lifecycle: it serialises every session
//! mutation through one controller task and streams snapshots to the UI/CLI
//! layers, which only render.

mod controller;

pub(crate) use controller::{run_controller, AppEvent, Controller, UiCommand};
