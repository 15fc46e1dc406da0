//! Scan lifecycle controller.
//!
//! Owns the [`Session`] and is its only writer. UI layers send commands in and
//! receive snapshots out; background preview/upload/hold tasks report back
//! through a generation-tagged event channel.

use crate::engine::UploadEngine;
use crate::intake::{self, FileHandle};
use crate::model::{ClientConfig, InfoEvent, ScanEvent};
use crate::session::{Applied, Phase, Session, SessionSnapshot};
use anyhow::Result;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Commands emitted by UI layers.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    SelectFile(FileHandle),
    Reset,
    Quit,
}

/// Events emitted to UI layers.
#[derive(Debug, Clone)]
pub(crate) enum AppEvent {
    Snapshot(Box<SessionSnapshot>),
    Info(InfoEvent),
}

pub(crate) struct Controller {
    cfg: ClientConfig,
    engine: UploadEngine,
    session: Session,
    scan_tx: UnboundedSender<ScanEvent>,
    scan_rx: UnboundedReceiver<ScanEvent>,
    event_tx: UnboundedSender<AppEvent>,
}

impl Controller {
    pub(crate) fn new(cfg: ClientConfig, event_tx: UnboundedSender<AppEvent>) -> Result<Self> {
        let engine = UploadEngine::new(&cfg)?;
        let (scan_tx, scan_rx) = mpsc::unbounded_channel();
        Ok(Self {
            cfg,
            engine,
            session: Session::new(),
            scan_tx,
            scan_rx,
            event_tx,
        })
    }

    fn publish(&self) {
        let _ = self
            .event_tx
            .send(AppEvent::Snapshot(Box::new(self.session.snapshot())));
    }

    fn info(&self, info: InfoEvent) {
        let _ = self.event_tx.send(AppEvent::Info(info));
    }

    /// Returns `false` once the controller should stop.
    fn handle_command(&mut self, cmd: UiCommand) -> bool {
        match cmd {
            UiCommand::SelectFile(handle) => self.select_file(handle),
            UiCommand::Reset => {
                self.session.reset();
                tracing::debug!(generation = self.session.generation(), "session reset");
                self.publish();
                self.info(InfoEvent::Reset);
            }
            UiCommand::Quit => return false,
        }
        true
    }

    fn select_file(&mut self, handle: FileHandle) {
        if let Err(e) = intake::validate(&handle) {
            let generation = self.session.reject(&handle, &e);
            tracing::info!(
                generation,
                file = %handle.name,
                media_type = %handle.media_type,
                "file rejected"
            );
            self.publish();
            self.info(InfoEvent::Rejected {
                file_name: handle.name,
                media_type: handle.media_type,
            });
            return;
        }

        // The processing snapshot goes out before any preview or network work starts.
        let generation = self.session.begin_attempt(&handle);
        tracing::info!(generation, file = %handle.name, source = ?handle.source, "file accepted");
        self.publish();

        let preview_tx = self.scan_tx.clone();
        let preview_handle = handle.clone();
        tokio::spawn(async move {
            let ev = match intake::load_preview(&preview_handle).await {
                Ok(preview) => ScanEvent::PreviewReady {
                    generation,
                    preview,
                },
                Err(e) => ScanEvent::PreviewFailed {
                    generation,
                    message: format!("{e:#}"),
                },
            };
            let _ = preview_tx.send(ev);
        });

        self.info(InfoEvent::Uploading {
            file_name: handle.name.clone(),
            url: self.engine.predict_url().to_string(),
        });
        let engine = self.engine.clone();
        let upload_tx = self.scan_tx.clone();
        tokio::spawn(async move {
            // Progress and the terminal event share one sender, so the terminal
            // event is always observed after the last progress update.
            let ev = match engine.run(generation, &handle, upload_tx.clone()).await {
                Ok(prediction) => ScanEvent::Succeeded {
                    generation,
                    prediction: Box::new(prediction),
                },
                Err(error) => ScanEvent::Failed { generation, error },
            };
            let _ = upload_tx.send(ev);
        });
    }

    fn handle_scan_event(&mut self, ev: ScanEvent) {
        let generation = ev.generation();
        let current = self.session.generation();

        if let ScanEvent::PreviewFailed { message, .. } = &ev {
            if generation == current {
                tracing::warn!(generation, reason = %message, "preview failed");
                if let Some(file) = self.session.selected_file() {
                    self.info(InfoEvent::PreviewUnavailable {
                        file_name: file.name.clone(),
                    });
                }
            }
        }

        let before = self.session.phase();
        match self.session.apply(ev) {
            Applied::Stale => {
                tracing::debug!(generation, current, "discarding event from superseded attempt");
            }
            Applied::Ignored => {}
            Applied::Changed => {
                self.trace_transition(generation, before);
                self.publish();
            }
            Applied::HoldStarted => {
                self.publish();
                self.start_hold(generation);
            }
        }
    }

    fn trace_transition(&self, generation: u64, before: Phase) {
        let session = &self.session;
        let entered = (session.phase() != before).then_some(session.phase());
        match (entered, session.result(), session.error_message()) {
            (Some(Phase::Complete), Some(p), _) => tracing::info!(
                generation,
                class = p.predicted_class.as_wire_str(),
                confidence = p.confidence_score,
                "result shown"
            ),
            (Some(Phase::Failed), _, Some(reason)) => {
                tracing::info!(generation, %reason, "attempt failed")
            }
            _ => tracing::trace!(
                generation,
                phase = ?session.phase(),
                percent = session.upload_percent(),
                "session updated"
            ),
        }
    }

    /// Deliver `HoldElapsed` after the cosmetic delay without blocking the loop.
    fn start_hold(&self, generation: u64) {
        let tx = self.scan_tx.clone();
        let hold = self.cfg.completion_hold;
        tokio::spawn(async move {
            tokio::time::sleep(hold).await;
            let _ = tx.send(ScanEvent::HoldElapsed { generation });
        });
    }

    pub(crate) async fn run(mut self, mut cmd_rx: UnboundedReceiver<UiCommand>) -> Result<()> {
        self.publish();
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => {
                            if !self.handle_command(cmd) {
                                break;
                            }
                        }
                        // All UI senders gone; in-flight work is abandoned.
                        None => break,
                    }
                }
                Some(ev) = self.scan_rx.recv() => self.handle_scan_event(ev),
            }
        }
        tracing::debug!("controller stopped");
        Ok(())
    }
}

/// Run the controller until the UI quits or drops its command sender.
pub(crate) async fn run_controller(
    cfg: ClientConfig,
    event_tx: UnboundedSender<AppEvent>,
    cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    Controller::new(cfg, event_tx)?.run(cmd_rx).await
}
