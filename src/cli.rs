use crate::intake::{FileHandle, IntakeSource};
use crate::model::ClientConfig;
use crate::orchestrator::{self, AppEvent, UiCommand};
use crate::session::{Phase, SessionSnapshot};
use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "lungscan",
    version,
    about = "Lung CT scan classification client with optional TUI"
)]
pub struct Cli {
    /// Scan image to analyse right away
    pub image: Option<PathBuf>,

    /// Base URL of the classification server
    #[arg(long, env = "LUNGSCAN_SERVER", default_value = "http://127.0.0.1:5000")]
    pub server: String,

    /// Print the session as JSON and exit (no TUI)
    #[arg(long, conflicts_with = "text")]
    pub json: bool,

    /// Print progress and a text summary and exit (no TUI)
    #[arg(long)]
    pub text: bool,

    /// Pause between 100% upload and showing the result
    #[arg(long, default_value = "500ms")]
    pub completion_hold: humantime::Duration,

    /// Request timeout for the upload
    #[arg(long, default_value = "60s")]
    pub timeout: humantime::Duration,
}

impl Cli {
    fn is_one_shot(&self) -> bool {
        self.json || self.text
    }
}

/// Build a `ClientConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> ClientConfig {
    ClientConfig {
        server_url: args.server.clone(),
        completion_hold: Duration::from(args.completion_hold),
        request_timeout: Duration::from(args.timeout),
        user_agent: format!("lungscan-cli/{}", env!("CARGO_PKG_VERSION")),
    }
}

/// Whether logs may go to stderr. The TUI owns the terminal, so only one-shot
/// modes (or builds without the TUI) log.
pub fn wants_stderr_logging(args: &Cli) -> bool {
    args.is_one_shot() || cfg!(not(feature = "tui"))
}

pub async fn run(args: Cli) -> Result<()> {
    if args.is_one_shot() {
        let image = args
            .image
            .clone()
            .context("an IMAGE path is required with --json or --text")?;
        return run_one_shot(&args, image).await;
    }

    #[cfg(feature = "tui")]
    {
        crate::tui::run(args).await
    }
    #[cfg(not(feature = "tui"))]
    {
        // Fallback when built without TUI support.
        let image = args
            .image
            .clone()
            .context("an IMAGE path is required when built without the TUI")?;
        run_one_shot(&args, image).await
    }
}

/// JSON document printed by `--json`.
#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    timestamp_utc: String,
    server: &'a str,
    #[serde(flatten)]
    session: &'a SessionSnapshot,
}

/// Run a single attempt for `image` and print the outcome.
async fn run_one_shot(args: &Cli, image: PathBuf) -> Result<()> {
    let cfg = build_config(args);
    let (out_tx, out_handle) = spawn_output_writer();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<AppEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    let controller = tokio::spawn(orchestrator::run_controller(cfg, event_tx, cmd_rx));

    let _ = cmd_tx.send(UiCommand::SelectFile(FileHandle::from_path(
        image,
        IntakeSource::Picker,
    )));

    let mut last_percent: Option<u8> = None;
    let mut finished: Option<SessionSnapshot> = None;
    while let Some(ev) = event_rx.recv().await {
        match ev {
            AppEvent::Info(info) => {
                if args.text {
                    let _ = out_tx.send(OutputLine::Stderr(info.to_message()));
                }
            }
            AppEvent::Snapshot(snapshot) => {
                if args.text
                    && snapshot.phase == Phase::Processing
                    && last_percent != Some(snapshot.upload_percent)
                {
                    last_percent = Some(snapshot.upload_percent);
                    let _ = out_tx.send(OutputLine::Stderr(format!(
                        "Analyzing... {}%",
                        snapshot.upload_percent
                    )));
                }
                if snapshot.is_terminal() {
                    finished = Some(*snapshot);
                    let _ = cmd_tx.send(UiCommand::Quit);
                }
            }
        }
    }

    controller
        .await
        .context("controller task failed")?
        .context("scan controller failed")?;
    let snapshot = finished.context("scan ended without a result")?;

    let outcome = if args.json {
        let report = JsonReport {
            timestamp_utc: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| "now".into()),
            server: &args.server,
            session: &snapshot,
        };
        let out = serde_json::to_string_pretty(&report)?;
        let _ = out_tx.send(OutputLine::Stdout(out));
        match snapshot.error_message.as_deref() {
            Some(msg) => Err(anyhow::anyhow!("{msg}")),
            None => Ok(()),
        }
    } else {
        crate::text_summary::build_text_summary(&snapshot).map(|summary| {
            for line in summary.lines {
                let _ = out_tx.send(OutputLine::Stdout(line));
            }
        })
    };

    drop(out_tx);
    let _ = out_handle.await;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_local_backend() {
        let args = Cli::parse_from(["lungscan"]);
        let cfg = build_config(&args);
        assert_eq!(cfg.predict_url(), "http://127.0.0.1:5000/predict");
        assert_eq!(cfg.completion_hold, Duration::from_millis(500));
        assert_eq!(cfg.request_timeout, Duration::from_secs(60));
        assert!(cfg.user_agent.starts_with("lungscan-cli/"));
    }

    #[test]
    fn durations_and_server_are_configurable() {
        let args = Cli::parse_from([
            "lungscan",
            "--server",
            "http://scan.local:8080/",
            "--completion-hold",
            "1s",
            "--text",
            "scan.png",
        ]);
        let cfg = build_config(&args);
        assert_eq!(cfg.predict_url(), "http://scan.local:8080/predict");
        assert_eq!(cfg.completion_hold, Duration::from_secs(1));
        assert_eq!(args.image.as_deref(), Some(std::path::Path::new("scan.png")));
        assert!(wants_stderr_logging(&args));
    }

    #[test]
    fn json_and_text_conflict() {
        assert!(Cli::try_parse_from(["lungscan", "--json", "--text", "a.png"]).is_err());
    }

    #[tokio::test]
    async fn one_shot_requires_image() {
        let args = Cli::parse_from(["lungscan", "--json"]);
        let err = run(args).await.unwrap_err();
        assert!(err.to_string().contains("IMAGE"));
    }

    #[tokio::test]
    async fn one_shot_rejects_text_file_with_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "not an image").unwrap();
        let args = Cli::parse_from([
            "lungscan",
            "--text",
            "--server",
            "http://127.0.0.1:9",
            path.to_str().unwrap(),
        ]);
        let err = run(args).await.unwrap_err();
        assert_eq!(err.to_string(), "Please upload an image file");
    }
}
