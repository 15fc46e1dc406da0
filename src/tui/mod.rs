mod help;
mod state;

use crate::cli::{build_config, Cli};
use crate::intake::{FileHandle, IntakeSource};
use crate::model::{format_percent, Prediction};
use crate::orchestrator::{AppEvent, Controller, UiCommand};
use crate::session::Phase;
use anyhow::{Context, Result};
use crossterm::{
    event::{
        self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyCode, KeyEvent,
        KeyEventKind, KeyModifiers,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph, Wrap},
    Terminal,
};
use state::{UiAction, UiState};
use std::{io, time::Duration, time::Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

pub async fn run(args: Cli) -> Result<()> {
    // Unbounded channels avoid backpressure between the controller and the render loop.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<AppEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    // Build the controller before taking over the terminal so config errors print normally.
    let controller = Controller::new(build_config(&args), event_tx)?;

    if let Some(image) = args.image.clone() {
        let _ = cmd_tx.send(UiCommand::SelectFile(FileHandle::from_path(
            image,
            IntakeSource::Picker,
        )));
    }

    // TUI runs in a dedicated thread to keep all blocking I/O out of the Tokio runtime.
    let server = args.server.clone();
    let ui_handle = std::thread::spawn(move || run_threaded(server, event_rx, cmd_tx));

    let res = controller.run(cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Run the TUI loop on a dedicated thread.
fn run_threaded(
    server: String,
    mut event_rx: UnboundedReceiver<AppEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = match Terminal::new(backend) {
        Ok(t) => t,
        Err(e) => {
            restore_terminal();
            return Err(e).context("create terminal");
        }
    };
    terminal.clear().ok();

    // UiState is owned by the UI thread only; the session itself lives in the controller.
    let mut state = UiState {
        server,
        ..Default::default()
    };

    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    let res = 'ui: loop {
        // Drain events without blocking to keep the UI responsive.
        loop {
            match event_rx.try_recv() {
                Ok(ev) => state.apply_event(ev),
                Err(TryRecvError::Empty) => break,
                // Controller is gone; nothing left to render.
                Err(TryRecvError::Disconnected) => break 'ui Ok(()),
            }
        }

        if last_tick.elapsed() >= tick_rate {
            terminal.draw(|f| draw(f.area(), f, &state)).ok();
            last_tick = Instant::now();
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            let action = match event::read() {
                Ok(Event::Key(k)) if k.kind == KeyEventKind::Press => handle_key(&mut state, k),
                Ok(Event::Paste(text)) => state.on_paste(&text),
                _ => UiAction::None,
            };
            match action {
                UiAction::None => {}
                UiAction::Send(cmd) => {
                    let _ = cmd_tx.send(cmd);
                }
                UiAction::Quit => {
                    let _ = cmd_tx.send(UiCommand::Quit);
                    break Ok(());
                }
            }
        }
    };

    restore_terminal();
    res
}

fn restore_terminal() {
    disable_raw_mode().ok();
    let mut stdout = io::stdout();
    execute!(stdout, DisableBracketedPaste, LeaveAlternateScreen).ok();
}

fn handle_key(state: &mut UiState, k: KeyEvent) -> UiAction {
    if k.modifiers.contains(KeyModifiers::CONTROL) && k.code == KeyCode::Char('c') {
        return UiAction::Quit;
    }

    // Path prompt captures all other keys while open.
    if state.path_input.is_some() {
        match k.code {
            KeyCode::Enter => return state.submit_picker(),
            KeyCode::Esc => state.cancel_picker(),
            KeyCode::Backspace => state.backspace_picker(),
            KeyCode::Char(c) => state.type_into_picker(c.encode_utf8(&mut [0; 4])),
            _ => {}
        }
        return UiAction::None;
    }

    match k.code {
        KeyCode::Char('q') => UiAction::Quit,
        KeyCode::Char('o') | KeyCode::Enter => {
            state.show_help = false;
            state.open_picker();
            UiAction::None
        }
        KeyCode::Char('x') => state.remove_image(),
        KeyCode::Char('n') => state.upload_new(),
        KeyCode::Char('?') => {
            state.show_help = !state.show_help;
            UiAction::None
        }
        KeyCode::Esc => {
            state.show_help = false;
            UiAction::None
        }
        _ => UiAction::None,
    }
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(3),
            ]
            .as_ref(),
        )
        .split(area);

    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            "LungScan AI",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw("  Advanced Lung Cancer Detection  "),
        Span::styled(
            format!("server: {}", state.server),
            Style::default().fg(Color::Gray),
        ),
    ]))
    .block(Block::default().borders(Borders::ALL).title("lungscan"));
    f.render_widget(header, chunks[0]);

    if state.show_help {
        help::draw_help(chunks[1], f);
    } else {
        draw_main(chunks[1], f, state);
    }

    draw_status(chunks[2], f, state);
}

fn draw_main(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let snap = &state.snapshot;
    let error_height = if snap.error_message.is_some() { 3 } else { 0 };
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(9),
                Constraint::Length(error_height),
                Constraint::Min(0),
            ]
            .as_ref(),
        )
        .split(area);

    draw_upload_card(rows[0], f, state);

    if let Some(msg) = snap.error_message.as_deref() {
        let banner = Paragraph::new(Line::from(vec![
            Span::styled(
                "! ",
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            ),
            Span::styled(msg.to_string(), Style::default().fg(Color::Red)),
        ]))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Red)),
        );
        f.render_widget(banner, rows[1]);
    }

    match (snap.phase, snap.result.as_ref()) {
        (Phase::Complete, Some(p)) => draw_results(rows[2], f, p),
        _ => {
            let about = Paragraph::new(vec![
                Line::from(
                    "A deep learning model trained on CT scan images looks for early signs \
                     of lung cancer and reports a probability for each class.",
                ),
                Line::from(""),
                Line::from(Span::styled(
                    "Note: assists medical professionals; not a replacement for \
                     professional medical advice.",
                    Style::default().fg(Color::Yellow),
                )),
            ])
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).title("About"));
            f.render_widget(about, rows[2]);
        }
    }
}

fn draw_upload_card(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let snap = &state.snapshot;
    let border = if state.drop_zone.drag_active {
        Color::Yellow
    } else {
        Color::Gray
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Upload CT Scan Image")
        .border_style(Style::default().fg(border));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let mut lines: Vec<Line> = Vec::new();
    match snap.selected_file.as_ref() {
        None => {
            lines.push(Line::from(
                "Drag and drop your lung CT scan image (or paste its path)",
            ));
            lines.push(Line::from(vec![
                Span::raw("or press "),
                Span::styled("o", Style::default().fg(Color::Magenta)),
                Span::raw(" to browse from your computer"),
            ]));
            lines.push(Line::from(Span::styled(
                "Supported formats: JPEG, PNG, DICOM",
                Style::default().fg(Color::Gray),
            )));
        }
        Some(file) => {
            lines.push(Line::from(Span::styled(
                file.name.clone(),
                Style::default().add_modifier(Modifier::BOLD),
            )));
            let preview = match file.preview.as_ref() {
                Some(p) => format!("Preview ready ({:.1} KB)", p.bytes as f64 / 1024.0),
                None => "Loading preview...".to_string(),
            };
            lines.push(Line::from(Span::styled(
                preview,
                Style::default().fg(Color::Gray),
            )));
            lines.push(Line::from(vec![
                Span::styled("x", Style::default().fg(Color::Magenta)),
                Span::raw(" remove image"),
            ]));
        }
    }
    if let Some(input) = state.path_input.as_ref() {
        lines.push(Line::from(vec![
            Span::styled("Path: ", Style::default().fg(Color::Magenta)),
            Span::raw(input.clone()),
            Span::raw("_"),
        ]));
    }

    let gauge_height = if snap.is_processing() { 1 } else { 0 };
    let parts = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(gauge_height)].as_ref())
        .split(inner);

    f.render_widget(Paragraph::new(lines), parts[0]);

    if snap.is_processing() {
        let gauge = Gauge::default()
            .gauge_style(Style::default().fg(Color::Green))
            .percent(u16::from(snap.upload_percent.min(100)))
            .label(format!("Analyzing... {}%", snap.upload_percent));
        f.render_widget(gauge, parts[1]);
    }
}

fn draw_results(area: Rect, f: &mut ratatui::Frame, p: &Prediction) {
    let verdict_color = if p.is_normal { Color::Green } else { Color::Red };
    let mut lines = vec![
        Line::from(vec![
            Span::styled("Analysis Result: ", Style::default().fg(Color::Gray)),
            Span::styled(
                p.headline(),
                Style::default()
                    .fg(verdict_color)
                    .add_modifier(Modifier::BOLD),
            ),
        ]),
        Line::from(""),
        Line::from(vec![
            Span::styled("Confidence: ", Style::default().fg(Color::Gray)),
            Span::raw(format_percent(p.confidence_score)),
            Span::raw("    "),
            Span::styled("Scan Quality: ", Style::default().fg(Color::Gray)),
            Span::raw(p.quality_bucket.as_str()),
        ]),
        Line::from(""),
        Line::from("Detailed Analysis"),
    ];
    for s in &p.per_class_scores {
        lines.push(Line::from(vec![
            Span::raw("  "),
            Span::styled(
                format!("{}:", s.display_name),
                Style::default().fg(Color::Gray),
            ),
            Span::raw(" "),
            Span::raw(format_percent(s.score)),
        ]));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(p.medical_note()));
    lines.push(Line::from(vec![
        Span::raw("Press "),
        Span::styled("n", Style::default().fg(Color::Magenta)),
        Span::raw(" to upload a new image"),
    ]));

    let card = Paragraph::new(lines).wrap(Wrap { trim: false }).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Processing Complete")
            .border_style(Style::default().fg(verdict_color)),
    );
    f.render_widget(card, area);
}

fn draw_status(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let mut spans = vec![Span::styled(
        state.status_label(),
        Style::default().fg(Color::Yellow),
    )];
    if !state.info.is_empty() {
        spans.push(Span::raw(" | "));
        spans.push(Span::raw(state.info.clone()));
    }
    spans.push(Span::styled(
        "   o browse  paste drop  x remove  ? help  q quit",
        Style::default().fg(Color::DarkGray),
    ));
    let p = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(p, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn typed_path_is_submitted_as_picker_selection() {
        let mut state = UiState::default();
        assert!(matches!(handle_key(&mut state, key(KeyCode::Char('o'))), UiAction::None));
        for c in "/tmp/scan.pngx".chars() {
            handle_key(&mut state, key(KeyCode::Char(c)));
        }
        handle_key(&mut state, key(KeyCode::Backspace));
        match handle_key(&mut state, key(KeyCode::Enter)) {
            UiAction::Send(UiCommand::SelectFile(h)) => {
                assert_eq!(h.name, "scan.png");
                assert_eq!(h.source, IntakeSource::Picker);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn q_in_prompt_is_text_not_quit() {
        let mut state = UiState::default();
        handle_key(&mut state, key(KeyCode::Char('o')));
        assert!(matches!(handle_key(&mut state, key(KeyCode::Char('q'))), UiAction::None));
        assert_eq!(state.path_input.as_deref(), Some("q"));
        handle_key(&mut state, key(KeyCode::Esc));
        assert!(state.path_input.is_none());
        assert!(matches!(handle_key(&mut state, key(KeyCode::Char('q'))), UiAction::Quit));
    }

    #[test]
    fn ctrl_c_always_quits() {
        let mut state = UiState::default();
        handle_key(&mut state, key(KeyCode::Char('o')));
        let ev = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert!(matches!(handle_key(&mut state, ev), UiAction::Quit));
    }

    #[test]
    fn restore_terminal_is_safe_to_repeat() {
        // Used on both the setup-failure path and normal exit.
        restore_terminal();
        restore_terminal();
    }

    #[test]
    fn prompt_keys_toggle_highlight() {
        let mut state = UiState::default();
        handle_key(&mut state, key(KeyCode::Char('o')));
        assert!(state.drop_zone.drag_active);
        handle_key(&mut state, key(KeyCode::Char('a')));
        assert!(state.drop_zone.drag_active);
        handle_key(&mut state, key(KeyCode::Esc));
        assert!(!state.drop_zone.drag_active);
    }

    #[test]
    fn help_toggles() {
        let mut state = UiState::default();
        handle_key(&mut state, key(KeyCode::Char('?')));
        assert!(state.show_help);
        handle_key(&mut state, key(KeyCode::Esc));
        assert!(!state.show_help);
    }
}
