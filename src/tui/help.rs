use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

fn key_line(key: &'static str, pad: usize, desc: &'static str) -> Line<'static> {
    Line::from(vec![
        Span::raw("  "),
        Span::styled(key, Style::default().fg(Color::Magenta)),
        Span::raw(" ".repeat(pad)),
        Span::raw(desc),
    ])
}

pub fn draw_help(area: Rect, f: &mut Frame) {
    let p = Paragraph::new(vec![
        Line::from("Keybinds:"),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("q", Style::default().fg(Color::Magenta)),
            Span::raw(" / "),
            Span::styled("Ctrl-C", Style::default().fg(Color::Magenta)),
            Span::raw("  Quit"),
        ]),
        key_line("o", 11, "Browse: type the path of a scan image"),
        key_line("paste", 7, "Drop: paste or drag a file into the terminal"),
        key_line("x", 11, "Remove image"),
        key_line("n", 11, "Upload new image (after results)"),
        key_line("?", 11, "Show this help"),
        Line::from(""),
        Line::from("Path prompt:"),
        key_line("Enter", 7, "Analyze"),
        key_line("Esc", 9, "Cancel"),
        Line::from(""),
        Line::from("About:"),
        Line::from(
            "  A deep learning model trained on CT scan images flags suspicious \
             patterns and gives a probability score for each class.",
        ),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("Note:", Style::default().fg(Color::Yellow)),
            Span::raw(
                " This tool assists medical professionals and is not a replacement \
                 for professional medical advice.",
            ),
        ]),
    ])
    .wrap(Wrap { trim: false })
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}
