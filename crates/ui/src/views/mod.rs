//! One module per route. Each adds its key handler and draw function to `Ui`.

pub(crate) mod categories;
pub(crate) mod library;
pub(crate) mod rag;
pub(crate) mod reader;
pub(crate) mod settings;
pub(crate) mod tools;
pub(crate) mod upload;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::Frame;
use ratatui::layout::{Alignment, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};

use crate::centered_rect;

/// Answer to a yes/no popup, if the key is one.
pub(crate) fn confirm_answer(key: KeyEvent) -> Option<bool> {
    match key.code {
        KeyCode::Char('s' | 'S' | 'y' | 'Y') | KeyCode::Enter => Some(true),
        KeyCode::Char('n' | 'N') | KeyCode::Esc => Some(false),
        _ => None,
    }
}

/// Plain character input, without Ctrl or Alt chords.
pub(crate) fn typed_char(key: KeyEvent) -> Option<char> {
    match key.code {
        KeyCode::Char(c)
            if !key
                .modifiers
                .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) =>
        {
            Some(c)
        }
        _ => None,
    }
}

pub(crate) fn draw_confirm(frame: &mut Frame, area: Rect, prompt: &str, accent: Color) {
    let popup_area = centered_rect(60, 30, area);
    frame.render_widget(Clear, popup_area);
    let text = Text::from(vec![
        Line::raw(""),
        Line::raw(prompt.to_string()),
        Line::raw(""),
        Line::from(vec![
            Span::styled("s", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" Sí   "),
            Span::styled("n", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(" No"),
        ]),
    ]);
    let popup = Paragraph::new(text)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(accent))
                .title("Confirmar"),
        );
    frame.render_widget(popup, popup_area);
}

pub(crate) fn draw_alert(frame: &mut Frame, area: Rect, message: &str) {
    let popup_area = centered_rect(60, 25, area);
    frame.render_widget(Clear, popup_area);
    let text = Text::from(vec![
        Line::raw(""),
        Line::styled(message.to_string(), Style::default().fg(Color::Red)),
        Line::raw(""),
        Line::styled(
            "Pulsa cualquier tecla para continuar",
            Style::default().fg(Color::Gray),
        ),
    ]);
    let popup = Paragraph::new(text)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Aviso"));
    frame.render_widget(popup, popup_area);
}

/// A one-line input: label, value, and a cursor when focused.
pub(crate) fn input_line(label: &str, value: &str, focused: bool, accent: Color) -> Line<'static> {
    let label_style = if focused {
        Style::default().fg(accent).add_modifier(Modifier::BOLD)
    } else {
        Style::default().add_modifier(Modifier::BOLD)
    };
    let mut spans = vec![
        Span::styled(format!("{label}: "), label_style),
        Span::raw(value.to_string()),
    ];
    if focused {
        spans.push(Span::styled("▏", Style::default().fg(accent)));
    }
    Line::from(spans)
}

/// Centered message filling `area`, used for loading, empty and error states.
pub(crate) fn draw_status(frame: &mut Frame, area: Rect, message: &str, style: Style) {
    let pad = area.height.saturating_sub(1) / 2;
    let mut lines: Vec<Line> = (0..pad).map(|_| Line::raw("")).collect();
    lines.push(Line::styled(message.to_string(), style));
    frame.render_widget(
        Paragraph::new(Text::from(lines))
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true }),
        area,
    );
}
