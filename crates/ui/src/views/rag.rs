use crossterm::event::{KeyCode, KeyEvent};
use libreria_application::rag::{ACCEPTED_EXTENSIONS, RagSession};
use libreria_core::{Sender, file_name};
use libreria_engine::wrap_preserving_paragraphs;
use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

use super::{input_line, typed_char};
use crate::jobs::Job;
use crate::{Ui, View};

pub(crate) struct RagPanel {
    pub session: RagSession,
    pub query_focused: bool,
    /// Lines scrolled up from the bottom of the conversation.
    pub scroll_back: u16,
}

impl RagPanel {
    pub(crate) fn new(session: RagSession) -> Self {
        Self {
            session,
            query_focused: false,
            scroll_back: 0,
        }
    }

    pub(crate) fn key_hints(&self) -> Vec<(&'static str, &'static str)> {
        if self.query_focused {
            return vec![("Enter", "enviar"), ("Esc", "salir del campo")];
        }
        let mut hints = vec![("f", "elegir libro"), ("u", "procesar")];
        if self.session.can_query() {
            hints.push(("/", "preguntar"));
        }
        hints.push(("PgUp/PgDn", "desplazar"));
        hints
    }
}

/// Conversation pre-wrapped to `width` so the view can scroll by line.
fn conversation_lines(session: &RagSession, accent: Color, width: usize) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for message in &session.history {
        let style = match message.sender {
            Sender::User => Style::default().fg(accent).add_modifier(Modifier::BOLD),
            Sender::Assistant => Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        };
        lines.push(Line::styled(format!("{}:", message.sender.label()), style));
        for text_line in wrap_preserving_paragraphs(&message.text, width) {
            lines.push(Line::raw(text_line));
        }
        lines.push(Line::raw(""));
    }
    if session.loading && session.book_id().is_some() {
        lines.push(Line::styled(
            "Gemini está pensando...",
            Style::default().fg(Color::Gray),
        ));
    }
    lines
}

impl Ui {
    pub(crate) fn handle_rag_key(&mut self, key: KeyEvent) -> bool {
        let epoch = self.ctx.epoch();
        let View::Rag(panel) = &mut self.view else {
            return false;
        };

        if panel.query_focused {
            match key.code {
                KeyCode::Esc => panel.query_focused = false,
                KeyCode::Enter => {
                    if let Some(request) = panel.session.begin_query() {
                        panel.scroll_back = 0;
                        self.jobs.spawn(
                            epoch,
                            Job::RagQuery {
                                query: request.query,
                                book_id: request.book_id,
                            },
                        );
                    }
                }
                KeyCode::Backspace => {
                    panel.session.query.pop();
                }
                _ => {
                    if let Some(c) = typed_char(key) {
                        panel.session.query.push(c);
                    }
                }
            }
            return true;
        }

        match key.code {
            KeyCode::Char('f') | KeyCode::Char('o') => {
                self.open_browser("Selecciona un libro", ACCEPTED_EXTENSIONS, false);
            }
            KeyCode::Char('u') | KeyCode::Enter => {
                if let Some(path) = panel.session.begin_upload() {
                    self.jobs.spawn(epoch, Job::RagUpload(path));
                }
            }
            KeyCode::Char('/') | KeyCode::Char('i') if panel.session.can_query() => {
                panel.query_focused = true;
            }
            KeyCode::PageUp => panel.scroll_back = panel.scroll_back.saturating_add(5),
            KeyCode::PageDown => panel.scroll_back = panel.scroll_back.saturating_sub(5),
            _ => return false,
        }
        true
    }

    pub(crate) fn draw_rag(&mut self, area: Rect, frame: &mut Frame) {
        let accent = self.accent_color();
        let View::Rag(panel) = &self.view else {
            return;
        };
        let session = &panel.session;

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(5),
                Constraint::Min(3),
                Constraint::Length(3),
            ])
            .split(area);

        let bold = Style::default().add_modifier(Modifier::BOLD);
        let selected = match session.selected_file.as_deref() {
            Some(path) => Span::raw(file_name(path)),
            None => Span::styled("ningún archivo", Style::default().fg(Color::Gray)),
        };
        let mut upload_lines = vec![Line::from(vec![
            Span::styled("Libro: ", bold),
            selected,
            Span::raw("   "),
            Span::styled("u", bold),
            Span::raw(if session.loading && session.book_id().is_none() {
                " Procesando..."
            } else {
                " Procesar libro"
            }),
        ])];
        if let Some(message) = session.message.as_deref() {
            let style = if message.starts_with("Error") || message.starts_with("Por favor") {
                Style::default().fg(Color::Red)
            } else {
                Style::default().fg(accent)
            };
            upload_lines.push(Line::styled(message.to_string(), style));
        }
        frame.render_widget(
            Paragraph::new(Text::from(upload_lines))
                .wrap(Wrap { trim: true })
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .title("Charla sobre libros con la IA"),
                ),
            layout[0],
        );

        let block = Block::default().borders(Borders::ALL).title("Conversación");
        let inner = block.inner(layout[1]);
        let conversation = conversation_lines(session, accent, usize::from(inner.width));
        let total = u16::try_from(conversation.len()).unwrap_or(u16::MAX);
        let bottom = total.saturating_sub(inner.height);
        let offset = bottom.saturating_sub(panel.scroll_back);
        frame.render_widget(
            Paragraph::new(Text::from(conversation))
                .block(block)
                .scroll((offset, 0)),
            layout[1],
        );

        let input = if session.can_query() || session.loading {
            input_line("Pregunta", &session.query, panel.query_focused, accent)
        } else {
            Line::styled(
                "Procesa un libro para empezar a preguntar.",
                Style::default().fg(Color::Gray),
            )
        };
        frame.render_widget(
            Paragraph::new(input).block(Block::default().borders(Borders::ALL)),
            layout[2],
        );
    }
}
