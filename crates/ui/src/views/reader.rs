use crossterm::event::{KeyCode, KeyEvent};
use libreria_application::reader::ReaderState;
use libreria_engine::{EpubBook, Pagination};
use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Text};
use ratatui::widgets::{Block, Borders, Paragraph};

use super::draw_status;
use crate::{Ui, View};

pub(crate) struct ReaderPanel {
    pub state: ReaderState,
    book: Option<EpubBook>,
    /// Pages for the last drawn text area.
    layout: Option<(u16, u16, Pagination)>,
}

impl ReaderPanel {
    pub(crate) fn new(state: ReaderState) -> Self {
        Self {
            state,
            book: None,
            layout: None,
        }
    }

    pub(crate) fn finish_load(&mut self, result: Result<EpubBook, String>) {
        match result {
            Ok(book) => {
                let title = book.title.clone().unwrap_or_default();
                self.book = Some(book);
                self.layout = None;
                self.state.finish_load(Ok(title));
            }
            Err(reason) => self.state.finish_load(Err(reason)),
        }
    }

    fn page_counts(&self) -> Vec<usize> {
        self.layout
            .as_ref()
            .map(|(_, _, pagination)| pagination.page_counts())
            .unwrap_or_default()
    }

    /// Repaginates when the text area changed size.
    fn ensure_layout(&mut self, width: u16, height: u16) {
        let Some(book) = self.book.as_ref() else {
            return;
        };
        if matches!(self.layout, Some((w, h, _)) if w == width && h == height) {
            return;
        }
        tracing::debug!(width, height, "repaginating book");
        let pagination = book.paginate(usize::from(width), usize::from(height));
        self.state.clamp(&pagination.page_counts());
        self.layout = Some((width, height, pagination));
    }
}

impl Ui {
    pub(crate) fn handle_reader_key(&mut self, key: KeyEvent) -> bool {
        let View::Reader(panel) = &mut self.view else {
            return false;
        };
        let counts = panel.page_counts();
        match key.code {
            KeyCode::Right | KeyCode::PageDown | KeyCode::Char(' ') | KeyCode::Char('l') => {
                panel.state.next_page(&counts);
            }
            KeyCode::Left | KeyCode::PageUp | KeyCode::Char('h') => {
                panel.state.prev_page(&counts);
            }
            KeyCode::Char(']') => {
                panel.state.next_chapter(&counts);
            }
            KeyCode::Char('[') => {
                panel.state.prev_chapter();
            }
            _ => return false,
        }
        true
    }

    pub(crate) fn draw_reader(&mut self, area: Rect, frame: &mut Frame) {
        let accent = self.accent_color();
        let View::Reader(panel) = &mut self.view else {
            return;
        };

        let title = panel
            .state
            .title
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Lector".to_string());
        let block = Block::default()
            .borders(Borders::ALL)
            .title(title)
            .title_style(Style::default().fg(accent).add_modifier(Modifier::BOLD));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        if let Some(message) = panel.state.status_message() {
            let style = if panel.state.error.is_some() {
                Style::default().fg(Color::Red)
            } else {
                Style::default().fg(Color::Gray)
            };
            draw_status(frame, inner, message, style);
            return;
        }

        let sections = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(1)])
            .split(inner);
        let text_area = Rect {
            x: sections[0].x + 1,
            width: sections[0].width.saturating_sub(2),
            ..sections[0]
        };
        panel.ensure_layout(text_area.width, text_area.height);

        let position = panel.state.position;
        let counts = panel.page_counts();
        let lines: Vec<Line> = panel
            .layout
            .as_ref()
            .and_then(|(_, _, pagination)| pagination.page(position.chapter, position.page))
            .map(|page| page.lines.iter().map(|l| Line::raw(l.clone())).collect())
            .unwrap_or_default();
        frame.render_widget(Paragraph::new(Text::from(lines)), text_area);

        let (current, total) = panel.state.progress(&counts);
        let status = format!(
            "Capítulo {}/{}  ·  Página {current}/{total}",
            position.chapter + 1,
            counts.len()
        );
        frame.render_widget(
            Paragraph::new(status)
                .alignment(Alignment::Center)
                .style(Style::default().fg(Color::Gray)),
            sections[1],
        );
    }
}
