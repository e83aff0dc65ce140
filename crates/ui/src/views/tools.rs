use crossterm::event::{KeyCode, KeyEvent};
use libreria_application::tools::{
    ACCEPTED_EXTENSIONS, MSG_CONNECTION, MSG_DOWNLOAD_FAILED, MSG_FALLBACK, MSG_NO_FILE,
    MSG_NOT_EPUB,
};
use libreria_core::file_name;
use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

use crate::jobs::Job;
use crate::{Ui, View};

fn is_error(message: &str) -> bool {
    message.starts_with("Error")
        || [
            MSG_CONNECTION,
            MSG_DOWNLOAD_FAILED,
            MSG_FALLBACK,
            MSG_NO_FILE,
            MSG_NOT_EPUB,
        ].contains(&message)
}

impl Ui {
    pub(crate) fn handle_tools_key(&mut self, key: KeyEvent) -> bool {
        let epoch = self.ctx.epoch();
        let View::Tools(tool) = &mut self.view else {
            return false;
        };
        match key.code {
            KeyCode::Char('f') | KeyCode::Char('o') => {
                self.open_browser("Selecciona un EPUB", ACCEPTED_EXTENSIONS, false);
            }
            KeyCode::Enter | KeyCode::Char('c') => {
                if let Some(path) = tool.begin_convert() {
                    self.jobs.spawn(epoch, Job::Convert(path));
                }
            }
            _ => return false,
        }
        true
    }

    pub(crate) fn draw_tools(&mut self, area: Rect, frame: &mut Frame) {
        let accent = self.accent_color();
        let download_dir = self.ctx.download_dir();
        let View::Tools(tool) = &self.view else {
            return;
        };

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(12), Constraint::Min(0)])
            .split(area);

        let bold = Style::default().add_modifier(Modifier::BOLD);
        let selected = match tool.selected_file.as_deref() {
            Some(path) => Span::raw(file_name(path)),
            None => Span::styled("ningún archivo", Style::default().fg(Color::Gray)),
        };
        let mut lines = vec![
            Line::styled("Convertidor de EPUB a PDF", bold),
            Line::raw(""),
            Line::raw("Sube un archivo EPUB para convertirlo a PDF."),
            Line::styled(
                format!("El PDF se guarda en {}", download_dir.display()),
                Style::default().fg(Color::Gray),
            ),
            Line::raw(""),
            Line::from(vec![Span::styled("Archivo: ", bold), selected]),
            Line::raw(""),
        ];
        let button = if tool.loading {
            "Convirtiendo..."
        } else {
            "Convertir a PDF"
        };
        lines.push(Line::from(vec![
            Span::styled("Enter", bold),
            Span::styled(format!(" {button}"), Style::default().fg(accent)),
        ]));
        if let Some(message) = tool.message.as_deref() {
            let style = if is_error(message) {
                Style::default().fg(Color::Red)
            } else {
                Style::default().fg(accent)
            };
            lines.push(Line::raw(""));
            lines.push(Line::styled(message.to_string(), style));
        }

        frame.render_widget(
            Paragraph::new(Text::from(lines))
                .wrap(Wrap { trim: true })
                .block(Block::default().borders(Borders::ALL).title("Herramientas")),
            layout[0],
        );
    }
}
