use crossterm::event::{KeyCode, KeyEvent};
use libreria_application::upload::{ACCEPTED_EXTENSIONS, UploadQueue};
use libreria_core::{NavEntry, UploadStatus};
use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, HighlightSpacing, List, ListItem, ListState, Paragraph, Wrap};

use super::draw_status;
use crate::jobs::Job;
use crate::{Ui, View};

pub(crate) fn key_hints(queue: &UploadQueue) -> Vec<(&'static str, &'static str)> {
    let mut hints = vec![("f", "elegir archivos")];
    if queue.can_start() {
        hints.push(("Enter", "subir"));
    }
    if queue.all_done() {
        hints.push(("b", "ir a la biblioteca"));
    }
    hints
}

fn status_style(status: UploadStatus) -> Style {
    match status {
        UploadStatus::Pending => Style::default().fg(Color::Gray),
        UploadStatus::Uploading => Style::default().fg(Color::Yellow),
        UploadStatus::Success => Style::default().fg(Color::Green),
        UploadStatus::Error => Style::default().fg(Color::Red),
    }
}

fn status_label(status: UploadStatus) -> &'static str {
    match status {
        UploadStatus::Pending => "Pendiente",
        UploadStatus::Uploading => "Subiendo",
        UploadStatus::Success => "Completado",
        UploadStatus::Error => "Error",
    }
}

impl Ui {
    pub(crate) fn handle_upload_key(&mut self, key: KeyEvent) -> bool {
        let epoch = self.ctx.epoch();
        let View::Upload(queue) = &mut self.view else {
            return false;
        };
        let mut go_library = false;
        match key.code {
            KeyCode::Char('f') | KeyCode::Char('o') => {
                self.open_browser("Selecciona libros", ACCEPTED_EXTENSIONS, true);
                return true;
            }
            KeyCode::Enter | KeyCode::Char('u') => {
                if let Some((index, path)) = queue.start() {
                    self.jobs.spawn(epoch, Job::Upload { index, path });
                }
            }
            KeyCode::Down | KeyCode::Char('j') => queue.select_next(),
            KeyCode::Up | KeyCode::Char('k') => queue.select_prev(),
            KeyCode::Char('b') if queue.all_done() => go_library = true,
            _ => return false,
        }
        if go_library {
            self.navigate(NavEntry::Library.route());
        }
        true
    }

    pub(crate) fn draw_upload(&mut self, area: Rect, frame: &mut Frame) {
        let highlight = self.highlight_style();
        let accent = self.accent_color();
        let View::Upload(queue) = &self.view else {
            return;
        };

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(4), Constraint::Min(0)])
            .split(area);

        let intro = Text::from(vec![
            Line::raw("Pulsa f para elegir archivos o arrástralos a la terminal."),
            Line::styled(
                "Formatos admitidos: PDF y EPUB. Se suben de uno en uno.",
                Style::default().fg(Color::Gray),
            ),
        ]);
        frame.render_widget(
            Paragraph::new(intro)
                .wrap(Wrap { trim: true })
                .block(Block::default().borders(Borders::ALL).title("Añadir Libro")),
            layout[0],
        );

        if queue.items.is_empty() {
            draw_status(
                frame,
                layout[1],
                "No hay archivos seleccionados.",
                Style::default().fg(Color::Gray),
            );
            return;
        }

        let items: Vec<ListItem> = queue
            .items
            .iter()
            .map(|item| {
                let mut lines = vec![Line::from(vec![
                    Span::styled(item.name.clone(), Style::default().add_modifier(Modifier::BOLD)),
                    Span::raw("  "),
                    Span::styled(status_label(item.status), status_style(item.status)),
                ])];
                if !item.message.is_empty() {
                    lines.push(Line::styled(
                        format!("  {}", item.message),
                        status_style(item.status),
                    ));
                }
                ListItem::new(lines)
            })
            .collect();

        let title = if queue.all_done() {
            "Cola de subida · terminado"
        } else {
            "Cola de subida"
        };
        let list = List::new(items)
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(if queue.is_running() {
                        Style::default().fg(accent)
                    } else {
                        Style::default()
                    })
                    .title(title),
            )
            .highlight_style(highlight)
            .highlight_symbol("> ")
            .highlight_spacing(HighlightSpacing::Always);
        let mut state = ListState::default();
        state.select(Some(queue.selected));
        frame.render_stateful_widget(list, layout[1], &mut state);
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn hints_follow_queue_state() {
        let mut queue = UploadQueue::new();
        assert_eq!(key_hints(&queue), vec![("f", "elegir archivos")]);

        queue.add_files([PathBuf::from("/a.pdf")]);
        assert!(key_hints(&queue).contains(&("Enter", "subir")));

        let (index, _) = queue.start().expect("first item");
        assert!(!key_hints(&queue).contains(&("Enter", "subir")));
        queue.complete(index, Ok("A".to_string()));
        queue.advance();
        assert!(key_hints(&queue).contains(&("b", "ir a la biblioteca")));
    }
}
