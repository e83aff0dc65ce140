use crossterm::event::{KeyCode, KeyEvent};
use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Borders, HighlightSpacing, List, ListItem, ListState, Paragraph};

use super::{confirm_answer, draw_confirm, draw_status};
use crate::jobs::Job;
use crate::{Ui, View};

impl Ui {
    pub(crate) fn handle_categories_key(&mut self, key: KeyEvent) -> bool {
        let epoch = self.ctx.epoch();
        let View::Categories(state) = &mut self.view else {
            return false;
        };

        if state.confirm_delete.is_some() {
            if let Some(answer) = confirm_answer(key)
                && let Some(name) = state.answer_confirm(answer)
            {
                self.jobs.spawn(epoch, Job::DeleteCategory(name));
            }
            return true;
        }

        let mut route = None;
        match key.code {
            KeyCode::Down | KeyCode::Char('j') => state.select_next(),
            KeyCode::Up | KeyCode::Char('k') => state.select_prev(),
            KeyCode::Enter => route = state.route_for_selected(),
            KeyCode::Char('d') => {
                state.request_delete();
            }
            KeyCode::Char('r') => {
                state.begin_fetch();
                self.jobs.spawn(epoch, Job::Categories);
            }
            _ => return false,
        }
        if let Some(route) = route {
            self.navigate(route);
        }
        true
    }

    pub(crate) fn draw_categories(&mut self, area: Rect, frame: &mut Frame) {
        let highlight = self.highlight_style();
        let accent = self.accent_color();
        let View::Categories(state) = &self.view else {
            return;
        };

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(0),
                Constraint::Length(if state.notice.is_some() { 1 } else { 0 }),
            ])
            .split(area);

        let block = Block::default().borders(Borders::ALL).title("Etiquetas");
        if let Some(message) = state.status_message() {
            let style = if state.error.is_some() {
                Style::default().fg(Color::Red)
            } else {
                Style::default().fg(Color::Gray)
            };
            let inner = block.inner(layout[0]);
            frame.render_widget(block, layout[0]);
            draw_status(frame, inner, message, style);
        } else {
            let items: Vec<ListItem> = state
                .categories
                .iter()
                .map(|name| ListItem::new(Line::raw(name.clone())))
                .collect();
            let list = List::new(items)
                .block(block)
                .highlight_style(highlight)
                .highlight_symbol("> ")
                .highlight_spacing(HighlightSpacing::Always);
            let mut list_state = ListState::default();
            list_state.select(Some(state.selected));
            frame.render_stateful_widget(list, layout[0], &mut list_state);
        }

        if let Some(notice) = state.notice.as_deref() {
            frame.render_widget(
                Paragraph::new(notice.to_string()).style(Style::default().fg(accent)),
                layout[1],
            );
        }

        if let Some(prompt) = state.confirm_prompt() {
            draw_confirm(frame, area, &prompt, accent);
        }
    }
}
