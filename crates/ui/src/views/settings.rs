use crossterm::event::{KeyCode, KeyEvent};
use libreria_core::{Settings, Theme};
use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Text};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};

use super::{input_line, typed_char};
use crate::{Ui, UiExit, centered_rect, key_hint_line};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SettingsRow {
    ApiUrl,
    DownloadDir,
    Theme,
}

const ROWS: [SettingsRow; 3] = [SettingsRow::ApiUrl, SettingsRow::DownloadDir, SettingsRow::Theme];

/// Draft of the persisted settings. Applied when the panel closes.
pub(crate) struct SettingsPanel {
    selected: usize,
    editing: bool,
    api_url: String,
    download_dir: String,
    theme: Theme,
}

impl SettingsPanel {
    pub(crate) fn new(settings: &Settings) -> Self {
        Self {
            selected: 0,
            editing: false,
            api_url: settings.api_url.clone(),
            download_dir: settings.download_dir.clone(),
            theme: settings.theme,
        }
    }

    fn row(&self) -> SettingsRow {
        ROWS[self.selected.min(ROWS.len() - 1)]
    }

    fn text_mut(&mut self) -> Option<&mut String> {
        match self.row() {
            SettingsRow::ApiUrl => Some(&mut self.api_url),
            SettingsRow::DownloadDir => Some(&mut self.download_dir),
            SettingsRow::Theme => None,
        }
    }

    pub(crate) fn paste(&mut self, text: &str) {
        if !self.editing {
            return;
        }
        let text = crate::single_line(text);
        if let Some(value) = self.text_mut() {
            value.push_str(text.trim());
        }
    }

    /// Returns true when the panel should close.
    fn handle_key(&mut self, key: KeyEvent) -> bool {
        if self.editing {
            match key.code {
                KeyCode::Enter | KeyCode::Esc => self.editing = false,
                KeyCode::Backspace => {
                    if let Some(value) = self.text_mut() {
                        value.pop();
                    }
                }
                _ => {
                    if let Some(c) = typed_char(key)
                        && let Some(value) = self.text_mut()
                    {
                        value.push(c);
                    }
                }
            }
            return false;
        }

        match key.code {
            KeyCode::Esc | KeyCode::Char('s') | KeyCode::Char('q') => return true,
            KeyCode::Down | KeyCode::Char('j') | KeyCode::Tab => {
                self.selected = (self.selected + 1) % ROWS.len();
            }
            KeyCode::Up | KeyCode::Char('k') | KeyCode::BackTab => {
                self.selected = (self.selected + ROWS.len() - 1) % ROWS.len();
            }
            KeyCode::Enter | KeyCode::Char(' ') | KeyCode::Left | KeyCode::Right => {
                if self.row() == SettingsRow::Theme {
                    self.theme = match self.theme {
                        Theme::Light => Theme::Dark,
                        Theme::Dark => Theme::Light,
                    };
                } else if matches!(key.code, KeyCode::Enter) {
                    self.editing = true;
                }
            }
            _ => {}
        }
        false
    }

    /// Writes the draft into `settings`; true when the saved backend URL
    /// differs from `active_url`, the one the client is talking to.
    fn apply(&self, settings: &mut Settings, active_url: &str) -> bool {
        settings.api_url = self.api_url.clone();
        settings.download_dir = self.download_dir.clone();
        settings.theme = self.theme;
        settings.normalize();
        settings.api_url != active_url
    }
}

impl Ui {
    pub(crate) fn handle_settings_key(&mut self, key: KeyEvent) -> anyhow::Result<Option<UiExit>> {
        let Some(panel) = self.settings_panel.as_mut() else {
            return Ok(None);
        };
        if !panel.handle_key(key) {
            // The theme previews as soon as it is picked.
            self.ctx.settings.theme = panel.theme;
            return Ok(None);
        }
        let reconnect = panel.apply(&mut self.ctx.settings, self.jobs.client().base_url());
        self.settings_panel = None;
        tracing::info!(
            api = %self.ctx.settings.api_url,
            theme = %self.ctx.settings.theme,
            reconnect,
            "settings updated"
        );
        Ok(reconnect.then_some(UiExit::Reconnect))
    }

    pub(crate) fn draw_settings_panel(&self, area: Rect, frame: &mut Frame) {
        let Some(panel) = self.settings_panel.as_ref() else {
            return;
        };
        let accent = self.accent_color();
        let popup_area = centered_rect(70, 50, area);
        frame.render_widget(Clear, popup_area);

        let download_dir = if panel.download_dir.is_empty() {
            self.ctx.download_dir().display().to_string()
        } else {
            panel.download_dir.clone()
        };
        let mut lines = Vec::new();
        for (i, row) in ROWS.iter().enumerate() {
            let focused = i == panel.selected;
            let (label, value) = match row {
                SettingsRow::ApiUrl => ("Servidor", panel.api_url.clone()),
                SettingsRow::DownloadDir => ("Descargas", download_dir.clone()),
                SettingsRow::Theme => (
                    "Tema",
                    match panel.theme {
                        Theme::Light => "claro".to_string(),
                        Theme::Dark => "oscuro".to_string(),
                    },
                ),
            };
            let mut line = input_line(label, &value, focused && panel.editing, accent);
            if focused && !panel.editing {
                line = line.style(Style::default().fg(accent));
            }
            lines.push(line);
        }
        lines.push(Line::raw(""));
        lines.push(Line::styled(
            "Cambiar el servidor reinicia la conexión.",
            Style::default().fg(Color::Gray),
        ));
        lines.push(Line::raw(""));
        lines.push(key_hint_line(&[
            ("Enter", "editar/cambiar"),
            ("↑/↓", "campo"),
            ("Esc", "guardar y cerrar"),
        ]));

        let popup = Paragraph::new(Text::from(lines))
            .wrap(Wrap { trim: false })
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(accent))
                    .title("Ajustes"),
            );
        frame.render_widget(popup, popup_area);
    }
}

#[cfg(test)]
mod tests {
    use libreria_core::DEFAULT_API_URL;

    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::from(code)
    }

    #[test]
    fn edits_url_and_reports_reconnect() {
        let mut settings = Settings::default();
        let mut panel = SettingsPanel::new(&settings);
        assert!(!panel.handle_key(key(KeyCode::Enter)));
        for _ in 0.."8001".len() {
            panel.handle_key(key(KeyCode::Backspace));
        }
        for c in "9000/".chars() {
            panel.handle_key(key(KeyCode::Char(c)));
        }
        panel.handle_key(key(KeyCode::Enter));
        assert!(panel.handle_key(key(KeyCode::Esc)));

        assert!(panel.apply(&mut settings, DEFAULT_API_URL));
        assert_eq!(settings.api_url, "http://localhost:9000");
        assert!(!panel.apply(&mut settings, "http://localhost:9000"));
    }

    #[test]
    fn stored_url_reconnects_when_client_uses_another() {
        let mut settings = Settings::default();
        let panel = SettingsPanel::new(&settings);
        assert!(panel.apply(&mut settings, "http://nas:8001"));
        assert_eq!(settings.api_url, DEFAULT_API_URL);
        assert!(!panel.apply(&mut settings, DEFAULT_API_URL));
    }

    #[test]
    fn theme_row_toggles() {
        let mut settings = Settings::default();
        let mut panel = SettingsPanel::new(&settings);
        panel.handle_key(key(KeyCode::Up));
        assert_eq!(panel.row(), SettingsRow::Theme);
        panel.handle_key(key(KeyCode::Right));
        assert_eq!(panel.theme, Theme::Light);
        assert!(!panel.apply(&mut settings, DEFAULT_API_URL));
        assert_eq!(settings.theme, Theme::Light);
    }

    #[test]
    fn typing_q_while_editing_does_not_close() {
        let settings = Settings::default();
        let mut panel = SettingsPanel::new(&settings);
        panel.selected = 1;
        panel.handle_key(key(KeyCode::Enter));
        assert!(!panel.handle_key(key(KeyCode::Char('q'))));
        assert_eq!(panel.download_dir, "q");
    }
}
