//! Book covers: terminal graphics detection, a per-url cache, and the
//! placeholder drawn when a cover is missing or fails to load.

use std::collections::HashMap;

use ratatui::Frame;
use ratatui::layout::{Alignment, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Text};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui_image::picker::{Picker, ProtocolType, cap_parser::QueryStdioOptions};
use ratatui_image::protocol::Protocol;
use ratatui_image::{Image as ImageWidget, Resize};

fn env_set(key: &str) -> bool {
    std::env::var(key).ok().is_some_and(|v| !v.trim().is_empty())
}

fn env_contains(key: &str, needle: &str) -> bool {
    std::env::var(key).ok().is_some_and(|v| v.contains(needle))
}

fn graphics_hinted() -> bool {
    env_set("KITTY_WINDOW_ID")
        || env_contains("TERM", "kitty")
        || env_set("ITERM_SESSION_ID")
        || env_contains("TERM_PROGRAM", "iTerm")
        || env_contains("TERM_PROGRAM", "WezTerm")
}

/// Asking the terminal about graphics support blocks for the timeout when it
/// never answers, so only ask when the environment suggests it will.
pub(crate) fn should_query_stdio() -> bool {
    graphics_hinted() || std::env::var_os("TMUX").is_some()
}

pub(crate) fn stdio_query_timeout() -> std::time::Duration {
    if graphics_hinted() {
        std::time::Duration::from_millis(1500)
    } else {
        std::time::Duration::from_millis(300)
    }
}

pub(crate) fn detect_picker() -> Picker {
    if !should_query_stdio() {
        return Picker::halfblocks();
    }
    let mut options = QueryStdioOptions::default();
    options.timeout = stdio_query_timeout();
    options.text_sizing_protocol = false;
    match Picker::from_query_stdio_with_options(options) {
        Ok(picker) => picker,
        Err(err) => {
            tracing::debug!(?err, "terminal graphics query failed");
            Picker::halfblocks()
        }
    }
}

pub(crate) fn protocol_label(picker: &Picker) -> &'static str {
    match picker.protocol_type() {
        ProtocolType::Halfblocks => "halfblocks",
        ProtocolType::Sixel => "sixel",
        ProtocolType::Kitty => "kitty",
        ProtocolType::Iterm2 => "iterm2",
    }
}

enum CoverEntry {
    Loading,
    Failed,
    Ready {
        image: image::DynamicImage,
        protocol: Option<(Rect, Protocol)>,
    },
}

/// Covers keyed by url. A url is fetched at most once per run.
pub(crate) struct CoverCache {
    picker: Picker,
    entries: HashMap<String, CoverEntry>,
}

impl CoverCache {
    pub(crate) fn new(picker: Picker) -> Self {
        Self {
            picker,
            entries: HashMap::new(),
        }
    }

    pub(crate) fn picker(&self) -> &Picker {
        &self.picker
    }

    /// Returns true when the caller should start fetching `url`.
    pub(crate) fn want(&mut self, url: &str) -> bool {
        if self.entries.contains_key(url) {
            return false;
        }
        self.entries.insert(url.to_string(), CoverEntry::Loading);
        true
    }

    pub(crate) fn insert(&mut self, url: String, image: Option<image::DynamicImage>) {
        let entry = match image {
            Some(image) => CoverEntry::Ready {
                image,
                protocol: None,
            },
            None => CoverEntry::Failed,
        };
        self.entries.insert(url, entry);
    }

    #[cfg(test)]
    fn is_failed(&self, url: &str) -> bool {
        matches!(self.entries.get(url), Some(CoverEntry::Failed))
    }

    /// Draws the cover for `url`, or the placeholder with `initial`.
    pub(crate) fn render(
        &mut self,
        frame: &mut Frame,
        area: Rect,
        url: Option<&str>,
        initial: char,
        accent: Style,
    ) {
        if area.width == 0 || area.height == 0 {
            return;
        }
        let entry = url.and_then(|u| self.entries.get_mut(u));
        let Some(CoverEntry::Ready { image, protocol }) = entry else {
            render_placeholder(frame, area, initial, accent);
            return;
        };

        let stale = protocol.as_ref().is_none_or(|(size, _)| *size != area);
        if stale {
            *protocol = match self
                .picker
                .new_protocol(image.clone(), area, Resize::Fit(None))
            {
                Ok(p) => Some((area, p)),
                Err(err) => {
                    tracing::debug!(?err, "cover protocol failed");
                    None
                }
            };
        }
        match protocol.as_ref() {
            Some((_, p)) => {
                let proto_area = p.area();
                let draw = Rect::new(
                    area.x + area.width.saturating_sub(proto_area.width) / 2,
                    area.y,
                    proto_area.width.min(area.width),
                    proto_area.height.min(area.height),
                );
                frame.render_widget(ImageWidget::new(p), draw);
            }
            None => render_placeholder(frame, area, initial, accent),
        }
    }
}

fn render_placeholder(frame: &mut Frame, area: Rect, initial: char, accent: Style) {
    let pad = area.height.saturating_sub(3) / 2;
    let mut lines: Vec<Line> = (0..pad).map(|_| Line::raw("")).collect();
    lines.push(Line::styled(
        initial.to_string(),
        accent.add_modifier(Modifier::BOLD),
    ));
    let placeholder = Paragraph::new(Text::from(lines))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(placeholder, area);
}
