//! Terminal front end: event loop, routing, and one view per route.

use std::io::{self, Stdout};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use crossterm::event::{
    DisableBracketedPaste, EnableBracketedPaste, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers,
};
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{event, terminal};
use libreria_api::ApiClient;
use libreria_application::AppContext;
use libreria_application::categories::CategoriesState;
use libreria_application::header::HeaderState;
use libreria_application::library::LibraryState;
use libreria_application::rag::RagSession;
use libreria_application::reader::ReaderState;
use libreria_application::tools::ConvertTool;
use libreria_application::upload::{UploadQueue, parse_dropped_paths};
use libreria_core::{NAV_ROUTES, Route, Theme};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};

mod browser;
mod cover;
mod jobs;
mod views;

use browser::{BrowserAction, FileBrowser};
use cover::CoverCache;
use jobs::{Delivery, Job, Jobs, Outcome};
use views::library::LibraryPanel;
use views::reader::ReaderPanel;
use views::settings::SettingsPanel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiExit {
    Quit,
    /// The backend URL changed; the caller rebuilds the client and restarts.
    Reconnect,
}

#[derive(Debug, Clone)]
pub struct UiOutcome {
    pub ctx: AppContext,
    pub exit: UiExit,
}

enum View {
    Library(LibraryPanel),
    Upload(UploadQueue),
    Categories(CategoriesState),
    Tools(ConvertTool),
    Rag(views::rag::RagPanel),
    Reader(ReaderPanel),
}

pub struct Ui {
    ctx: AppContext,
    jobs: Jobs,
    header: HeaderState,
    view: View,
    browser: Option<FileBrowser>,
    settings_panel: Option<SettingsPanel>,
    covers: CoverCache,
    /// Transient line shown above the footer.
    notice: Option<String>,
    width: u16,
    browse_dir: PathBuf,
}

impl Ui {
    pub fn new(mut ctx: AppContext, client: ApiClient) -> anyhow::Result<Self> {
        ctx.settings.normalize();
        let browse_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        let now = Instant::now();
        let mut ui = Self {
            ctx,
            jobs: Jobs::new(client).context("start job runtime")?,
            header: HeaderState::new(now),
            view: View::Library(LibraryPanel::new(LibraryState::new(Default::default()))),
            browser: None,
            settings_panel: None,
            covers: CoverCache::new(ratatui_image::picker::Picker::halfblocks()),
            notice: None,
            width: 0,
            browse_dir,
        };
        ui.mount_view();
        Ok(ui)
    }

    pub fn run(&mut self) -> anyhow::Result<UiOutcome> {
        let mut terminal = setup_terminal()?;
        self.covers = CoverCache::new(cover::detect_picker());
        tracing::info!(
            protocol = cover::protocol_label(self.covers.picker()),
            api = self.jobs.client().base_url(),
            "ui started"
        );
        terminal.clear().ok();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.event_loop(&mut terminal)
        }));
        let restore_result = restore_terminal(&mut terminal);

        match (result, restore_result) {
            (Ok(Ok(outcome)), Ok(())) => Ok(outcome),
            (Ok(Ok(_)), Err(err)) => Err(err),
            (Ok(Err(err)), _) => Err(err),
            (Err(panic), Ok(())) => Err(anyhow::anyhow!(panic_to_string(panic))),
            (Err(panic), Err(err)) => Err(anyhow::anyhow!(
                "{}\n(additionally failed to restore terminal: {err})",
                panic_to_string(panic)
            )),
        }
    }

    fn event_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    ) -> anyhow::Result<UiOutcome> {
        let tick_rate = Duration::from_millis(50);
        let idle_redraw = Duration::from_secs(1);
        let mut needs_redraw = true;
        let mut last_draw = Instant::now();

        loop {
            if needs_redraw || last_draw.elapsed() >= idle_redraw {
                terminal.draw(|frame| self.draw(frame.area(), frame))?;
                needs_redraw = false;
                last_draw = Instant::now();
            }

            needs_redraw |= self.tick(Instant::now());

            if !event::poll(tick_rate)? {
                continue;
            }

            match event::read()? {
                Event::Resize(_, _) => needs_redraw = true,
                Event::Paste(text) => {
                    self.handle_paste(&text);
                    needs_redraw = true;
                }
                Event::Key(key) => {
                    if key.kind == KeyEventKind::Release {
                        continue;
                    }
                    needs_redraw = true;
                    if let Some(exit) = self.handle_key(key)? {
                        return Ok(UiOutcome {
                            ctx: self.ctx.clone(),
                            exit,
                        });
                    }
                }
                _ => {}
            }
        }
    }

    /// Timers and finished jobs. Returns whether anything changed.
    fn tick(&mut self, now: Instant) -> bool {
        let mut changed = false;
        if self.header.poll_due(now) {
            self.jobs.spawn(self.ctx.epoch(), Job::Count);
        }
        if let View::Library(panel) = &mut self.view {
            changed |= panel.state.expire_messages(now);
        }
        if let View::Library(panel) = &mut self.view
            && let Some(request) = panel.state.tick(now)
        {
            self.jobs.spawn(
                self.ctx.epoch(),
                Job::ListBooks {
                    ticket: request.ticket,
                    query: request.query,
                },
            );
            changed = true;
        }
        while let Some(delivery) = self.jobs.try_recv() {
            self.deliver(delivery);
            changed = true;
        }
        changed
    }

    fn deliver(&mut self, delivery: Delivery) {
        let Delivery { epoch, outcome } = delivery;
        if !outcome.outlives_view() && !self.ctx.is_current(epoch) {
            tracing::debug!(epoch, current = self.ctx.epoch(), ?outcome, "dropping stale result");
            return;
        }
        match outcome {
            Outcome::Count(result) => self.header.finish_count(result),
            Outcome::Cover { url, image } => self.covers.insert(url, image),
            Outcome::LinkSaved(result) => {
                if let View::Tools(tool) = &mut self.view {
                    tool.finish_download(result);
                }
            }
            Outcome::BookSaved(result) => {
                self.notice = Some(match result {
                    Ok(path) => format!("Descargado en {}", path.display()),
                    Err(reason) => {
                        tracing::warn!(%reason, "book download failed");
                        "No se pudo descargar el libro.".to_string()
                    }
                });
            }
            Outcome::PdfOpened(result) => {
                if let Err(reason) = result {
                    tracing::warn!(%reason, "open pdf failed");
                    self.notice = Some("No se pudo abrir el PDF.".to_string());
                }
            }
            outcome => self.deliver_to_view(outcome),
        }
    }

    fn deliver_to_view(&mut self, outcome: Outcome) {
        let epoch = self.ctx.epoch();
        match (&mut self.view, outcome) {
            (View::Library(panel), outcome) => {
                for job in panel.apply(outcome, &mut self.covers) {
                    self.jobs.spawn(epoch, job);
                }
            }
            (View::Upload(queue), Outcome::Uploaded { index, result }) => {
                queue.complete(index, result);
                if let Some((index, path)) = queue.advance() {
                    self.jobs.spawn(epoch, Job::Upload { index, path });
                }
            }
            (View::Categories(state), Outcome::Categories(result)) => state.finish_fetch(result),
            (View::Categories(state), Outcome::CategoryDeleted { name, result }) => {
                if state.finish_delete(&name, result) {
                    state.begin_fetch();
                    self.jobs.spawn(epoch, Job::Categories);
                }
            }
            (View::Tools(tool), Outcome::Converted(result)) => {
                if let Some(link) = tool.finish_convert(result) {
                    let dir = self.ctx.download_dir();
                    self.jobs.spawn(epoch, Job::SaveLink { link, dir });
                }
            }
            (View::Rag(panel), Outcome::RagUploaded(result)) => panel.session.finish_upload(result),
            (View::Rag(panel), Outcome::RagAnswered(result)) => panel.session.finish_query(result),
            (View::Reader(panel), Outcome::ReaderLoaded(result)) => panel.finish_load(result),
            (_, outcome) => {
                tracing::debug!(?outcome, "result has no receiver in this view");
            }
        }
    }

    /// Builds the view for the current route and issues its first requests.
    fn mount_view(&mut self) {
        let epoch = self.ctx.epoch();
        self.browser = None;
        self.notice = None;
        self.view = match self.ctx.route.clone() {
            Route::Library(filters) => {
                let mut state = LibraryState::new(filters);
                let request = state.mount();
                self.jobs.spawn(
                    epoch,
                    Job::ListBooks {
                        ticket: request.ticket,
                        query: request.query,
                    },
                );
                self.jobs.spawn(epoch, Job::Languages);
                View::Library(LibraryPanel::new(state))
            }
            Route::Upload => View::Upload(UploadQueue::new()),
            Route::Categories => {
                self.jobs.spawn(epoch, Job::Categories);
                View::Categories(CategoriesState::new())
            }
            Route::Tools => View::Tools(ConvertTool::new()),
            Route::Rag => View::Rag(views::rag::RagPanel::new(RagSession::new())),
            Route::Reader(id) => {
                self.jobs.spawn(epoch, Job::LoadReader(id));
                View::Reader(ReaderPanel::new(ReaderState::new(id)))
            }
        };
    }

    fn navigate(&mut self, route: Route) {
        if self.ctx.navigate(route) {
            self.mount_view();
        }
    }

    fn back(&mut self) {
        if self.ctx.back() {
            self.mount_view();
        }
    }

    fn open_browser(&mut self, title: &'static str, accept: &'static [&'static str], multiple: bool) {
        self.browser = Some(FileBrowser::new(
            title,
            self.browse_dir.clone(),
            accept,
            multiple,
        ));
    }

    fn handle_key(&mut self, key: KeyEvent) -> anyhow::Result<Option<UiExit>> {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return Ok(Some(UiExit::Quit));
        }

        if let Some(browser) = self.browser.as_mut() {
            match browser.handle_key(key) {
                BrowserAction::None => {}
                BrowserAction::Cancel => {
                    self.browse_dir = browser.dir.clone();
                    self.browser = None;
                }
                BrowserAction::Pick(paths) => {
                    self.browse_dir = browser.dir.clone();
                    self.browser = None;
                    self.files_picked(paths);
                }
            }
            return Ok(None);
        }

        if self.settings_panel.is_some() {
            return self.handle_settings_key(key);
        }

        let handled = match self.view {
            View::Library(_) => self.handle_library_key(key),
            View::Upload(_) => self.handle_upload_key(key),
            View::Categories(_) => self.handle_categories_key(key),
            View::Tools(_) => self.handle_tools_key(key),
            View::Rag(_) => self.handle_rag_key(key),
            View::Reader(_) => self.handle_reader_key(key),
        };
        if handled {
            return Ok(None);
        }

        self.handle_global_key(key)
    }

    fn handle_global_key(&mut self, key: KeyEvent) -> anyhow::Result<Option<UiExit>> {
        match key.code {
            KeyCode::Char('q') => return Ok(Some(UiExit::Quit)),
            KeyCode::Esc => self.back(),
            KeyCode::Char('s') => {
                self.settings_panel = Some(SettingsPanel::new(&self.ctx.settings));
            }
            KeyCode::Tab | KeyCode::BackTab => {
                let current = self
                    .ctx
                    .route
                    .nav_entry()
                    .and_then(|entry| NAV_ROUTES.iter().position(|e| *e == entry));
                let len = NAV_ROUTES.len();
                let next = match (current, key.code) {
                    (Some(i), KeyCode::Tab) => (i + 1) % len,
                    (Some(i), _) => (i + len - 1) % len,
                    (None, _) => 0,
                };
                self.navigate(NAV_ROUTES[next].route());
            }
            KeyCode::Char(c @ '1'..='5') => {
                let index = (c as usize) - ('1' as usize);
                if let Some(entry) = NAV_ROUTES.get(index) {
                    self.navigate(entry.route());
                }
            }
            _ => {}
        }
        Ok(None)
    }

    fn files_picked(&mut self, paths: Vec<PathBuf>) {
        match &mut self.view {
            View::Upload(queue) => {
                queue.add_files(paths);
            }
            View::Tools(tool) => {
                if let Some(path) = paths.into_iter().next() {
                    tool.select_file(path);
                }
            }
            View::Rag(panel) => {
                if let Some(path) = paths.into_iter().next() {
                    panel.session.select_file(path);
                }
            }
            _ => {}
        }
    }

    /// Pasted text goes to the focused input; otherwise it is read as dropped files.
    fn handle_paste(&mut self, text: &str) {
        if let Some(panel) = self.settings_panel.as_mut() {
            panel.paste(text);
            return;
        }
        if self.browser.is_some() {
            return;
        }
        let now = Instant::now();
        let consumed = match &mut self.view {
            View::Library(panel) => {
                panel.paste(text, now);
                true
            }
            View::Rag(panel) if panel.query_focused => {
                panel.session.query.push_str(&single_line(text));
                true
            }
            _ => false,
        };
        if consumed {
            return;
        }
        let paths = parse_dropped_paths(text);
        if !paths.is_empty() {
            tracing::debug!(count = paths.len(), "files dropped");
            self.files_picked(paths);
        }
    }

    fn accent_color(&self) -> Color {
        match self.ctx.settings.theme {
            Theme::Light => Color::Blue,
            Theme::Dark => Color::Yellow,
        }
    }

    fn highlight_style(&self) -> Style {
        Style::default()
            .fg(Color::Black)
            .bg(self.accent_color())
            .add_modifier(Modifier::BOLD)
    }

    fn draw(&mut self, area: Rect, frame: &mut ratatui::Frame) {
        frame.render_widget(Clear, area);
        self.width = area.width;

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(if self.notice.is_some() { 3 } else { 2 }),
            ])
            .split(area);

        let header = Paragraph::new(Text::from(self.header_lines()))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::BOTTOM));
        frame.render_widget(header, layout[0]);

        match self.view {
            View::Library(_) => self.draw_library(layout[1], frame),
            View::Upload(_) => self.draw_upload(layout[1], frame),
            View::Categories(_) => self.draw_categories(layout[1], frame),
            View::Tools(_) => self.draw_tools(layout[1], frame),
            View::Rag(_) => self.draw_rag(layout[1], frame),
            View::Reader(_) => self.draw_reader(layout[1], frame),
        }

        let mut footer_lines = Vec::new();
        if let Some(notice) = self.notice.as_deref() {
            footer_lines.push(Line::styled(
                notice.to_string(),
                Style::default().fg(self.accent_color()),
            ));
        }
        footer_lines.push(self.footer_line());
        let footer = Paragraph::new(Text::from(footer_lines))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::TOP));
        frame.render_widget(footer, layout[2]);

        if let Some(browser) = self.browser.as_ref() {
            self.draw_browser(browser, area, frame);
        }
        if self.settings_panel.is_some() {
            self.draw_settings_panel(area, frame);
        }
    }

    fn header_lines(&self) -> Vec<Line<'static>> {
        let mut title = vec![Span::styled(
            "Librería Inteligente",
            Style::default().add_modifier(Modifier::BOLD),
        )];
        if let Some(label) = self.header.count_label() {
            title.push(Span::raw(format!("  ·  {label}")));
        }
        if let Some(error) = self.header.error.as_deref() {
            title.push(Span::styled(
                format!("  ·  {error}"),
                Style::default().fg(Color::Red),
            ));
        }

        let active = self.ctx.route.nav_entry();
        let mut nav = Vec::new();
        for (i, entry) in NAV_ROUTES.iter().enumerate() {
            if i > 0 {
                nav.push(Span::raw("  "));
            }
            let label = format!("{} {}", i + 1, entry.label());
            if Some(*entry) == active {
                nav.push(Span::styled(label, self.highlight_style()));
            } else {
                nav.push(Span::styled(label, Style::default().fg(Color::Gray)));
            }
        }

        vec![Line::from(title), Line::from(nav)]
    }

    fn footer_line(&self) -> Line<'static> {
        let mut hints: Vec<(&str, &str)> = match &self.view {
            View::Library(panel) => panel.key_hints(views::library::is_compact(self.width)),
            View::Upload(queue) => views::upload::key_hints(queue),
            View::Categories(_) => vec![("Enter", "ver libros"), ("d", "eliminar"), ("r", "recargar")],
            View::Tools(_) => vec![("f", "elegir EPUB"), ("Enter", "convertir")],
            View::Rag(panel) => panel.key_hints(),
            View::Reader(_) => vec![("←/→", "página"), ("[/]", "capítulo"), ("Esc", "volver")],
        };
        hints.extend([("Tab", "sección"), ("s", "ajustes"), ("q", "salir")]);
        key_hint_line(&hints)
    }

    fn draw_browser(&self, browser: &FileBrowser, area: Rect, frame: &mut ratatui::Frame) {
        use ratatui::widgets::{HighlightSpacing, List, ListItem, ListState};

        let popup_area = centered_rect(70, 70, area);
        frame.render_widget(Clear, popup_area);
        let accept = browser
            .accept()
            .iter()
            .map(|e| format!(".{e}"))
            .collect::<Vec<_>>()
            .join(",");
        let block = Block::default().borders(Borders::ALL).title(Span::styled(
            format!("{} ({accept})", browser.title),
            Style::default().add_modifier(Modifier::BOLD),
        ));
        frame.render_widget(block.clone(), popup_area);
        let inner = block.inner(popup_area);
        let sections = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(inner);

        frame.render_widget(
            Paragraph::new(browser.dir.display().to_string())
                .style(Style::default().fg(Color::Gray)),
            sections[0],
        );

        if let Some(error) = browser.error.as_deref() {
            frame.render_widget(
                Paragraph::new(error.to_string())
                    .style(Style::default().fg(Color::Red))
                    .wrap(Wrap { trim: true }),
                sections[1],
            );
        } else {
            let items: Vec<ListItem> = browser
                .entries
                .iter()
                .map(|entry| {
                    let mark = if browser.marked.contains(&entry.path) {
                        "[x] "
                    } else if browser.is_multiple() && !entry.is_dir {
                        "[ ] "
                    } else {
                        ""
                    };
                    let suffix = if entry.is_dir { "/" } else { "" };
                    ListItem::new(Line::raw(format!("{mark}{}{suffix}", entry.name)))
                })
                .collect();
            let list = List::new(items)
                .highlight_style(self.highlight_style())
                .highlight_symbol("> ")
                .highlight_spacing(HighlightSpacing::Always);
            let mut state = ListState::default();
            state.select(Some(browser.selected));
            frame.render_stateful_widget(list, sections[1], &mut state);
        }

        let mut hints = vec![("Enter", "abrir/elegir"), ("Backspace", "subir")];
        if browser.is_multiple() {
            hints.push(("Espacio", "marcar"));
        }
        hints.push(("Esc", "cancelar"));
        frame.render_widget(
            Paragraph::new(key_hint_line(&hints)).alignment(Alignment::Center),
            sections[2],
        );
    }
}

fn key_hint_line(hints: &[(&str, &str)]) -> Line<'static> {
    let mut spans = Vec::new();
    for (i, (key, label)) in hints.iter().enumerate() {
        if i > 0 {
            spans.push(Span::raw("  "));
        }
        spans.push(Span::styled(
            key.to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        ));
        spans.push(Span::raw(format!(" {label}")));
    }
    Line::from(spans)
}

fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

fn setup_terminal() -> anyhow::Result<Terminal<CrosstermBackend<Stdout>>> {
    terminal::enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)
        .context("enter alt screen")?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).context("create terminal")
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> anyhow::Result<()> {
    terminal::disable_raw_mode().context("disable raw mode")?;
    crossterm::execute!(
        terminal.backend_mut(),
        DisableBracketedPaste,
        LeaveAlternateScreen
    )
    .context("leave alt screen")?;
    Ok(())
}

fn panic_to_string(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {s}")
    } else {
        "panic: (unknown payload)".to_string()
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centered_rect_stays_inside() {
        let area = Rect::new(0, 0, 100, 40);
        let popup = centered_rect(50, 50, area);
        assert_eq!(popup.width, 50);
        assert_eq!(popup.height, 20);
        assert_eq!(popup.x, 25);
        assert_eq!(popup.y, 10);
    }

    #[test]
    fn key_hints_render_pairs() {
        let line = key_hint_line(&[("q", "salir"), ("Tab", "sección")]);
        let text: String = line.spans.iter().map(|s| s.content.as_ref()).collect();
        assert_eq!(text, "q salir  Tab sección");
    }

    #[test]
    fn pasted_newlines_are_flattened() {
        assert_eq!(single_line("a\r\nb\nc"), "a  b c");
    }
}
