use std::time::Instant;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use libreria_application::edit::{EditField, EditForm};
use libreria_application::library::{LibraryAction, LibraryState, ListRequest};
use libreria_core::{Book, LibraryFilters, Route, file_name, format_rating};
use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, HighlightSpacing, List, ListItem, ListState, Paragraph, Wrap};

pub(crate) use libreria_application::library::is_compact;

use super::{confirm_answer, draw_alert, draw_confirm, draw_status, input_line, typed_char};
use crate::cover::CoverCache;
use crate::jobs::{Job, Outcome};
use crate::{Ui, View, centered_rect};

pub(crate) struct LibraryPanel {
    pub state: LibraryState,
    pub search_focused: bool,
}

impl LibraryPanel {
    pub(crate) fn new(state: LibraryState) -> Self {
        Self {
            state,
            search_focused: false,
        }
    }

    pub(crate) fn paste(&mut self, text: &str, now: Instant) {
        let text = crate::single_line(text);
        if let Some(form) = self.state.edit.as_mut() {
            text.chars().for_each(|c| form.insert_char(c));
        } else if self.search_focused {
            let term = format!("{}{text}", self.state.search_term);
            self.state.set_search_term(term, now);
        }
    }

    /// Applies a finished job; returns follow-up jobs such as cover fetches.
    pub(crate) fn apply(&mut self, outcome: Outcome, covers: &mut CoverCache) -> Vec<Job> {
        let mut follow_up = Vec::new();
        match outcome {
            Outcome::Books { ticket, result } => {
                if self.state.apply_list(ticket, result) {
                    for book in &self.state.books {
                        if let Some(url) = book.cover_image_url.as_deref()
                            && covers.want(url)
                        {
                            follow_up.push(Job::Cover(url.to_string()));
                        }
                    }
                }
            }
            Outcome::Languages(result) => self.state.apply_languages(result),
            Outcome::BookDeleted { id, result } => self.state.apply_delete(id, result),
            Outcome::KindleSent { id, result } => {
                self.state.apply_kindle(id, result, Instant::now())
            }
            Outcome::BookUpdated(result) => self.state.apply_edit(result),
            other => tracing::debug!(?other, "library ignores result"),
        }
        follow_up
    }

    pub(crate) fn key_hints(&self, compact: bool) -> Vec<(&'static str, &'static str)> {
        if self.state.edit.is_some() {
            return vec![
                ("Tab", "campo"),
                ("Espacio", "leído"),
                ("←/→", "valoración"),
                ("Enter", "guardar"),
                ("Esc", "cancelar"),
            ];
        }
        if self.search_focused {
            return vec![("Enter/Esc", "terminar búsqueda")];
        }
        let mut hints = vec![
            ("/", "buscar"),
            ("Enter", "leer/abrir"),
            ("e", "editar"),
            ("d", "eliminar"),
            ("k", "Kindle"),
            ("a", "autor"),
            ("c", "categoría"),
            ("l", "idioma"),
            ("x", "quitar filtros"),
        ];
        if compact {
            hints.push(("g", "descargar"));
        }
        hints
    }
}

fn list_job(request: ListRequest) -> Job {
    Job::ListBooks {
        ticket: request.ticket,
        query: request.query,
    }
}

/// Edit modal keys. Returns the job to run when the form is submitted.
fn handle_edit_key(form: &mut EditForm, key: KeyEvent) -> Option<Job> {
    let submit = |form: &mut EditForm| {
        form.begin_submit()
            .map(|(id, update)| Job::UpdateBook { id, update })
    };
    if key.code == KeyCode::Char('s') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return submit(form);
    }
    match key.code {
        KeyCode::Tab | KeyCode::Down => form.focus_next(),
        KeyCode::BackTab | KeyCode::Up => form.focus_prev(),
        KeyCode::Enter if form.focus == EditField::IsRead => form.toggle_read(),
        KeyCode::Enter => return submit(form),
        KeyCode::Char(' ') if form.focus == EditField::IsRead => form.toggle_read(),
        KeyCode::Left | KeyCode::Char('-') if form.focus == EditField::Rating => {
            form.step_rating(-1);
        }
        KeyCode::Right | KeyCode::Char('+') if form.focus == EditField::Rating => {
            form.step_rating(1);
        }
        KeyCode::Backspace => form.backspace(),
        _ => {
            if let Some(c) = typed_char(key) {
                form.insert_char(c);
            }
        }
    }
    None
}

impl Ui {
    pub(crate) fn handle_library_key(&mut self, key: KeyEvent) -> bool {
        let now = Instant::now();
        let epoch = self.ctx.epoch();
        let compact = is_compact(self.width);
        let download_dir = self.ctx.download_dir();
        let View::Library(panel) = &mut self.view else {
            return false;
        };
        let state = &mut panel.state;
        let mut jobs = Vec::new();
        let mut open_reader = None;

        if state.alert.is_some() {
            state.dismiss_alert();
            return true;
        }

        if state.confirm.is_some() {
            if let Some(answer) = confirm_answer(key) {
                match state.answer_confirm(answer) {
                    Some(LibraryAction::Delete(id)) => jobs.push(Job::DeleteBook(id)),
                    Some(LibraryAction::SendToKindle(id)) => jobs.push(Job::SendToKindle(id)),
                    None => {}
                }
            }
        } else if let Some(form) = state.edit.as_mut() {
            if key.code == KeyCode::Esc {
                state.close_edit();
            } else if let Some(job) = handle_edit_key(form, key) {
                jobs.push(job);
            }
        } else if panel.search_focused {
            match key.code {
                KeyCode::Esc | KeyCode::Enter => panel.search_focused = false,
                KeyCode::Backspace => state.pop_search_char(now),
                _ => {
                    if let Some(c) = typed_char(key) {
                        state.push_search_char(c, now);
                    }
                }
            }
        } else {
            let filters_before = state.filters.clone();
            match key.code {
                KeyCode::Char('/') => panel.search_focused = true,
                KeyCode::Down | KeyCode::Char('j') => state.select_next(),
                KeyCode::Up => state.select_prev(),
                KeyCode::Enter | KeyCode::Char('r') => {
                    if let Some(book) = state.selected_book() {
                        if book.is_pdf() {
                            jobs.push(Job::OpenPdf {
                                id: book.id,
                                name: file_name(std::path::Path::new(&book.file_path)),
                            });
                        } else {
                            open_reader = Some(Route::Reader(book.id));
                        }
                    }
                }
                KeyCode::Char('e') => {
                    state.open_edit();
                }
                KeyCode::Char('d') => {
                    state.request_delete();
                }
                KeyCode::Char('k') => {
                    state.request_kindle();
                }
                KeyCode::Char('a') => {
                    if let Some(author) = state.selected_book().map(|b| b.author.clone()) {
                        jobs.extend(state.filter_by_author(&author).map(list_job));
                    }
                }
                KeyCode::Char('c') => {
                    if let Some(category) = state.selected_book().map(|b| b.category.clone()) {
                        jobs.extend(state.filter_by_category(&category).map(list_job));
                    }
                }
                KeyCode::Char('l') => jobs.extend(state.cycle_language(true).map(list_job)),
                KeyCode::Char('L') => jobs.extend(state.cycle_language(false).map(list_job)),
                KeyCode::Char('x') => {
                    jobs.extend(state.set_filters(LibraryFilters::default()).map(list_job));
                }
                KeyCode::Char('g') if compact => {
                    if let Some(book) = state.selected_book() {
                        jobs.push(Job::DownloadBook {
                            id: book.id,
                            name: file_name(std::path::Path::new(&book.file_path)),
                            dir: download_dir,
                        });
                    }
                }
                _ => return false,
            }
            if state.filters != filters_before {
                self.ctx.route = Route::Library(state.filters.clone());
            }
        }

        for job in jobs {
            self.jobs.spawn(epoch, job);
        }
        if let Some(route) = open_reader {
            self.navigate(route);
        }
        true
    }

    pub(crate) fn draw_library(&mut self, area: Rect, frame: &mut Frame) {
        let accent = self.accent_color();
        let highlight = self.highlight_style();
        let compact = is_compact(area.width);
        let View::Library(panel) = &self.view else {
            return;
        };
        let state = &panel.state;

        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(0)])
            .split(area);

        let mut filter_spans = input_line("Buscar", &state.search_term, panel.search_focused, accent).spans;
        let language = state.filters.language.as_deref().unwrap_or("Todos");
        filter_spans.push(Span::raw("   "));
        filter_spans.push(Span::styled("Idioma: ", Style::default().add_modifier(Modifier::BOLD)));
        filter_spans.push(Span::raw(language.to_string()));
        if let Some(category) = state.filters.category.as_deref() {
            filter_spans.push(Span::raw("   "));
            filter_spans.push(Span::styled(
                format!("Categoría: {category}"),
                Style::default().fg(accent),
            ));
        }
        if let Some(author) = state.filters.author.as_deref() {
            filter_spans.push(Span::raw("   "));
            filter_spans.push(Span::styled(
                format!("Autor: {author}"),
                Style::default().fg(accent),
            ));
        }
        frame.render_widget(
            Paragraph::new(Line::from(filter_spans))
                .block(Block::default().borders(Borders::ALL).title("Mi Biblioteca")),
            layout[0],
        );

        let body = layout[1];
        if let Some(message) = state.status_message() {
            let style = if state.error.is_some() {
                Style::default().fg(Color::Red)
            } else {
                Style::default().fg(Color::Gray)
            };
            draw_status(frame, body, message, style);
        } else {
            let (list_area, detail_area) = if compact {
                let split = Layout::default()
                    .direction(Direction::Vertical)
                    .constraints([Constraint::Min(3), Constraint::Length(9)])
                    .split(body);
                (split[0], split[1])
            } else {
                let split = Layout::default()
                    .direction(Direction::Horizontal)
                    .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
                    .split(body);
                (split[0], split[1])
            };

            let items: Vec<ListItem> = state.books.iter().map(book_item).collect();
            let list = List::new(items)
                .block(Block::default().borders(Borders::ALL))
                .highlight_style(highlight)
                .highlight_symbol("> ")
                .highlight_spacing(HighlightSpacing::Always);
            let mut list_state = ListState::default();
            list_state.select(Some(state.selected));
            frame.render_stateful_widget(list, list_area, &mut list_state);

            if let Some(book) = state.selected_book() {
                let kindle = state.kindle.message(book.id);
                let block = Block::default().borders(Borders::ALL).title(book.title.clone());
                let inner = block.inner(detail_area);
                frame.render_widget(block, detail_area);
                let text_area = if compact {
                    inner
                } else {
                    let split = Layout::default()
                        .direction(Direction::Horizontal)
                        .constraints([Constraint::Length(22), Constraint::Min(0)])
                        .split(inner);
                    let cover_area = Rect {
                        height: split[0].height.min(14),
                        ..split[0]
                    };
                    self.covers.render(
                        frame,
                        cover_area,
                        book.cover_image_url.as_deref(),
                        book.cover_initial(),
                        Style::default().fg(accent),
                    );
                    Rect {
                        x: split[1].x + 1,
                        width: split[1].width.saturating_sub(1),
                        ..split[1]
                    }
                };
                frame.render_widget(
                    Paragraph::new(Text::from(detail_lines(book, kindle, compact, accent)))
                        .wrap(Wrap { trim: true }),
                    text_area,
                );
            }
        }

        if let Some(confirm) = state.confirm.as_ref() {
            draw_confirm(frame, area, &confirm.prompt(), accent);
        }
        if let Some(form) = state.edit.as_ref() {
            draw_edit_form(frame, area, form, accent);
        }
        if let Some(alert) = state.alert.as_deref() {
            draw_alert(frame, area, alert);
        }
    }
}

fn book_item(book: &Book) -> ListItem<'static> {
    let format = if book.is_pdf() { "PDF" } else { "EPUB" };
    let mut spans = vec![
        Span::styled(book.title.clone(), Style::default().add_modifier(Modifier::BOLD)),
        Span::styled(format!("  {}", book.author), Style::default().fg(Color::Gray)),
        Span::styled(format!("  [{format}]"), Style::default().fg(Color::DarkGray)),
    ];
    if book.is_read {
        spans.push(Span::styled("  ✓", Style::default().fg(Color::Green)));
    }
    ListItem::new(Line::from(spans))
}

fn detail_lines(
    book: &Book,
    kindle: Option<&str>,
    compact: bool,
    accent: Color,
) -> Vec<Line<'static>> {
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let field = |label: &str, value: String| {
        Line::from(vec![
            Span::styled(format!("{label}: "), bold),
            Span::raw(value),
        ])
    };

    let mut lines = vec![
        field("Autor", book.author.clone()),
        field("Categoría", book.category.clone()),
    ];
    if let Some(language) = book.language.as_deref() {
        lines.push(field("Idioma", language.to_string()));
    }
    if book.is_read {
        lines.push(Line::styled("Leído", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)));
    }
    if let Some(rating) = book.rating {
        lines.push(field("Valoración", format_rating(rating)));
    }
    if let Some(message) = kindle {
        lines.push(Line::styled(
            format!("Kindle: {message}"),
            Style::default().fg(accent),
        ));
    }
    if !compact && let Some(description) = book.description.as_deref() {
        lines.push(Line::raw(""));
        lines.push(Line::raw(description.to_string()));
    }

    lines.push(Line::raw(""));
    let action = if book.is_pdf() { "Abrir PDF" } else { "Leer EPUB" };
    let mut actions = vec![
        Span::styled("Enter", bold),
        Span::raw(format!(" {action}")),
    ];
    if !book.is_pdf() {
        actions.push(Span::styled("  k", bold));
        actions.push(Span::raw(" Enviar a Kindle"));
    }
    if compact {
        actions.push(Span::styled("  g", bold));
        actions.push(Span::raw(" Descargar"));
    }
    lines.push(Line::from(actions));
    lines
}

fn draw_edit_form(frame: &mut Frame, area: Rect, form: &EditForm, accent: Color) {
    let popup_area = centered_rect(70, 70, area);
    frame.render_widget(Clear, popup_area);

    let mut lines = Vec::new();
    for (field, value) in [
        (EditField::Title, &form.title),
        (EditField::Author, &form.author),
        (EditField::Category, &form.category),
        (EditField::Description, &form.description),
    ] {
        lines.push(input_line(field.label(), value, form.focus == field, accent));
    }

    let checkbox = if form.is_read { "[x]" } else { "[ ]" };
    lines.push(input_line(
        EditField::IsRead.label(),
        checkbox,
        form.focus == EditField::IsRead,
        accent,
    ));

    let stars = match form.rating {
        Some(rating) => format!("{} {}", star_bar(rating), format_rating(rating)),
        None => star_bar(0.0),
    };
    let rating_line = input_line(
        EditField::Rating.label(),
        &stars,
        form.focus == EditField::Rating,
        accent,
    );
    if form.rating_enabled() {
        lines.push(rating_line);
    } else {
        lines.push(rating_line.style(Style::default().fg(Color::DarkGray)));
    }

    lines.push(Line::raw(""));
    if form.saving {
        lines.push(Line::styled("Guardando...", Style::default().fg(accent)));
    }
    if let Some(error) = form.error.as_deref() {
        lines.push(Line::styled(error.to_string(), Style::default().fg(Color::Red)));
    }

    let popup = Paragraph::new(Text::from(lines))
        .wrap(Wrap { trim: false })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(accent))
                .title("Editar libro"),
        );
    frame.render_widget(popup, popup_area);
}

fn star_bar(rating: f64) -> String {
    let filled = rating.round().clamp(0.0, 10.0) as usize;
    format!("{}{}", "★".repeat(filled), "☆".repeat(10 - filled))
}

#[cfg(test)]
mod tests {
    use libreria_core::BookId;

    use super::*;

    fn book(id: i64, file: &str) -> Book {
        Book {
            id: BookId(id),
            title: "Pedro Páramo".to_string(),
            author: "Juan Rulfo".to_string(),
            category: "Novela".to_string(),
            description: Some("Comala.".to_string()),
            language: Some("es".to_string()),
            rating: Some(8.0),
            is_read: true,
            file_path: file.to_string(),
            cover_image_url: None,
        }
    }

    fn text(lines: &[Line]) -> String {
        lines
            .iter()
            .map(|l| l.spans.iter().map(|s| s.content.as_ref()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn download_action_only_in_compact_layout() {
        let wide = text(&detail_lines(&book(1, "/a.epub"), None, false, Color::Yellow));
        let compact = text(&detail_lines(&book(1, "/a.epub"), None, true, Color::Yellow));
        assert!(!wide.contains("Descargar"));
        assert!(compact.contains("Descargar"));
        assert!(wide.contains("Leer EPUB"));
        assert!(wide.contains("Enviar a Kindle"));
    }

    #[test]
    fn pdf_offers_open_and_no_kindle() {
        let lines = text(&detail_lines(&book(1, "/a.PDF"), None, false, Color::Yellow));
        assert!(lines.contains("Abrir PDF"));
        assert!(!lines.contains("Kindle"));
    }

    #[test]
    fn kindle_message_is_shown() {
        let lines = text(&detail_lines(
            &book(1, "/a.epub"),
            Some("¡Enviado con éxito!"),
            false,
            Color::Yellow,
        ));
        assert!(lines.contains("Kindle: ¡Enviado con éxito!"));
    }

    #[test]
    fn star_bar_rounds() {
        assert_eq!(star_bar(7.6), "★★★★★★★★☆☆");
        assert_eq!(star_bar(0.0), "☆☆☆☆☆☆☆☆☆☆");
    }

    #[test]
    fn edit_keys_submit_and_toggle() {
        let mut form = EditForm::new(&book(4, "/a.epub"));
        assert!(handle_edit_key(&mut form, KeyEvent::from(KeyCode::Char('!'))).is_none());
        assert_eq!(form.title, "Pedro Páramo!");

        form.focus = EditField::IsRead;
        handle_edit_key(&mut form, KeyEvent::from(KeyCode::Char(' ')));
        assert!(!form.is_read);
        assert_eq!(form.rating, None);

        form.focus = EditField::Title;
        match handle_edit_key(&mut form, KeyEvent::from(KeyCode::Enter)) {
            Some(Job::UpdateBook { id, update }) => {
                assert_eq!(id, BookId(4));
                assert_eq!(update.rating, None);
                assert!(!update.is_read);
            }
            other => panic!("expected update job, got {other:?}"),
        }
        assert!(form.saving);
    }
}
