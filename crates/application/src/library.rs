use std::collections::HashMap;
use std::time::{Duration, Instant};

use libreria_core::{ApiFailure, Book, BookId, LibraryFilters, ListQuery};

use crate::edit::EditForm;
use crate::timers::Debouncer;

pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);
pub const KINDLE_STATUS_TTL: Duration = Duration::from_secs(6);
/// Terminal columns at or below which the compact card layout is used.
pub const COMPACT_WIDTH: u16 = 96;

pub const MSG_LOADING: &str = "Cargando libros...";
pub const MSG_LIST_FAILED: &str = "No se pudieron cargar los libros.";
pub const MSG_LIST_CONNECTION: &str = "Error de conexión al cargar la biblioteca.";
pub const MSG_EMPTY: &str = "No se encontraron libros que coincidan con tu búsqueda.";
pub const MSG_CONFIRM_DELETE: &str = "¿Estás seguro de que quieres eliminar este libro?";
pub const MSG_DELETE_FAILED: &str = "No se pudo eliminar el libro.";
pub const MSG_DELETE_CONNECTION: &str = "Error de conexión al intentar eliminar el libro.";
pub const MSG_KINDLE_SENDING: &str = "Enviando...";
pub const MSG_KINDLE_SENT: &str = "¡Enviado con éxito!";
pub const MSG_KINDLE_FAILED: &str = "No se pudo enviar el libro.";
pub const MSG_KINDLE_CONNECTION: &str = "Error de conexión.";

pub fn is_compact(width: u16) -> bool {
    width <= COMPACT_WIDTH
}

/// A list request tagged so that only the latest response is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
    pub ticket: u64,
    pub query: ListQuery,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirm {
    DeleteBook(BookId),
    SendToKindle { id: BookId, title: String },
}

impl Confirm {
    pub fn prompt(&self) -> String {
        match self {
            Confirm::DeleteBook(_) => MSG_CONFIRM_DELETE.to_string(),
            Confirm::SendToKindle { title, .. } => {
                format!("¿Quieres enviar '{title}' a tu Kindle?")
            }
        }
    }
}

/// Work the user confirmed; the caller runs it and reports back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryAction {
    Delete(BookId),
    SendToKindle(BookId),
}

#[derive(Debug, Clone)]
struct KindleEntry {
    message: String,
    expires_at: Option<Instant>,
}

/// Transient per-book Kindle messages.
#[derive(Debug, Clone, Default)]
pub struct KindleStatuses {
    entries: HashMap<BookId, KindleEntry>,
}

impl KindleStatuses {
    pub fn is_sending(&self, id: BookId) -> bool {
        self.entries
            .get(&id)
            .is_some_and(|e| e.expires_at.is_none())
    }

    pub fn message(&self, id: BookId) -> Option<&str> {
        self.entries.get(&id).map(|e| e.message.as_str())
    }

    /// Returns false while a send for `id` is still in flight.
    pub fn begin(&mut self, id: BookId) -> bool {
        if self.is_sending(id) {
            return false;
        }
        self.entries.insert(
            id,
            KindleEntry {
                message: MSG_KINDLE_SENDING.to_string(),
                expires_at: None,
            },
        );
        true
    }

    pub fn finish(&mut self, id: BookId, result: Result<(), ApiFailure>, now: Instant) {
        let message = match result {
            Ok(()) => MSG_KINDLE_SENT.to_string(),
            Err(ApiFailure::Connection) => MSG_KINDLE_CONNECTION.to_string(),
            Err(failure) => format!("Error: {}", failure.detail_or(MSG_KINDLE_FAILED)),
        };
        self.entries.insert(
            id,
            KindleEntry {
                message,
                expires_at: Some(now + KINDLE_STATUS_TTL),
            },
        );
    }

    /// Drops messages past their deadline; true when any went away.
    pub fn expire(&mut self, now: Instant) -> bool {
        let before = self.entries.len();
        self.entries
            .retain(|_, e| e.expires_at.is_none_or(|deadline| now < deadline));
        self.entries.len() != before
    }
}

#[derive(Debug, Clone)]
pub struct LibraryState {
    pub filters: LibraryFilters,
    /// What the search box shows; the list follows it after the debounce.
    pub search_term: String,
    applied_search: String,
    debounce: Debouncer<String>,
    pub books: Vec<Book>,
    pub selected: usize,
    pub languages: Vec<String>,
    pub loading: bool,
    pub error: Option<String>,
    latest_ticket: u64,
    pub kindle: KindleStatuses,
    pub edit: Option<EditForm>,
    pub confirm: Option<Confirm>,
    pub alert: Option<String>,
}

impl LibraryState {
    pub fn new(filters: LibraryFilters) -> Self {
        Self {
            filters,
            search_term: String::new(),
            applied_search: String::new(),
            debounce: Debouncer::new(SEARCH_DEBOUNCE),
            books: Vec::new(),
            selected: 0,
            languages: Vec::new(),
            loading: true,
            error: None,
            latest_ticket: 0,
            kindle: KindleStatuses::default(),
            edit: None,
            confirm: None,
            alert: None,
        }
    }

    /// First list request for a freshly shown view.
    pub fn mount(&mut self) -> ListRequest {
        self.begin_list()
    }

    pub fn list_query(&self) -> ListQuery {
        ListQuery::new(&self.filters, &self.applied_search)
    }

    fn begin_list(&mut self) -> ListRequest {
        self.latest_ticket += 1;
        self.loading = true;
        self.error = None;
        ListRequest {
            ticket: self.latest_ticket,
            query: self.list_query(),
        }
    }

    pub fn set_search_term(&mut self, term: String, now: Instant) {
        self.search_term = term.clone();
        self.debounce.push(term, now);
    }

    pub fn push_search_char(&mut self, c: char, now: Instant) {
        let mut term = self.search_term.clone();
        term.push(c);
        self.set_search_term(term, now);
    }

    pub fn pop_search_char(&mut self, now: Instant) {
        let mut term = self.search_term.clone();
        if term.pop().is_some() {
            self.set_search_term(term, now);
        }
    }

    /// Expires Kindle messages; true when the screen needs a redraw.
    pub fn expire_messages(&mut self, now: Instant) -> bool {
        self.kindle.expire(now)
    }

    /// Fires the search debounce.
    pub fn tick(&mut self, now: Instant) -> Option<ListRequest> {
        let term = self.debounce.poll(now)?;
        if term == self.applied_search {
            return None;
        }
        self.applied_search = term;
        Some(self.begin_list())
    }

    /// Replaces the route filters; `None` when nothing changed.
    pub fn set_filters(&mut self, filters: LibraryFilters) -> Option<ListRequest> {
        if filters == self.filters {
            return None;
        }
        self.filters = filters;
        self.selected = 0;
        Some(self.begin_list())
    }

    /// Author links also clear the search box, and the next list goes out without it.
    pub fn filter_by_author(&mut self, author: &str) -> Option<ListRequest> {
        let had_search = !self.applied_search.is_empty();
        self.search_term.clear();
        self.applied_search.clear();
        self.debounce.cancel();
        let filters = LibraryFilters::author(author);
        if filters == self.filters && had_search {
            return Some(self.begin_list());
        }
        self.set_filters(filters)
    }

    pub fn filter_by_category(&mut self, category: &str) -> Option<ListRequest> {
        self.set_filters(LibraryFilters::category(category))
    }

    /// An empty selection clears every filter.
    pub fn filter_by_language(&mut self, language: &str) -> Option<ListRequest> {
        if language.is_empty() {
            self.set_filters(LibraryFilters::default())
        } else {
            self.set_filters(LibraryFilters::language(language))
        }
    }

    pub fn language_options(&self) -> Vec<String> {
        let mut options = vec![String::new()];
        options.extend(self.languages.iter().cloned());
        options
    }

    /// Cycles the language selector; returns the request for the new filter.
    pub fn cycle_language(&mut self, forward: bool) -> Option<ListRequest> {
        let options = self.language_options();
        let current = self.filters.language.clone().unwrap_or_default();
        let index = options.iter().position(|l| *l == current).unwrap_or(0);
        let len = options.len();
        let next = if forward {
            (index + 1) % len
        } else {
            (index + len - 1) % len
        };
        let language = options[next].clone();
        self.filter_by_language(&language)
    }

    /// Returns false for a response to a superseded request.
    pub fn apply_list(&mut self, ticket: u64, result: Result<Vec<Book>, ApiFailure>) -> bool {
        if ticket != self.latest_ticket {
            tracing::debug!(ticket, latest = self.latest_ticket, "dropping stale book list");
            return false;
        }
        self.loading = false;
        match result {
            Ok(books) => {
                self.books = books;
                self.error = None;
            }
            Err(failure) => {
                tracing::warn!(%failure, "book list failed");
                self.error = Some(if failure.is_connection() {
                    MSG_LIST_CONNECTION.to_string()
                } else {
                    MSG_LIST_FAILED.to_string()
                });
            }
        }
        self.clamp_selection();
        true
    }

    pub fn apply_languages(&mut self, result: Result<Vec<String>, ApiFailure>) {
        match result {
            Ok(languages) => self.languages = languages,
            Err(failure) => tracing::warn!(%failure, "language list failed"),
        }
    }

    pub fn status_message(&self) -> Option<&str> {
        if self.loading {
            Some(MSG_LOADING)
        } else if let Some(error) = self.error.as_deref() {
            Some(error)
        } else if self.books.is_empty() {
            Some(MSG_EMPTY)
        } else {
            None
        }
    }

    pub fn selected_book(&self) -> Option<&Book> {
        self.books.get(self.selected)
    }

    pub fn select_next(&mut self) {
        if self.selected + 1 < self.books.len() {
            self.selected += 1;
        }
    }

    pub fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    fn clamp_selection(&mut self) {
        self.selected = self.selected.min(self.books.len().saturating_sub(1));
    }

    pub fn request_delete(&mut self) -> bool {
        let Some(book) = self.selected_book() else {
            return false;
        };
        self.confirm = Some(Confirm::DeleteBook(book.id));
        true
    }

    /// Only EPUBs can be sent, one send per book at a time.
    pub fn request_kindle(&mut self) -> bool {
        let Some(book) = self.selected_book() else {
            return false;
        };
        if book.is_pdf() || self.kindle.is_sending(book.id) {
            return false;
        }
        self.confirm = Some(Confirm::SendToKindle {
            id: book.id,
            title: book.title.clone(),
        });
        true
    }

    pub fn answer_confirm(&mut self, accepted: bool) -> Option<LibraryAction> {
        let confirm = self.confirm.take()?;
        if !accepted {
            return None;
        }
        match confirm {
            Confirm::DeleteBook(id) => Some(LibraryAction::Delete(id)),
            Confirm::SendToKindle { id, .. } => self
                .kindle
                .begin(id)
                .then_some(LibraryAction::SendToKindle(id)),
        }
    }

    /// The book leaves the list only once the server confirmed.
    pub fn apply_delete(&mut self, id: BookId, result: Result<(), ApiFailure>) {
        match result {
            Ok(()) => {
                self.books.retain(|b| b.id != id);
                self.clamp_selection();
            }
            Err(failure) => {
                tracing::warn!(%id, %failure, "delete failed");
                self.alert = Some(if failure.is_connection() {
                    MSG_DELETE_CONNECTION.to_string()
                } else {
                    MSG_DELETE_FAILED.to_string()
                });
            }
        }
    }

    pub fn apply_kindle(&mut self, id: BookId, result: Result<(), ApiFailure>, now: Instant) {
        if let Err(failure) = &result {
            tracing::warn!(%id, %failure, "send to kindle failed");
        }
        self.kindle.finish(id, result, now);
    }

    pub fn open_edit(&mut self) -> bool {
        let Some(book) = self.selected_book().cloned() else {
            return false;
        };
        match self.edit.as_mut() {
            Some(form) => {
                form.reseed(&book);
            }
            None => self.edit = Some(EditForm::new(&book)),
        }
        true
    }

    pub fn close_edit(&mut self) -> bool {
        if self.edit.as_ref().is_some_and(|f| !f.can_cancel()) {
            return false;
        }
        self.edit = None;
        true
    }

    /// Feeds the update outcome to the open form; a saved record replaces
    /// the book with the same id and closes the modal.
    pub fn apply_edit(&mut self, result: Result<Book, ApiFailure>) {
        let Some(form) = self.edit.as_mut() else {
            return;
        };
        let Some(saved) = form.finish_submit(result) else {
            return;
        };
        if let Some(slot) = self.books.iter_mut().find(|b| b.id == saved.id) {
            *slot = saved;
        }
        self.edit = None;
    }

    pub fn dismiss_alert(&mut self) {
        self.alert = None;
    }
}
