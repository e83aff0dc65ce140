use libreria_core::{ApiFailure, Book, BookId, BookUpdate};

pub const MSG_SAVE_FAILED: &str = "Error al actualizar el libro.";
pub const MSG_SAVE_CONNECTION: &str = "Error de conexión al actualizar el libro.";
pub const MSG_REQUIRED: &str = "Título, autor y categoría son obligatorios.";
pub const MAX_RATING: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditField {
    Title,
    Author,
    Category,
    Description,
    IsRead,
    Rating,
}

impl EditField {
    const ORDER: [EditField; 6] = [
        EditField::Title,
        EditField::Author,
        EditField::Category,
        EditField::Description,
        EditField::IsRead,
        EditField::Rating,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            EditField::Title => "Título",
            EditField::Author => "Autor",
            EditField::Category => "Categoría",
            EditField::Description => "Descripción",
            EditField::IsRead => "Leído",
            EditField::Rating => "Valoración",
        }
    }

    fn index(self) -> usize {
        Self::ORDER.iter().position(|f| *f == self).unwrap_or(0)
    }

    pub fn next(self) -> Self {
        Self::ORDER[(self.index() + 1) % Self::ORDER.len()]
    }

    pub fn prev(self) -> Self {
        let len = Self::ORDER.len();
        Self::ORDER[(self.index() + len - 1) % len]
    }

    pub fn is_text(&self) -> bool {
        matches!(
            self,
            EditField::Title | EditField::Author | EditField::Category | EditField::Description
        )
    }
}

/// Controlled edit form for one book.
#[derive(Debug, Clone, PartialEq)]
pub struct EditForm {
    book_id: BookId,
    pub title: String,
    pub author: String,
    pub category: String,
    pub description: String,
    pub is_read: bool,
    pub rating: Option<f64>,
    pub focus: EditField,
    pub error: Option<String>,
    pub saving: bool,
}

impl EditForm {
    pub fn new(book: &Book) -> Self {
        Self {
            book_id: book.id,
            title: book.title.clone(),
            author: book.author.clone(),
            category: book.category.clone(),
            description: book.description.clone().unwrap_or_default(),
            is_read: book.is_read,
            rating: book.rating,
            focus: EditField::Title,
            error: None,
            saving: false,
        }
    }

    pub fn book_id(&self) -> BookId {
        self.book_id
    }

    /// Re-seeds every field when handed a different book. Returns whether it did.
    pub fn reseed(&mut self, book: &Book) -> bool {
        if book.id == self.book_id {
            return false;
        }
        *self = Self::new(book);
        true
    }

    pub fn focus_next(&mut self) {
        self.focus = self.focus.next();
    }

    pub fn focus_prev(&mut self) {
        self.focus = self.focus.prev();
    }

    fn focused_text(&mut self) -> Option<&mut String> {
        match self.focus {
            EditField::Title => Some(&mut self.title),
            EditField::Author => Some(&mut self.author),
            EditField::Category => Some(&mut self.category),
            EditField::Description => Some(&mut self.description),
            EditField::IsRead | EditField::Rating => None,
        }
    }

    pub fn insert_char(&mut self, c: char) {
        if self.saving {
            return;
        }
        if let Some(text) = self.focused_text() {
            text.push(c);
        }
    }

    pub fn backspace(&mut self) {
        if self.saving {
            return;
        }
        if let Some(text) = self.focused_text() {
            text.pop();
        }
    }

    /// Unchecking "read" drops the rating.
    pub fn toggle_read(&mut self) {
        if self.saving {
            return;
        }
        self.is_read = !self.is_read;
        if !self.is_read {
            self.rating = None;
        }
    }

    pub fn rating_enabled(&self) -> bool {
        self.is_read && !self.saving
    }

    pub fn set_rating(&mut self, value: f64) -> bool {
        if !self.rating_enabled() {
            return false;
        }
        self.rating = Some(value.clamp(0.0, MAX_RATING));
        true
    }

    /// Moves the star picker by whole points.
    pub fn step_rating(&mut self, delta: i32) -> bool {
        let current = self.rating.unwrap_or(0.0).floor();
        let next = if delta < 0 && self.rating.is_some_and(|r| r.fract() != 0.0) {
            current + f64::from(delta + 1)
        } else {
            current + f64::from(delta)
        };
        self.set_rating(next)
    }

    pub fn payload(&self) -> BookUpdate {
        let rating = if self.is_read {
            self.rating.filter(|r| *r != 0.0)
        } else {
            None
        };
        BookUpdate {
            title: self.title.clone(),
            author: self.author.clone(),
            category: self.category.clone(),
            description: self.description.clone(),
            rating,
            is_read: self.is_read,
        }
    }

    pub fn can_cancel(&self) -> bool {
        !self.saving
    }

    /// Validates and marks the form as saving. `None` when nothing should be sent.
    pub fn begin_submit(&mut self) -> Option<(BookId, BookUpdate)> {
        if self.saving {
            return None;
        }
        let missing = [&self.title, &self.author, &self.category]
            .iter()
            .any(|v| v.trim().is_empty());
        if missing {
            self.error = Some(MSG_REQUIRED.to_string());
            return None;
        }
        self.error = None;
        self.saving = true;
        Some((self.book_id, self.payload()))
    }

    /// Returns the server's record on success; the form stays open on failure.
    pub fn finish_submit(&mut self, result: Result<Book, ApiFailure>) -> Option<Book> {
        self.saving = false;
        match result {
            Ok(book) => Some(book),
            Err(failure) => {
                tracing::warn!(id = %self.book_id, %failure, "book update failed");
                self.error = Some(if failure.is_connection() {
                    MSG_SAVE_CONNECTION.to_string()
                } else {
                    failure.detail_or(MSG_SAVE_FAILED)
                });
                None
            }
        }
    }
}
