use libreria_core::BookId;

pub const MSG_LOADING: &str = "Cargando Libro...";
pub const MSG_FAILED: &str = "No se pudo cargar el libro.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderPosition {
    pub chapter: usize,
    pub page: usize,
}

/// Reading position for one mounted book. Nothing is persisted.
#[derive(Debug, Clone)]
pub struct ReaderState {
    pub book_id: BookId,
    pub loading: bool,
    pub error: Option<String>,
    pub title: Option<String>,
    pub position: ReaderPosition,
}

impl ReaderState {
    pub fn new(book_id: BookId) -> Self {
        Self {
            book_id,
            loading: true,
            error: None,
            title: None,
            position: ReaderPosition::default(),
        }
    }

    pub fn finish_load(&mut self, title: Result<String, String>) {
        self.loading = false;
        match title {
            Ok(title) => self.title = Some(title),
            Err(reason) => {
                tracing::warn!(id = %self.book_id, %reason, "reader load failed");
                self.error = Some(MSG_FAILED.to_string());
            }
        }
    }

    pub fn status_message(&self) -> Option<&str> {
        if self.loading {
            Some(MSG_LOADING)
        } else {
            self.error.as_deref()
        }
    }

    /// Keeps the position valid after a repagination. The chapter survives a
    /// resize; the page is clamped.
    pub fn clamp(&mut self, page_counts: &[usize]) {
        if page_counts.is_empty() {
            self.position = ReaderPosition::default();
            return;
        }
        self.position.chapter = self.position.chapter.min(page_counts.len() - 1);
        let pages = page_counts[self.position.chapter].max(1);
        self.position.page = self.position.page.min(pages - 1);
    }

    pub fn next_page(&mut self, page_counts: &[usize]) -> bool {
        let Some(&pages) = page_counts.get(self.position.chapter) else {
            return false;
        };
        if self.position.page + 1 < pages {
            self.position.page += 1;
            return true;
        }
        self.next_chapter(page_counts)
    }

    pub fn prev_page(&mut self, page_counts: &[usize]) -> bool {
        if self.position.page > 0 {
            self.position.page -= 1;
            return true;
        }
        if self.position.chapter == 0 {
            return false;
        }
        self.position.chapter -= 1;
        self.position.page = page_counts
            .get(self.position.chapter)
            .map_or(0, |p| p.saturating_sub(1));
        true
    }

    pub fn next_chapter(&mut self, page_counts: &[usize]) -> bool {
        if self.position.chapter + 1 >= page_counts.len() {
            return false;
        }
        self.position.chapter += 1;
        self.position.page = 0;
        true
    }

    pub fn prev_chapter(&mut self) -> bool {
        if self.position.chapter == 0 {
            return false;
        }
        self.position.chapter -= 1;
        self.position.page = 0;
        true
    }

    /// 1-based page across the whole book, and the total.
    pub fn progress(&self, page_counts: &[usize]) -> (usize, usize) {
        let total = page_counts.iter().sum();
        let before: usize = page_counts.iter().take(self.position.chapter).sum();
        (before + self.position.page + 1, total)
    }
}
