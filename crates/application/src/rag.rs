use std::path::PathBuf;

use libreria_core::{ApiFailure, ChatMessage};

pub const ACCEPTED_EXTENSIONS: &[&str] = &["pdf", "epub"];

pub const MSG_NO_FILE: &str = "Por favor, selecciona un archivo PDF o EPUB primero.";
pub const MSG_PROCESSING: &str = "Procesando libro para RAG... Esto puede tardar un momento.";
pub const MSG_READY: &str = "Libro procesado exitosamente. ¡Ahora puedes hacer preguntas!";
pub const MSG_UPLOAD_FALLBACK: &str = "No se pudo procesar el libro para RAG.";
pub const MSG_UPLOAD_CONNECTION: &str = "Error de conexión: No se pudo conectar con el backend.";
pub const MSG_QUERY_FALLBACK: &str = "No se pudo obtener respuesta.";
pub const MSG_QUERY_CONNECTION: &str = "Error de conexión al consultar.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RagQuery {
    pub query: String,
    pub book_id: String,
}

/// One chat session against a single processed book.
#[derive(Debug, Clone, Default)]
pub struct RagSession {
    pub selected_file: Option<PathBuf>,
    pub message: Option<String>,
    pub loading: bool,
    book_id: Option<String>,
    pub history: Vec<ChatMessage>,
    pub query: String,
}

impl RagSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn book_id(&self) -> Option<&str> {
        self.book_id.as_deref()
    }

    pub fn select_file(&mut self, path: PathBuf) {
        self.selected_file = Some(path);
        self.message = None;
    }

    pub fn begin_upload(&mut self) -> Option<PathBuf> {
        if self.loading {
            return None;
        }
        let Some(path) = self.selected_file.clone() else {
            self.message = Some(MSG_NO_FILE.to_string());
            return None;
        };
        self.loading = true;
        self.message = Some(MSG_PROCESSING.to_string());
        Some(path)
    }

    /// A new session replaces the old one; a failure leaves it in place.
    /// Either way the picked file is consumed.
    pub fn finish_upload(&mut self, result: Result<String, ApiFailure>) {
        self.loading = false;
        self.selected_file = None;
        match result {
            Ok(book_id) => {
                tracing::info!(%book_id, "rag session ready");
                self.book_id = Some(book_id);
                self.history.clear();
                self.message = Some(MSG_READY.to_string());
            }
            Err(failure) => {
                tracing::warn!(%failure, "rag upload failed");
                self.message = Some(match failure {
                    ApiFailure::Connection => MSG_UPLOAD_CONNECTION.to_string(),
                    ApiFailure::LocalFile(reason) => format!("Error: {reason}"),
                    other => format!("Error: {}", other.detail_or(MSG_UPLOAD_FALLBACK)),
                });
            }
        }
    }

    pub fn can_query(&self) -> bool {
        self.book_id.is_some() && !self.loading
    }

    /// Appends the user's turn right away.
    pub fn begin_query(&mut self) -> Option<RagQuery> {
        if !self.can_query() || self.query.trim().is_empty() {
            return None;
        }
        let book_id = self.book_id.clone()?;
        let query = std::mem::take(&mut self.query);
        self.history.push(ChatMessage::user(query.clone()));
        self.loading = true;
        Some(RagQuery { query, book_id })
    }

    pub fn finish_query(&mut self, result: Result<String, ApiFailure>) {
        self.loading = false;
        let text = match result {
            Ok(answer) => answer,
            Err(ApiFailure::Connection) => MSG_QUERY_CONNECTION.to_string(),
            Err(failure) => {
                tracing::warn!(%failure, "rag query failed");
                format!("Error: {}", failure.detail_or(MSG_QUERY_FALLBACK))
            }
        };
        self.history.push(ChatMessage::assistant(text));
    }
}
