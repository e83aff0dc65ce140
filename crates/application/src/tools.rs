use std::path::{Path, PathBuf};

use libreria_core::ApiFailure;

use crate::upload::has_extension;

pub const ACCEPTED_EXTENSIONS: &[&str] = &["epub"];

pub const MSG_NO_FILE: &str = "Por favor, selecciona un archivo EPUB primero.";
pub const MSG_NOT_EPUB: &str = "El archivo seleccionado no es un EPUB.";
pub const MSG_CONVERTING: &str = "Convirtiendo archivo... Esto puede tardar un momento.";
pub const MSG_DONE: &str = "¡Conversión completada! La descarga debería iniciarse.";
pub const MSG_FALLBACK: &str = "No se pudo procesar el archivo.";
pub const MSG_CONNECTION: &str = "Error de conexión: No se pudo conectar con el backend.";
pub const MSG_DOWNLOAD_FAILED: &str = "No se pudo descargar el PDF convertido.";

/// EPUB to PDF conversion of a single file.
#[derive(Debug, Clone, Default)]
pub struct ConvertTool {
    pub selected_file: Option<PathBuf>,
    pub message: Option<String>,
    pub loading: bool,
}

impl ConvertTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects anything that is not an `.epub` before a request is made.
    pub fn select_file(&mut self, path: PathBuf) -> bool {
        if !has_extension(&path, ACCEPTED_EXTENSIONS) {
            self.selected_file = None;
            self.message = Some(MSG_NOT_EPUB.to_string());
            return false;
        }
        self.selected_file = Some(path);
        self.message = None;
        true
    }

    pub fn begin_convert(&mut self) -> Option<PathBuf> {
        if self.loading {
            return None;
        }
        let Some(path) = self.selected_file.clone() else {
            self.message = Some(MSG_NO_FILE.to_string());
            return None;
        };
        self.loading = true;
        self.message = Some(MSG_CONVERTING.to_string());
        Some(path)
    }

    /// Returns the link to download on success. The selection is cleared
    /// either way.
    pub fn finish_convert(&mut self, result: Result<String, ApiFailure>) -> Option<String> {
        self.loading = false;
        self.selected_file = None;
        match result {
            Ok(link) => {
                self.message = Some(MSG_DONE.to_string());
                Some(link)
            }
            Err(failure) => {
                tracing::warn!(%failure, "conversion failed");
                self.message = Some(match failure {
                    ApiFailure::Connection => MSG_CONNECTION.to_string(),
                    ApiFailure::LocalFile(reason) => format!("Error: {reason}"),
                    other => format!("Error: {}", other.detail_or(MSG_FALLBACK)),
                });
                None
            }
        }
    }

    pub fn finish_download(&mut self, result: Result<PathBuf, String>) {
        self.message = Some(match result {
            Ok(saved) => format!("{MSG_DONE} Guardado en {}", saved.display()),
            Err(reason) => {
                tracing::warn!(%reason, "converted pdf download failed");
                MSG_DOWNLOAD_FAILED.to_string()
            }
        });
    }
}

/// File name for a downloaded conversion, taken from its link.
pub fn download_name(link: &str) -> String {
    let path = link.split(['?', '#']).next().unwrap_or(link);
    let name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = urlencoding::decode(&name)
        .map(|n| n.into_owned())
        .unwrap_or(name);
    if name.is_empty() {
        "convertido.pdf".to_string()
    } else {
        name
    }
}
