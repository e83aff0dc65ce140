use libreria_core::{ApiFailure, LibraryFilters, Route};

pub const MSG_LOADING: &str = "Cargando etiquetas...";
pub const MSG_FAILED: &str = "No se pudieron cargar las categorías.";
pub const MSG_CONNECTION: &str = "Error de conexión al cargar las categorías.";
pub const MSG_EMPTY: &str = "No hay etiquetas todavía.";
pub const MSG_DELETED: &str = "Etiqueta eliminada.";
pub const MSG_DELETE_FAILED: &str = "No se pudo eliminar la etiqueta.";
pub const MSG_DELETE_CONNECTION: &str = "Error de conexión al eliminar la etiqueta.";

#[derive(Debug, Clone)]
pub struct CategoriesState {
    pub categories: Vec<String>,
    pub selected: usize,
    pub loading: bool,
    pub error: Option<String>,
    pub confirm_delete: Option<String>,
    pub notice: Option<String>,
}

impl Default for CategoriesState {
    fn default() -> Self {
        Self {
            categories: Vec::new(),
            selected: 0,
            loading: true,
            error: None,
            confirm_delete: None,
            notice: None,
        }
    }
}

impl CategoriesState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_fetch(&mut self) {
        self.loading = true;
        self.error = None;
    }

    pub fn finish_fetch(&mut self, result: Result<Vec<String>, ApiFailure>) {
        self.loading = false;
        match result {
            Ok(categories) => {
                self.categories = categories;
                self.error = None;
            }
            Err(failure) => {
                tracing::warn!(%failure, "category list failed");
                self.error = Some(if failure.is_connection() {
                    MSG_CONNECTION.to_string()
                } else {
                    MSG_FAILED.to_string()
                });
            }
        }
        self.selected = self.selected.min(self.categories.len().saturating_sub(1));
    }

    pub fn status_message(&self) -> Option<&str> {
        if self.loading {
            Some(MSG_LOADING)
        } else if let Some(error) = self.error.as_deref() {
            Some(error)
        } else if self.categories.is_empty() {
            Some(MSG_EMPTY)
        } else {
            None
        }
    }

    pub fn selected_category(&self) -> Option<&str> {
        self.categories.get(self.selected).map(String::as_str)
    }

    /// Library route filtered by the selected tag.
    pub fn route_for_selected(&self) -> Option<Route> {
        self.selected_category()
            .map(|c| Route::Library(LibraryFilters::category(c)))
    }

    pub fn select_next(&mut self) {
        if self.selected + 1 < self.categories.len() {
            self.selected += 1;
        }
    }

    pub fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn request_delete(&mut self) -> bool {
        let Some(name) = self.selected_category().map(str::to_string) else {
            return false;
        };
        self.confirm_delete = Some(name);
        true
    }

    pub fn confirm_prompt(&self) -> Option<String> {
        self.confirm_delete.as_ref().map(|name| {
            format!("¿Eliminar la etiqueta '{name}' y todos sus libros? Esta acción no se puede deshacer.")
        })
    }

    pub fn answer_confirm(&mut self, accepted: bool) -> Option<String> {
        let name = self.confirm_delete.take()?;
        accepted.then_some(name)
    }

    /// Returns true when the list should be fetched again.
    pub fn finish_delete(&mut self, name: &str, result: Result<Option<String>, ApiFailure>) -> bool {
        match result {
            Ok(message) => {
                self.notice = Some(message.unwrap_or_else(|| MSG_DELETED.to_string()));
                true
            }
            Err(failure) => {
                tracing::warn!(category = name, %failure, "category delete failed");
                self.notice = Some(if failure.is_connection() {
                    MSG_DELETE_CONNECTION.to_string()
                } else {
                    failure.detail_or(MSG_DELETE_FAILED)
                });
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded() -> CategoriesState {
        let mut state = CategoriesState::new();
        state.finish_fetch(Ok(vec!["Ensayo".to_string(), "Ciencia ficción".to_string()]));
        state
    }

    #[test]
    fn fetch_states() {
        let mut state = CategoriesState::new();
        assert_eq!(state.status_message(), Some(MSG_LOADING));
        state.finish_fetch(Err(ApiFailure::Connection));
        assert_eq!(state.status_message(), Some(MSG_CONNECTION));
        state.begin_fetch();
        state.finish_fetch(Err(ApiFailure::Status {
            status: 500,
            detail: None,
        }));
        assert_eq!(state.status_message(), Some(MSG_FAILED));
        state.begin_fetch();
        state.finish_fetch(Ok(Vec::new()));
        assert_eq!(state.status_message(), Some(MSG_EMPTY));
    }

    #[test]
    fn selecting_navigates_to_filtered_library() {
        let mut state = loaded();
        state.select_next();
        let route = state.route_for_selected().expect("selected");
        assert_eq!(route.path(), "/?category=Ciencia%20ficci%C3%B3n");
    }

    #[test]
    fn delete_asks_then_refetches_on_success() {
        let mut state = loaded();
        assert!(state.request_delete());
        assert!(state.confirm_prompt().is_some_and(|p| p.contains("'Ensayo'")));
        assert_eq!(state.answer_confirm(false), None);
        assert_eq!(state.confirm_delete, None);

        state.request_delete();
        let name = state.answer_confirm(true).expect("accepted");
        assert_eq!(name, "Ensayo");
        assert!(state.finish_delete(&name, Ok(Some("Categoría eliminada.".to_string()))));
        assert_eq!(state.notice.as_deref(), Some("Categoría eliminada."));

        assert!(!state.finish_delete(
            &name,
            Err(ApiFailure::Status {
                status: 404,
                detail: Some("Categoría no encontrada.".to_string())
            })
        ));
        assert_eq!(state.notice.as_deref(), Some("Categoría no encontrada."));
    }
}
