use std::path::{Path, PathBuf};

use libreria_core::{ApiFailure, UploadItem, UploadStatus};

pub const ACCEPTED_EXTENSIONS: &[&str] = &["pdf", "epub"];

pub const MSG_UPLOADING: &str = "Subiendo y analizando...";
pub const MSG_UPLOAD_FALLBACK: &str = "No se pudo procesar";
pub const MSG_UPLOAD_CONNECTION: &str = "Error de conexión con el servidor.";

/// Splits pasted text into paths. Terminals paste dropped files as
/// shell-quoted words or `file://` URIs, one or more per line.
pub fn parse_dropped_paths(text: &str) -> Vec<PathBuf> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                in_word = true;
            }
            (None, '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(current);
    }

    words
        .into_iter()
        .filter(|w| !w.is_empty())
        .map(|w| match w.strip_prefix("file://") {
            Some(uri) => match urlencoding::decode(uri) {
                Ok(decoded) => PathBuf::from(decoded.into_owned()),
                Err(_) => PathBuf::from(uri),
            },
            None => PathBuf::from(w),
        })
        .collect()
}

pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

/// Batch upload queue, processed strictly one item at a time.
#[derive(Debug, Clone, Default)]
pub struct UploadQueue {
    pub items: Vec<UploadItem>,
    pub selected: usize,
    running: bool,
    cursor: usize,
}

impl UploadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends every path as a pending item; no dedup, no validation.
    pub fn add_files<I, P>(&mut self, paths: I) -> usize
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let before = self.items.len();
        self.items
            .extend(paths.into_iter().map(UploadItem::pending));
        self.items.len() - before
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn can_start(&self) -> bool {
        !self.running && self.items.iter().any(|i| i.status == UploadStatus::Pending)
    }

    /// Starts a run and returns the first item to send.
    pub fn start(&mut self) -> Option<(usize, PathBuf)> {
        if !self.can_start() {
            return None;
        }
        self.running = true;
        self.cursor = 0;
        self.advance()
    }

    /// Marks the next pending item as uploading. Ends the run when none is left.
    pub fn advance(&mut self) -> Option<(usize, PathBuf)> {
        if !self.running {
            return None;
        }
        while self.cursor < self.items.len() {
            let index = self.cursor;
            self.cursor += 1;
            let item = &mut self.items[index];
            if item.status != UploadStatus::Pending {
                continue;
            }
            item.status = UploadStatus::Uploading;
            item.message = MSG_UPLOADING.to_string();
            return Some((index, item.path.clone()));
        }
        self.running = false;
        None
    }

    pub fn complete(&mut self, index: usize, result: Result<String, ApiFailure>) {
        let Some(item) = self.items.get_mut(index) else {
            return;
        };
        match result {
            Ok(title) => {
                item.status = UploadStatus::Success;
                item.message = format!("'{title}' añadido correctamente.");
            }
            Err(failure) => {
                tracing::warn!(file = %item.name, %failure, "upload failed");
                item.status = UploadStatus::Error;
                item.message = match failure {
                    ApiFailure::Connection => MSG_UPLOAD_CONNECTION.to_string(),
                    ApiFailure::LocalFile(reason) => format!("Error: {reason}"),
                    other => format!("Error: {}", other.detail_or(MSG_UPLOAD_FALLBACK)),
                };
            }
        }
    }

    /// True once there is at least one item and every item is terminal.
    pub fn all_done(&self) -> bool {
        !self.items.is_empty() && self.items.iter().all(|i| i.status.is_terminal())
    }

    pub fn select_next(&mut self) {
        if self.selected + 1 < self.items.len() {
            self.selected += 1;
        }
    }

    pub fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pasted_paths_are_split_like_a_shell() {
        let paths = parse_dropped_paths(
            "'/tmp/Cien años.epub' /tmp/My\\ Book.pdf\nfile:///home/ana/El%20Aleph.epub \"/x/y.pdf\"\n",
        );
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/tmp/Cien años.epub"),
                PathBuf::from("/tmp/My Book.pdf"),
                PathBuf::from("/home/ana/El Aleph.epub"),
                PathBuf::from("/x/y.pdf"),
            ]
        );
        assert!(parse_dropped_paths("  \n ").is_empty());
    }

    #[test]
    fn extension_filter_ignores_case() {
        assert!(has_extension(Path::new("/a/B.PDF"), ACCEPTED_EXTENSIONS));
        assert!(has_extension(Path::new("b.epub"), ACCEPTED_EXTENSIONS));
        assert!(!has_extension(Path::new("c.mobi"), ACCEPTED_EXTENSIONS));
        assert!(!has_extension(Path::new("epub"), ACCEPTED_EXTENSIONS));
    }

    #[test]
    fn uploads_run_one_at_a_time_in_order() {
        let mut queue = UploadQueue::new();
        assert_eq!(queue.add_files(["/a.pdf", "/b.epub", "/a.pdf"]), 3);
        assert!(!queue.all_done());

        let (first, path) = queue.start().expect("first");
        assert_eq!((first, path), (0, PathBuf::from("/a.pdf")));
        assert_eq!(queue.items[0].status, UploadStatus::Uploading);
        assert_eq!(queue.items[0].message, MSG_UPLOADING);
        assert_eq!(queue.items[1].status, UploadStatus::Pending);
        assert!(queue.start().is_none(), "already running");

        queue.complete(first, Ok("Dune".to_string()));
        assert_eq!(queue.items[0].message, "'Dune' añadido correctamente.");

        let (second, _) = queue.advance().expect("second");
        queue.complete(
            second,
            Err(ApiFailure::Status {
                status: 400,
                detail: Some("Formato no soportado".to_string()),
            }),
        );
        assert_eq!(queue.items[1].message, "Error: Formato no soportado");

        let (third, _) = queue.advance().expect("third");
        queue.complete(third, Err(ApiFailure::Connection));
        assert_eq!(queue.items[2].message, MSG_UPLOAD_CONNECTION);

        assert!(queue.advance().is_none());
        assert!(!queue.is_running());
        assert!(queue.all_done());
    }

    #[test]
    fn items_added_during_a_run_are_picked_up() {
        let mut queue = UploadQueue::new();
        queue.add_files(["/a.pdf"]);
        let (index, _) = queue.start().expect("first");
        queue.add_files(["/b.pdf"]);
        queue.complete(
            index,
            Err(ApiFailure::Status {
                status: 500,
                detail: None,
            }),
        );
        assert_eq!(queue.items[0].message, "Error: No se pudo procesar");
        let (index, path) = queue.advance().expect("appended item");
        assert_eq!((index, path), (1, PathBuf::from("/b.pdf")));
    }

    #[test]
    fn finished_items_are_not_resent() {
        let mut queue = UploadQueue::new();
        queue.add_files(["/a.pdf"]);
        let (index, _) = queue.start().expect("first");
        queue.complete(index, Ok("A".to_string()));
        assert!(queue.advance().is_none());
        assert!(!queue.can_start());

        queue.add_files(["/b.pdf"]);
        assert!(!queue.all_done());
        let (index, _) = queue.start().expect("new run");
        assert_eq!(index, 1);
        assert_eq!(queue.items[0].status, UploadStatus::Success);
    }
}
