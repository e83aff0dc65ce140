//! In-terminal file picker, filtered by extension.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crossterm::event::{KeyCode, KeyEvent};
use libreria_application::upload::has_extension;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Entry {
    pub path: PathBuf,
    pub name: String,
    pub is_dir: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BrowserAction {
    None,
    Cancel,
    Pick(Vec<PathBuf>),
}

#[derive(Debug, Clone)]
pub(crate) struct FileBrowser {
    pub title: &'static str,
    pub dir: PathBuf,
    pub entries: Vec<Entry>,
    pub selected: usize,
    pub marked: BTreeSet<PathBuf>,
    pub error: Option<String>,
    accept: &'static [&'static str],
    multiple: bool,
}

impl FileBrowser {
    pub(crate) fn new(
        title: &'static str,
        dir: PathBuf,
        accept: &'static [&'static str],
        multiple: bool,
    ) -> Self {
        let mut browser = Self {
            title,
            dir,
            entries: Vec::new(),
            selected: 0,
            marked: BTreeSet::new(),
            error: None,
            accept,
            multiple,
        };
        browser.refresh();
        browser
    }

    pub(crate) fn accept(&self) -> &'static [&'static str] {
        self.accept
    }

    pub(crate) fn is_multiple(&self) -> bool {
        self.multiple
    }

    pub(crate) fn refresh(&mut self) {
        self.entries.clear();
        self.error = None;
        if let Some(parent) = self.dir.parent() {
            self.entries.push(Entry {
                path: parent.to_path_buf(),
                name: "..".to_string(),
                is_dir: true,
            });
        }
        match list_dir(&self.dir, self.accept) {
            Ok(entries) => self.entries.extend(entries),
            Err(err) => {
                tracing::warn!(dir = %self.dir.display(), %err, "read dir failed");
                self.error = Some(format!("No se pudo leer {}: {err}", self.dir.display()));
            }
        }
        self.selected = self.selected.min(self.entries.len().saturating_sub(1));
    }

    fn enter(&mut self, dir: PathBuf) {
        self.dir = dir;
        self.selected = 0;
        self.refresh();
    }

    pub(crate) fn handle_key(&mut self, key: KeyEvent) -> BrowserAction {
        match key.code {
            KeyCode::Esc => BrowserAction::Cancel,
            KeyCode::Down | KeyCode::Char('j') => {
                if self.selected + 1 < self.entries.len() {
                    self.selected += 1;
                }
                BrowserAction::None
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected = self.selected.saturating_sub(1);
                BrowserAction::None
            }
            KeyCode::Backspace | KeyCode::Left => {
                if let Some(parent) = self.dir.parent().map(Path::to_path_buf) {
                    self.enter(parent);
                }
                BrowserAction::None
            }
            KeyCode::Char(' ') if self.multiple => {
                if let Some(entry) = self.entries.get(self.selected)
                    && !entry.is_dir
                    && !self.marked.remove(&entry.path)
                {
                    self.marked.insert(entry.path.clone());
                }
                BrowserAction::None
            }
            KeyCode::Enter | KeyCode::Right => {
                let Some(entry) = self.entries.get(self.selected).cloned() else {
                    return BrowserAction::None;
                };
                if entry.is_dir {
                    self.enter(entry.path);
                    return BrowserAction::None;
                }
                if key.code == KeyCode::Right {
                    return BrowserAction::None;
                }
                if self.multiple && !self.marked.is_empty() {
                    return BrowserAction::Pick(self.marked.iter().cloned().collect());
                }
                BrowserAction::Pick(vec![entry.path])
            }
            _ => BrowserAction::None,
        }
    }
}

/// Directories first, then files with an accepted extension. Hidden entries
/// are skipped.
fn list_dir(dir: &Path, accept: &[&str]) -> std::io::Result<Vec<Entry>> {
    let mut dirs = Vec::new();
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        let path = entry.path();
        if path.is_dir() {
            dirs.push(Entry {
                path,
                name,
                is_dir: true,
            });
        } else if has_extension(&path, accept) {
            files.push(Entry {
                path,
                name,
                is_dir: false,
            });
        }
    }
    let by_name = |a: &Entry, b: &Entry| a.name.to_lowercase().cmp(&b.name.to_lowercase());
    dirs.sort_by(by_name);
    files.sort_by(by_name);
    dirs.extend(files);
    Ok(dirs)
}
