//! Core domain types for Librería.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const DEFAULT_API_URL: &str = "http://localhost:8001";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookId(pub i64);

impl fmt::Display for BookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for BookId {
    type Err = std::num::ParseIntError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value.trim().parse::<i64>().map(BookId)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub author: String,
    pub category: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub is_read: bool,
    pub file_path: String,
    #[serde(default)]
    pub cover_image_url: Option<String>,
}

impl Book {
    pub fn is_pdf(&self) -> bool {
        self.file_path.to_lowercase().ends_with(".pdf")
    }

    /// Letter shown on the generated cover placeholder.
    pub fn cover_initial(&self) -> char {
        cover_initial(&self.title)
    }
}

pub fn cover_initial(title: &str) -> char {
    title
        .trim()
        .chars()
        .next()
        .and_then(|c| c.to_uppercase().next())
        .unwrap_or('?')
}

pub fn format_rating(rating: f64) -> String {
    format!("{rating}/10")
}

/// Full replacement payload for `PUT /books/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookUpdate {
    pub title: String,
    pub author: String,
    pub category: String,
    pub description: String,
    pub rating: Option<f64>,
    pub is_read: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryFilters {
    pub category: Option<String>,
    pub author: Option<String>,
    pub language: Option<String>,
}

impl LibraryFilters {
    pub fn category(name: impl Into<String>) -> Self {
        Self {
            category: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn author(name: impl Into<String>) -> Self {
        Self {
            author: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn language(name: impl Into<String>) -> Self {
        Self {
            language: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.category.is_none() && self.author.is_none() && self.language.is_none()
    }
}

/// Query for `GET /books/`. `search` and `language` are never both set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub author: Option<String>,
    pub language: Option<String>,
}

impl ListQuery {
    pub fn new(filters: &LibraryFilters, search: &str) -> Self {
        let mut query = ListQuery {
            category: non_empty(filters.category.as_deref()),
            author: non_empty(filters.author.as_deref()),
            ..ListQuery::default()
        };
        if let Some(language) = non_empty(filters.language.as_deref()) {
            query.language = Some(language);
        } else {
            query.search = non_empty(Some(search));
        }
        query
    }

    pub fn pairs(&self) -> Vec<(&'static str, &str)> {
        let mut out = Vec::new();
        if let Some(category) = self.category.as_deref() {
            out.push(("category", category));
        }
        if let Some(author) = self.author.as_deref() {
            out.push(("author", author));
        }
        if let Some(language) = self.language.as_deref() {
            out.push(("language", language));
        }
        if let Some(search) = self.search.as_deref() {
            out.push(("search", search));
        }
        out
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Library(LibraryFilters),
    Upload,
    Categories,
    Tools,
    Rag,
    Reader(BookId),
}

impl Default for Route {
    fn default() -> Self {
        Route::Library(LibraryFilters::default())
    }
}

/// Routes reachable from the navigation bar, in display order.
pub const NAV_ROUTES: [NavEntry; 5] = [
    NavEntry::Library,
    NavEntry::Upload,
    NavEntry::Categories,
    NavEntry::Tools,
    NavEntry::Rag,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavEntry {
    Library,
    Upload,
    Categories,
    Tools,
    Rag,
}

impl NavEntry {
    pub fn label(&self) -> &'static str {
        match self {
            NavEntry::Library => "Mi Biblioteca",
            NavEntry::Upload => "Añadir Libro",
            NavEntry::Categories => "Etiquetas",
            NavEntry::Tools => "Herramientas",
            NavEntry::Rag => "Charla sobre libros con la IA",
        }
    }

    pub fn route(&self) -> Route {
        match self {
            NavEntry::Library => Route::default(),
            NavEntry::Upload => Route::Upload,
            NavEntry::Categories => Route::Categories,
            NavEntry::Tools => Route::Tools,
            NavEntry::Rag => Route::Rag,
        }
    }
}

impl Route {
    pub fn parse(path: &str) -> Option<Route> {
        let path = path.trim();
        let (base, query) = match path.split_once('?') {
            Some((base, query)) => (base, Some(query)),
            None => (path, None),
        };
        let base = base.trim_end_matches('/');

        match base {
            "" => Some(Route::Library(parse_filters(query.unwrap_or("")))),
            "/upload" => Some(Route::Upload),
            "/etiquetas" => Some(Route::Categories),
            "/herramientas" => Some(Route::Tools),
            "/rag" => Some(Route::Rag),
            other => {
                let id = other.strip_prefix("/leer/")?;
                id.parse::<BookId>().ok().map(Route::Reader)
            }
        }
    }

    pub fn path(&self) -> String {
        match self {
            Route::Library(filters) => {
                let mut params = Vec::new();
                for (key, value) in [
                    ("category", &filters.category),
                    ("author", &filters.author),
                    ("language", &filters.language),
                ] {
                    if let Some(value) = value {
                        params.push(format!("{key}={}", urlencoding::encode(value)));
                    }
                }
                if params.is_empty() {
                    "/".to_string()
                } else {
                    format!("/?{}", params.join("&"))
                }
            }
            Route::Upload => "/upload".to_string(),
            Route::Categories => "/etiquetas".to_string(),
            Route::Tools => "/herramientas".to_string(),
            Route::Rag => "/rag".to_string(),
            Route::Reader(id) => format!("/leer/{id}"),
        }
    }

    pub fn nav_entry(&self) -> Option<NavEntry> {
        match self {
            Route::Library(_) => Some(NavEntry::Library),
            Route::Upload => Some(NavEntry::Upload),
            Route::Categories => Some(NavEntry::Categories),
            Route::Tools => Some(NavEntry::Tools),
            Route::Rag => Some(NavEntry::Rag),
            Route::Reader(_) => None,
        }
    }
}

fn parse_filters(query: &str) -> LibraryFilters {
    let mut filters = LibraryFilters::default();
    for pair in query.split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        let value = value.replace('+', " ");
        let value = match urlencoding::decode(&value) {
            Ok(v) => v.into_owned(),
            Err(_) => value,
        };
        if value.is_empty() {
            continue;
        }
        match key {
            "category" => filters.category = Some(value),
            "author" => filters.author = Some(value),
            "language" => filters.language = Some(value),
            _ => {}
        }
    }
    filters
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Pending,
    Uploading,
    Success,
    Error,
}

impl UploadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Success | UploadStatus::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Success => "success",
            UploadStatus::Error => "error",
        }
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadItem {
    pub path: PathBuf,
    pub name: String,
    pub status: UploadStatus,
    pub message: String,
}

impl UploadItem {
    pub fn pending(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = file_name(&path);
        Self {
            path,
            name,
            status: UploadStatus::Pending,
            message: String::new(),
        }
    }
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Assistant,
}

impl Sender {
    pub fn label(&self) -> &'static str {
        match self {
            Sender::User => "Tú",
            Sender::Assistant => "Gemini",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub sender: Sender,
    pub text: String,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Assistant,
            text: text.into(),
        }
    }
}

/// How a request failed, as far as a view cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiFailure {
    /// Server unreachable, or a body that could not be decoded.
    Connection,
    /// Non-success status, with the server's `detail` when it sent one.
    Status { status: u16, detail: Option<String> },
    /// The local file to send could not be read.
    LocalFile(String),
}

impl ApiFailure {
    pub fn detail(&self) -> Option<&str> {
        match self {
            ApiFailure::Status { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }

    pub fn detail_or(&self, fallback: &str) -> String {
        self.detail().unwrap_or(fallback).to_string()
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, ApiFailure::Connection)
    }
}

impl fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiFailure::Connection => f.write_str("connection failure"),
            ApiFailure::Status {
                status,
                detail: Some(detail),
            } => write!(f, "status {status}: {detail}"),
            ApiFailure::Status { status, detail: None } => write!(f, "status {status}"),
            ApiFailure::LocalFile(reason) => write!(f, "local file: {reason}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Theme {
    type Err = &'static str;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            _ => Err("unknown theme"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_url: String,
    pub download_dir: String,
    pub theme: Theme,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            download_dir: String::new(),
            theme: Theme::Dark,
        }
    }
}

impl Settings {
    pub fn normalize(&mut self) {
        let url = self.api_url.trim().trim_end_matches('/');
        self.api_url = if url.is_empty() {
            DEFAULT_API_URL.to_string()
        } else {
            url.to_string()
        };
        self.download_dir = self.download_dir.trim().to_string();
    }

    pub fn cycle_theme(&mut self) {
        self.theme = match self.theme {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        };
    }
}
