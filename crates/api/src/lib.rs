//! HTTP client for the library backend.

use std::path::{Path, PathBuf};
use std::time::Duration;

use libreria_core::{ApiFailure, Book, BookId, BookUpdate, ListQuery};
use reqwest::blocking::{Client, RequestBuilder, Response, multipart};
use serde::Deserialize;
use serde::de::DeserializeOwned;

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server returned {status}: {}", detail.as_deref().unwrap_or("(no detail)"))]
    Status { status: u16, detail: Option<String> },

    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ApiError {
    pub fn failure(&self) -> ApiFailure {
        match self {
            ApiError::Transport(_) | ApiError::Decode(_) => ApiFailure::Connection,
            ApiError::Status { status, detail } => ApiFailure::Status {
                status: *status,
                detail: detail.clone(),
            },
            ApiError::Io { source, .. } => ApiFailure::LocalFile(source.to_string()),
        }
    }
}

impl From<ApiError> for ApiFailure {
    fn from(err: ApiError) -> Self {
        err.failure()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadedBook {
    pub title: String,
}

#[derive(Debug, Deserialize)]
struct RagUploadResponse {
    #[serde(deserialize_with = "string_or_number")]
    book_id: String,
}

#[derive(Debug, Deserialize)]
struct RagQueryResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct ConversionResponse {
    download_url: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, serde::Serialize)]
struct RagQueryBody<'a> {
    query: &'a str,
    book_id: &'a str,
}

/// Blocking client; cheap to clone, one clone per worker thread.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(None::<Duration>)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for a server-relative path such as a cover or a download link.
    pub fn resolve(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn download_url(&self, id: BookId) -> String {
        self.resolve(&format!("/books/download/{id}"))
    }

    pub fn list_books(&self, query: &ListQuery) -> Result<Vec<Book>> {
        let request = self.http.get(self.resolve("/books/")).query(&query.pairs());
        self.json(request)
    }

    pub fn book_count(&self) -> Result<u64> {
        self.json(self.http.get(self.resolve("/books/count")))
    }

    pub fn languages(&self) -> Result<Vec<String>> {
        self.json(self.http.get(self.resolve("/languages/")))
    }

    pub fn categories(&self) -> Result<Vec<String>> {
        self.json(self.http.get(self.resolve("/categories/")))
    }

    pub fn update_book(&self, id: BookId, update: &BookUpdate) -> Result<Book> {
        let request = self.http.put(self.resolve(&format!("/books/{id}"))).json(update);
        self.json(request)
    }

    pub fn delete_book(&self, id: BookId) -> Result<()> {
        self.send(self.http.delete(self.resolve(&format!("/books/{id}"))))?;
        Ok(())
    }

    /// Removes a tag and every book carrying it; returns the server's summary.
    pub fn delete_category(&self, name: &str) -> Result<Option<String>> {
        let url = self.resolve(&format!("/categories/{}", urlencoding::encode(name)));
        let body: MessageResponse = self.json(self.http.delete(url))?;
        Ok(body.message)
    }

    pub fn send_to_kindle(&self, id: BookId) -> Result<()> {
        let url = self.resolve(&format!("/books/{id}/send-to-kindle"));
        self.send(self.http.post(url))?;
        Ok(())
    }

    pub fn download_book(&self, id: BookId) -> Result<Vec<u8>> {
        self.bytes(self.http.get(self.download_url(id)))
    }

    /// Fetches any server resource by relative path or absolute URL.
    pub fn fetch(&self, path: &str) -> Result<Vec<u8>> {
        self.bytes(self.http.get(self.resolve(path)))
    }

    pub fn upload_book(&self, path: &Path) -> Result<UploadedBook> {
        let form = file_form("book_file", path)?;
        let request = self.http.post(self.resolve("/upload-book/")).multipart(form);
        self.json(request)
    }

    /// Returns the session id the RAG backend assigned to the book.
    pub fn rag_upload(&self, path: &Path) -> Result<String> {
        let form = file_form("file", path)?;
        let request = self.http.post(self.resolve("/rag/upload-book/")).multipart(form);
        let body: RagUploadResponse = self.json(request)?;
        Ok(body.book_id)
    }

    pub fn rag_query(&self, query: &str, book_id: &str) -> Result<String> {
        let request = self
            .http
            .post(self.resolve("/rag/query/"))
            .json(&RagQueryBody { query, book_id });
        let body: RagQueryResponse = self.json(request)?;
        Ok(body.response)
    }

    /// Returns the server-relative link of the converted PDF.
    pub fn convert_epub_to_pdf(&self, path: &Path) -> Result<String> {
        let form = file_form("file", path)?;
        let request = self
            .http
            .post(self.resolve("/tools/convert-epub-to-pdf"))
            .multipart(form);
        let body: ConversionResponse = self.json(request)?;
        Ok(body.download_url)
    }

    fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send()?;
        let status = response.status();
        tracing::debug!(url = %response.url(), status = status.as_u16(), "api response");
        if status.is_success() {
            return Ok(response);
        }
        let body = response.bytes().unwrap_or_default();
        Err(ApiError::Status {
            status: status.as_u16(),
            detail: parse_detail(&body),
        })
    }

    fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let body = self.send(request)?.bytes()?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn bytes(&self, request: RequestBuilder) -> Result<Vec<u8>> {
        Ok(self.send(request)?.bytes()?.to_vec())
    }
}

fn file_form(field: &'static str, path: &Path) -> Result<multipart::Form> {
    multipart::Form::new()
        .file(field, path)
        .map_err(|source| ApiError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Extracts `detail` from an error body. Validation errors carry a list; those
/// are kept as their JSON text.
fn parse_detail(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    match value.get("detail")? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number book_id, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_is_read_from_json_body() {
        assert_eq!(
            parse_detail(br#"{"detail":"Libro no encontrado."}"#).as_deref(),
            Some("Libro no encontrado.")
        );
        assert_eq!(parse_detail(b"<html>boom</html>"), None);
        assert_eq!(parse_detail(br#"{"detail":null}"#), None);
        assert_eq!(
            parse_detail(br#"{"detail":[{"msg":"field required"}]}"#).as_deref(),
            Some(r#"[{"msg":"field required"}]"#)
        );
    }

    #[test]
    fn rag_book_id_accepts_numbers_and_strings() -> anyhow::Result<()> {
        let body: RagUploadResponse = serde_json::from_str(r#"{"book_id":7}"#)?;
        assert_eq!(body.book_id, "7");
        let body: RagUploadResponse =
            serde_json::from_str(r#"{"book_id":"0b9c","message":"ok"}"#)?;
        assert_eq!(body.book_id, "0b9c");
        assert!(serde_json::from_str::<RagUploadResponse>(r#"{"book_id":[]}"#).is_err());
        Ok(())
    }

    #[test]
    fn resolve_joins_relative_paths() -> anyhow::Result<()> {
        let client = ApiClient::new("http://nas:8001/")?;
        assert_eq!(client.base_url(), "http://nas:8001");
        assert_eq!(
            client.resolve("/temp_books/x.pdf"),
            "http://nas:8001/temp_books/x.pdf"
        );
        assert_eq!(
            client.resolve("static/covers/1.jpg"),
            "http://nas:8001/static/covers/1.jpg"
        );
        assert_eq!(client.resolve("https://cdn/x.png"), "https://cdn/x.png");
        assert_eq!(
            client.download_url(BookId(9)),
            "http://nas:8001/books/download/9"
        );
        Ok(())
    }

    #[test]
    fn errors_map_to_failures() {
        let err = ApiError::Status {
            status: 400,
            detail: Some("El archivo debe ser un EPUB.".to_string()),
        };
        assert_eq!(
            err.failure(),
            ApiFailure::Status {
                status: 400,
                detail: Some("El archivo debe ser un EPUB.".to_string())
            }
        );
        let err = ApiError::Io {
            path: PathBuf::from("/nope"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert!(matches!(err.failure(), ApiFailure::LocalFile(_)));
        let decode = serde_json::from_str::<u64>("x").unwrap_err();
        assert_eq!(ApiError::from(decode).failure(), ApiFailure::Connection);
    }
}
