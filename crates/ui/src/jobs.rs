//! Background jobs for everything that talks to the backend or the disk.
//!
//! Jobs run on the blocking pool of a small tokio runtime and report back
//! through one channel that the event loop drains every tick. Deliveries carry
//! the navigation epoch they were issued under so the loop can drop results
//! for views that are gone.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libreria_api::ApiClient;
use libreria_core::{ApiFailure, Book, BookId, BookUpdate, ListQuery};
use libreria_engine::EpubBook;
use tokio::runtime::{self, Runtime};
use tokio::sync::Semaphore;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Upper bound on threads running jobs at once.
pub(crate) const MAX_WORKERS: usize = 8;
/// Cover downloads share this many workers; the rest stay free for user actions.
pub(crate) const COVER_FETCHES: usize = 2;

#[derive(Debug)]
pub(crate) enum Job {
    ListBooks { ticket: u64, query: ListQuery },
    Languages,
    Count,
    Categories,
    DeleteBook(BookId),
    DeleteCategory(String),
    SendToKindle(BookId),
    UpdateBook { id: BookId, update: BookUpdate },
    Upload { index: usize, path: PathBuf },
    RagUpload(PathBuf),
    RagQuery { query: String, book_id: String },
    Convert(PathBuf),
    SaveLink { link: String, dir: PathBuf },
    DownloadBook { id: BookId, name: String, dir: PathBuf },
    OpenPdf { id: BookId, name: String },
    LoadReader(BookId),
    Cover(String),
}

#[derive(Debug)]
pub(crate) enum Outcome {
    Books {
        ticket: u64,
        result: Result<Vec<Book>, ApiFailure>,
    },
    Languages(Result<Vec<String>, ApiFailure>),
    Count(Result<u64, ApiFailure>),
    Categories(Result<Vec<String>, ApiFailure>),
    BookDeleted {
        id: BookId,
        result: Result<(), ApiFailure>,
    },
    CategoryDeleted {
        name: String,
        result: Result<Option<String>, ApiFailure>,
    },
    KindleSent {
        id: BookId,
        result: Result<(), ApiFailure>,
    },
    BookUpdated(Result<Book, ApiFailure>),
    Uploaded {
        index: usize,
        result: Result<String, ApiFailure>,
    },
    RagUploaded(Result<String, ApiFailure>),
    RagAnswered(Result<String, ApiFailure>),
    Converted(Result<String, ApiFailure>),
    LinkSaved(Result<PathBuf, String>),
    BookSaved(Result<PathBuf, String>),
    PdfOpened(Result<PathBuf, String>),
    ReaderLoaded(Result<EpubBook, String>),
    Cover {
        url: String,
        image: Option<image::DynamicImage>,
    },
}

impl Outcome {
    /// Header and cover results are shared by every view.
    pub(crate) fn outlives_view(&self) -> bool {
        matches!(self, Outcome::Count(_) | Outcome::Cover { .. })
    }
}

#[derive(Debug)]
pub(crate) struct Delivery {
    pub epoch: u64,
    pub outcome: Outcome,
}

impl Job {
    /// What the view receives if the job dies without answering.
    fn lost_outcome(&self) -> Option<Outcome> {
        match self {
            Job::Count => Some(Outcome::Count(Err(ApiFailure::Connection))),
            Job::ListBooks { ticket, .. } => Some(Outcome::Books {
                ticket: *ticket,
                result: Err(ApiFailure::Connection),
            }),
            Job::Categories => Some(Outcome::Categories(Err(ApiFailure::Connection))),
            Job::Cover(url) => Some(Outcome::Cover {
                url: url.clone(),
                image: None,
            }),
            _ => None,
        }
    }
}

pub(crate) struct Jobs {
    client: ApiClient,
    runtime: Option<Runtime>,
    covers: Arc<Semaphore>,
    tx: UnboundedSender<Delivery>,
    rx: UnboundedReceiver<Delivery>,
}

impl Jobs {
    pub(crate) fn new(client: ApiClient) -> io::Result<Self> {
        let runtime = runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(MAX_WORKERS)
            .thread_name("libreria-job")
            .build()?;
        let (tx, rx) = mpsc::unbounded_channel();
        Ok(Self {
            client,
            runtime: Some(runtime),
            covers: Arc::new(Semaphore::new(COVER_FETCHES)),
            tx,
            rx,
        })
    }

    pub(crate) fn client(&self) -> &ApiClient {
        &self.client
    }

    pub(crate) fn spawn(&self, epoch: u64, job: Job) {
        tracing::debug!(epoch, ?job, "spawn job");
        let gate = matches!(job, Job::Cover(_)).then(|| Arc::clone(&self.covers));
        let lost = job.lost_outcome();
        let client = self.client.clone();
        self.dispatch(epoch, gate, lost, move || run_job(&client, job));
    }

    fn dispatch<F>(
        &self,
        epoch: u64,
        gate: Option<Arc<Semaphore>>,
        lost: Option<Outcome>,
        work: F,
    ) where
        F: FnOnce() -> Outcome + Send + 'static,
    {
        let Some(runtime) = self.runtime.as_ref() else {
            return;
        };
        let tx = self.tx.clone();
        runtime.spawn(async move {
            let _permit = match gate {
                Some(gate) => match gate.acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(_) => return,
                },
                None => None,
            };
            let outcome = match tokio::task::spawn_blocking(work).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::error!(%err, "job died");
                    match lost {
                        Some(outcome) => outcome,
                        None => return,
                    }
                }
            };
            // The receiver is gone only when the UI is shutting down.
            let _ = tx.send(Delivery { epoch, outcome });
        });
    }

    pub(crate) fn try_recv(&mut self) -> Option<Delivery> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Jobs {
    fn drop(&mut self) {
        // Uploads may still be running; quitting must not wait for them.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

fn run_job(client: &ApiClient, job: Job) -> Outcome {
    match job {
        Job::ListBooks { ticket, query } => Outcome::Books {
            ticket,
            result: client.list_books(&query).map_err(Into::into),
        },
        Job::Languages => Outcome::Languages(client.languages().map_err(Into::into)),
        Job::Count => Outcome::Count(client.book_count().map_err(Into::into)),
        Job::Categories => Outcome::Categories(client.categories().map_err(Into::into)),
        Job::DeleteBook(id) => Outcome::BookDeleted {
            id,
            result: client.delete_book(id).map_err(Into::into),
        },
        Job::DeleteCategory(name) => {
            let result = client.delete_category(&name).map_err(Into::into);
            Outcome::CategoryDeleted { name, result }
        }
        Job::SendToKindle(id) => Outcome::KindleSent {
            id,
            result: client.send_to_kindle(id).map_err(Into::into),
        },
        Job::UpdateBook { id, update } => {
            Outcome::BookUpdated(client.update_book(id, &update).map_err(Into::into))
        }
        Job::Upload { index, path } => Outcome::Uploaded {
            index,
            result: client
                .upload_book(&path)
                .map(|uploaded| uploaded.title)
                .map_err(Into::into),
        },
        Job::RagUpload(path) => Outcome::RagUploaded(client.rag_upload(&path).map_err(Into::into)),
        Job::RagQuery { query, book_id } => {
            Outcome::RagAnswered(client.rag_query(&query, &book_id).map_err(Into::into))
        }
        Job::Convert(path) => {
            Outcome::Converted(client.convert_epub_to_pdf(&path).map_err(Into::into))
        }
        Job::SaveLink { link, dir } => {
            let name = libreria_application::tools::download_name(&link);
            let result = client
                .fetch(&link)
                .map_err(|err| err.to_string())
                .and_then(|bytes| save_bytes(&dir, &name, &bytes).map_err(|err| err.to_string()));
            Outcome::LinkSaved(result)
        }
        Job::DownloadBook { id, name, dir } => {
            let result = client
                .download_book(id)
                .map_err(|err| err.to_string())
                .and_then(|bytes| save_bytes(&dir, &name, &bytes).map_err(|err| err.to_string()));
            Outcome::BookSaved(result)
        }
        Job::OpenPdf { id, name } => {
            let path = std::env::temp_dir().join(format!("libreria-{id}-{name}"));
            let result = client
                .download_book(id)
                .map_err(|err| err.to_string())
                .and_then(|bytes| fs::write(&path, bytes).map_err(|err| err.to_string()))
                .and_then(|()| open::that(&path).map_err(|err| err.to_string()))
                .map(|()| path);
            Outcome::PdfOpened(result)
        }
        Job::LoadReader(id) => {
            let result = client
                .download_book(id)
                .map_err(|err| err.to_string())
                .and_then(|bytes| EpubBook::parse(&bytes).map_err(|err| format!("{err:#}")));
            Outcome::ReaderLoaded(result)
        }
        Job::Cover(url) => {
            let image = match client.fetch(&url) {
                Ok(bytes) => match image::load_from_memory(&bytes) {
                    Ok(image) => Some(image),
                    Err(err) => {
                        tracing::debug!(%url, %err, "cover decode failed");
                        None
                    }
                },
                Err(err) => {
                    tracing::debug!(%url, %err, "cover fetch failed");
                    None
                }
            };
            Outcome::Cover { url, image }
        }
    }
}

/// Writes `bytes` into `dir` without clobbering an existing file.
pub(crate) fn save_bytes(dir: &Path, name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = unique_path(dir, name);
    fs::write(&path, bytes)?;
    Ok(path)
}

fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };
    (1..)
        .map(|n| match ext {
            Some(ext) => dir.join(format!("{stem} ({n}).{ext}")),
            None => dir.join(format!("{stem} ({n})")),
        })
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[test]
    fn save_bytes_never_overwrites() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let first = save_bytes(dir.path(), "libro.pdf", b"1")?;
        let second = save_bytes(dir.path(), "libro.pdf", b"2")?;
        let third = save_bytes(dir.path(), "libro.pdf", b"3")?;
        assert_eq!(first, dir.path().join("libro.pdf"));
        assert_eq!(second, dir.path().join("libro (1).pdf"));
        assert_eq!(third, dir.path().join("libro (2).pdf"));
        assert_eq!(fs::read(&first)?, b"1");
        assert_eq!(fs::read(&third)?, b"3");
        Ok(())
    }

    #[test]
    fn save_bytes_creates_missing_dir() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let nested = dir.path().join("a").join("b");
        let path = save_bytes(&nested, "notas", b"x")?;
        assert_eq!(path, nested.join("notas"));
        save_bytes(&nested, "notas", b"y")?;
        assert!(nested.join("notas (1)").exists());
        Ok(())
    }

    #[test]
    fn only_shared_outcomes_outlive_views() {
        assert!(Outcome::Count(Ok(1)).outlives_view());
        assert!(Outcome::Cover {
            url: "x".to_string(),
            image: None
        }
        .outlives_view());
        assert!(!Outcome::Languages(Ok(Vec::new())).outlives_view());
    }

    fn test_jobs() -> anyhow::Result<Jobs> {
        let client = ApiClient::new("http://127.0.0.1:9")?;
        Ok(Jobs::new(client)?)
    }

    fn collect(jobs: &mut Jobs, expected: usize) -> Vec<Delivery> {
        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        let mut got = Vec::new();
        while got.len() < expected && std::time::Instant::now() < deadline {
            match jobs.try_recv() {
                Some(delivery) => got.push(delivery),
                None => std::thread::sleep(Duration::from_millis(5)),
            }
        }
        got
    }

    fn counting_work(
        active: &Arc<AtomicUsize>,
        peak: &Arc<AtomicUsize>,
        url: String,
    ) -> impl FnOnce() -> Outcome + Send + 'static {
        let active = Arc::clone(active);
        let peak = Arc::clone(peak);
        move || {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(10));
            active.fetch_sub(1, Ordering::SeqCst);
            Outcome::Cover { url, image: None }
        }
    }

    #[test]
    fn many_covers_share_a_few_workers() -> anyhow::Result<()> {
        let mut jobs = test_jobs()?;
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        for n in 0..60 {
            let gate = Some(Arc::clone(&jobs.covers));
            jobs.dispatch(1, gate, None, counting_work(&active, &peak, format!("c{n}")));
        }
        let delivered = collect(&mut jobs, 60);
        assert_eq!(delivered.len(), 60);
        assert!(peak.load(Ordering::SeqCst) <= COVER_FETCHES);
        Ok(())
    }

    #[test]
    fn worker_threads_are_capped() -> anyhow::Result<()> {
        let mut jobs = test_jobs()?;
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        for n in 0..40 {
            jobs.dispatch(1, None, None, counting_work(&active, &peak, format!("c{n}")));
        }
        assert_eq!(collect(&mut jobs, 40).len(), 40);
        assert!(peak.load(Ordering::SeqCst) <= MAX_WORKERS);
        Ok(())
    }

    #[test]
    fn a_dying_count_job_still_answers() -> anyhow::Result<()> {
        let mut jobs = test_jobs()?;
        let lost = Job::Count.lost_outcome();
        jobs.dispatch(3, None, lost, || panic!("worker died"));
        let delivered = collect(&mut jobs, 1);
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].epoch, 3);
        assert!(matches!(
            delivered[0].outcome,
            Outcome::Count(Err(ApiFailure::Connection))
        ));
        Ok(())
    }
}
