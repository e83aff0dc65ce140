use std::time::{Duration, Instant};

use libreria_core::ApiFailure;

use crate::timers::Interval;

pub const COUNT_POLL_INTERVAL: Duration = Duration::from_secs(600);
pub const MSG_COUNT_FAILED: &str =
    "No se pudo cargar el contador de libros. Inténtalo de nuevo más tarde.";

#[derive(Debug, Clone)]
pub struct HeaderState {
    pub book_count: u64,
    pub error: Option<String>,
    poll: Interval,
    in_flight: bool,
}

impl HeaderState {
    pub fn new(now: Instant) -> Self {
        Self {
            book_count: 0,
            error: None,
            poll: Interval::new(COUNT_POLL_INTERVAL, now),
            in_flight: false,
        }
    }

    /// True when a count request should go out now. The caller must answer
    /// it with `finish_count`, failures included.
    pub fn poll_due(&mut self, now: Instant) -> bool {
        if !self.poll.due(now) || self.in_flight {
            return false;
        }
        self.in_flight = true;
        true
    }

    pub fn finish_count(&mut self, result: Result<u64, ApiFailure>) {
        self.in_flight = false;
        match result {
            Ok(count) => {
                self.book_count = count;
                self.error = None;
            }
            Err(failure) => {
                tracing::warn!(%failure, "book count failed");
                self.book_count = 0;
                self.error = Some(MSG_COUNT_FAILED.to_string());
            }
        }
    }

    pub fn count_label(&self) -> Option<String> {
        (self.book_count > 0).then(|| format!("{} libros en la biblioteca", self.book_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polls_immediately_then_every_ten_minutes() {
        let start = Instant::now();
        let mut header = HeaderState::new(start);
        assert!(header.poll_due(start));
        header.finish_count(Ok(12));
        assert_eq!(header.count_label().as_deref(), Some("12 libros en la biblioteca"));

        assert!(!header.poll_due(start + Duration::from_secs(599)));
        assert!(header.poll_due(start + COUNT_POLL_INTERVAL));
    }

    #[test]
    fn failure_resets_count() {
        let start = Instant::now();
        let mut header = HeaderState::new(start);
        header.poll_due(start);
        header.finish_count(Ok(3));
        header.finish_count(Err(ApiFailure::Connection));
        assert_eq!(header.book_count, 0);
        assert_eq!(header.count_label(), None);
        assert_eq!(header.error.as_deref(), Some(MSG_COUNT_FAILED));

        header.finish_count(Ok(0));
        assert_eq!(header.error, None);
        assert_eq!(header.count_label(), None);
    }

    #[test]
    fn failed_count_rearms_polling() {
        let start = Instant::now();
        let mut header = HeaderState::new(start);
        assert!(header.poll_due(start));
        header.finish_count(Err(ApiFailure::Connection));
        assert!(header.poll_due(start + COUNT_POLL_INTERVAL));
    }

    #[test]
    fn overlapping_polls_are_skipped() {
        let start = Instant::now();
        let mut header = HeaderState::new(start);
        assert!(header.poll_due(start));
        assert!(!header.poll_due(start + COUNT_POLL_INTERVAL));
        header.finish_count(Ok(1));
        assert!(header.poll_due(start + COUNT_POLL_INTERVAL * 2));
    }
}
