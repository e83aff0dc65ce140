//! View state for Librería. Nothing here touches the network or the terminal:
//! each view hands out the requests it needs and is told the outcome.

pub mod categories;
pub mod edit;
pub mod header;
pub mod library;
pub mod rag;
pub mod reader;
pub mod tools;
pub mod upload;

mod timers;

use std::path::PathBuf;

use libreria_core::{Route, Settings};

pub use timers::{Debouncer, Interval};

#[derive(Debug, Clone)]
pub struct AppContext {
    pub settings: Settings,
    pub route: Route,
    history: Vec<Route>,
    /// Bumped on every navigation; results tagged with an older epoch are stale.
    epoch: u64,
}

impl AppContext {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            route: Route::default(),
            history: Vec::new(),
            epoch: 0,
        }
    }

    pub fn with_route(mut self, route: Route) -> Self {
        self.route = route;
        self
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        self.epoch == epoch
    }

    /// Returns false when `route` is already showing.
    pub fn navigate(&mut self, route: Route) -> bool {
        if route == self.route {
            return false;
        }
        let previous = std::mem::replace(&mut self.route, route);
        self.history.push(previous);
        self.epoch += 1;
        tracing::debug!(path = %self.route.path(), epoch = self.epoch, "navigate");
        true
    }

    pub fn back(&mut self) -> bool {
        let Some(previous) = self.history.pop() else {
            return false;
        };
        self.route = previous;
        self.epoch += 1;
        tracing::debug!(path = %self.route.path(), epoch = self.epoch, "navigate back");
        true
    }

    pub fn download_dir(&self) -> PathBuf {
        PathBuf::from(&self.settings.download_dir)
    }
}
