//! Application state management
//!
//! Shared state handed to every request handler through Axum's State
//! extractor.

use std::sync::Arc;

use crate::config::Config;
use crate::db::Stores;
use crate::judge::Scheduler;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    stores: Stores,
    scheduler: Scheduler,
    config: Config,
}

impl AppState {
    pub fn new(stores: Stores, scheduler: Scheduler, config: Config) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                stores,
                scheduler,
                config,
            }),
        }
    }

    /// Problem, session and submission stores
    pub fn stores(&self) -> &Stores {
        &self.inner.stores
    }

    /// Test-case scheduler shared by all evaluations
    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }
}
