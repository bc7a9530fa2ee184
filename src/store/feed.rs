//! Cached, self-invalidating view of a city's incident page.
//!
//! The UI-layer analog: hold the current page in memory, listen for
//! incident-table change events, and refetch lazily once something changed.
//! The listener task is bound to the feed's lifetime; dropping the feed
//! aborts it and tears the subscription down, so nothing can touch the cache
//! after its consumer is gone.

use super::models::IncidentReport;
use super::{Backend, Page, PageRequest, StoreError};
use crate::realtime::Table;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::debug;

pub struct IncidentFeed {
    backend: Arc<dyn Backend>,
    city: String,
    page: PageRequest,
    current: Arc<RwLock<Option<Page<IncidentReport>>>>,
    stale: Arc<AtomicBool>,
    listener: JoinHandle<()>,
}

impl IncidentFeed {
    pub fn new(backend: Arc<dyn Backend>, city: impl Into<String>, page: PageRequest) -> Self {
        let stale = Arc::new(AtomicBool::new(true));
        let mut rx = backend.hub().subscribe(Table::IncidentReports);

        let listener = tokio::spawn({
            let stale = stale.clone();
            async move {
                loop {
                    match rx.recv().await {
                        Ok(event) => {
                            debug!(row_id = %event.row_id, "Incident change, cache stale");
                            stale.store(true, Ordering::Release);
                        }
                        // Falling behind just means we missed events; the
                        // cache is stale either way.
                        Err(RecvError::Lagged(_)) => {
                            stale.store(true, Ordering::Release);
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        });

        Self {
            backend,
            city: city.into(),
            page,
            current: Arc::new(RwLock::new(None)),
            stale,
            listener,
        }
    }

    /// Whether the cached page no longer reflects the backend.
    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    /// Returns the current page, refetching first if a change event arrived
    /// since the last fetch.
    pub async fn poll(&self) -> Result<Page<IncidentReport>, StoreError> {
        if !self.is_stale() {
            if let Some(page) = self.current.read().await.as_ref() {
                return Ok(page.clone());
            }
        }

        // Clear before fetching: an event landing mid-fetch re-marks the
        // cache stale rather than being lost.
        self.stale.store(false, Ordering::Release);
        let fresh = match self.backend.incidents_page(&self.city, self.page).await {
            Ok(page) => page,
            Err(err) => {
                self.stale.store(true, Ordering::Release);
                return Err(err);
            }
        };
        *self.current.write().await = Some(fresh.clone());
        Ok(fresh)
    }
}

impl Drop for IncidentFeed {
    fn drop(&mut self) {
        self.listener.abort();
    }
}
