//! City-level arrivals orchestration.
//!
//! The UI asks in terms of cities; this maps a city to its agency, runs the
//! adapter call on its own task, and hands back an [`ArrivalsRequest`] whose
//! drop aborts the in-flight fetch. A consumer that goes away can therefore
//! never be written to by a late response.
//!
//! Identical concurrent queries are not deduplicated; two callers asking for
//! the same station each pay for their own fetch.

use crate::agencies::{AdapterError, AdapterRegistry, Agency, ArrivalsQuery};
use crate::arrivals::StandardArrival;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A city the product serves, each backed by exactly one agency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum City {
    Chicago,
    WashingtonDc,
    Atlanta,
    Boston,
    NewYork,
    Denver,
    Philadelphia,
    LosAngeles,
    SanFrancisco,
}

impl City {
    pub const ALL: [City; 9] = [
        City::Chicago,
        City::WashingtonDc,
        City::Atlanta,
        City::Boston,
        City::NewYork,
        City::Denver,
        City::Philadelphia,
        City::LosAngeles,
        City::SanFrancisco,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            City::Chicago => "chicago",
            City::WashingtonDc => "washington-dc",
            City::Atlanta => "atlanta",
            City::Boston => "boston",
            City::NewYork => "new-york",
            City::Denver => "denver",
            City::Philadelphia => "philadelphia",
            City::LosAngeles => "los-angeles",
            City::SanFrancisco => "san-francisco",
        }
    }

    pub fn from_id(id: &str) -> Option<City> {
        City::ALL.iter().copied().find(|c| c.id() == id)
    }

    pub fn agency(&self) -> Agency {
        match self {
            City::Chicago => Agency::Cta,
            City::WashingtonDc => Agency::Wmata,
            City::Atlanta => Agency::Marta,
            City::Boston => Agency::Mbta,
            City::NewYork => Agency::Mta,
            City::Denver => Agency::Rtd,
            City::Philadelphia => Agency::Septa,
            City::LosAngeles => Agency::LaMetro,
            City::SanFrancisco => Agency::Sf511,
        }
    }
}

/// Canonical success envelope for one arrivals query.
#[derive(Debug, Clone, Serialize)]
pub struct ArrivalsResponse {
    pub agency: String,
    pub station: String,
    pub arrivals: Vec<StandardArrival>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error("request was cancelled")]
    Cancelled,
}

pub struct ScheduleService {
    registry: Arc<AdapterRegistry>,
}

impl ScheduleService {
    pub fn new(registry: Arc<AdapterRegistry>) -> Self {
        Self { registry }
    }

    /// Starts an arrivals fetch for a city. The work runs on its own task;
    /// drop the returned request to abort it.
    pub fn arrivals(&self, city: City, query: ArrivalsQuery) -> ArrivalsRequest {
        let registry = self.registry.clone();
        let agency = city.agency();

        let handle = tokio::spawn(async move {
            let arrivals = registry.arrivals(agency, &query).await?;
            Ok(ArrivalsResponse {
                agency: agency.id().to_string(),
                station: query.station,
                arrivals,
                timestamp: Utc::now(),
            })
        });

        ArrivalsRequest {
            handle: Some(handle),
        }
    }
}

/// Handle to an in-flight arrivals fetch, abort-on-drop.
pub struct ArrivalsRequest {
    handle: Option<JoinHandle<Result<ArrivalsResponse, ScheduleError>>>,
}

impl ArrivalsRequest {
    pub async fn wait(mut self) -> Result<ArrivalsResponse, ScheduleError> {
        let Some(handle) = self.handle.take() else {
            return Err(ScheduleError::Cancelled);
        };
        match handle.await {
            Ok(result) => result,
            // Join failure means the task was aborted or panicked; neither
            // produces a response.
            Err(_) => Err(ScheduleError::Cancelled),
        }
    }

    pub fn abort(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for ArrivalsRequest {
    fn drop(&mut self) {
        self.abort();
    }
}
