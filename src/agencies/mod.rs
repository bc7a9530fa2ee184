//! Per-agency arrival adapters behind one dispatch interface.
//!
//! Each agency module owns two things: the serde model of its vendor payload
//! and a pure mapping function from that payload to [`StandardArrival`]s.
//! The adapter type glues credential handling and the shared fetch policy
//! around the mapping. Nothing agency-specific leaks past this module; the
//! rest of the system speaks only [`Agency`] ids and canonical arrivals.

pub mod feed;

mod cta;
mod la_metro;
mod marta;
mod mbta;
mod mta;
mod rtd;
mod septa;
mod sf511;
mod wmata;

pub use cta::CtaAdapter;
pub use la_metro::LaMetroAdapter;
pub use marta::MartaAdapter;
pub use mbta::MbtaAdapter;
pub use mta::MtaAdapter;
pub use rtd::RtdAdapter;
pub use septa::SeptaAdapter;
pub use sf511::Sf511Adapter;
pub use wmata::WmataAdapter;

use crate::arrivals::StandardArrival;
use crate::config::AppConfig;
use crate::fetch::FetchError;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::info;

/// A supported transit agency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Agency {
    Cta,
    Wmata,
    Marta,
    Mbta,
    Mta,
    Rtd,
    Septa,
    LaMetro,
    Sf511,
}

impl Agency {
    pub const ALL: [Agency; 9] = [
        Agency::Cta,
        Agency::Wmata,
        Agency::Marta,
        Agency::Mbta,
        Agency::Mta,
        Agency::Rtd,
        Agency::Septa,
        Agency::LaMetro,
        Agency::Sf511,
    ];

    /// Stable identifier used in URLs, config keys, and logs.
    pub fn id(&self) -> &'static str {
        match self {
            Agency::Cta => "cta",
            Agency::Wmata => "wmata",
            Agency::Marta => "marta",
            Agency::Mbta => "mbta",
            Agency::Mta => "mta",
            Agency::Rtd => "rtd",
            Agency::Septa => "septa",
            Agency::LaMetro => "lametro",
            Agency::Sf511 => "sf511",
        }
    }

    pub fn from_id(id: &str) -> Option<Agency> {
        Agency::ALL.iter().copied().find(|a| a.id() == id)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Agency::Cta => "Chicago Transit Authority",
            Agency::Wmata => "Washington Metropolitan Area Transit Authority",
            Agency::Marta => "Metropolitan Atlanta Rapid Transit Authority",
            Agency::Mbta => "Massachusetts Bay Transportation Authority",
            Agency::Mta => "MTA New York City Transit",
            Agency::Rtd => "Regional Transportation District (Denver)",
            Agency::Septa => "Southeastern Pennsylvania Transportation Authority",
            Agency::LaMetro => "Los Angeles Metro",
            Agency::Sf511 => "511 SF Bay",
        }
    }
}

impl std::fmt::Display for Agency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// A station query in the agency's own identifier scheme.
///
/// `routes` narrows the result (and, for the MTA, selects which feeds to
/// pull); `limit` caps the returned list after sorting.
#[derive(Debug, Clone, Default)]
pub struct ArrivalsQuery {
    pub station: String,
    pub routes: Vec<String>,
    pub limit: Option<usize>,
}

impl ArrivalsQuery {
    pub fn station(station: impl Into<String>) -> Self {
        Self {
            station: station.into(),
            routes: Vec::new(),
            limit: None,
        }
    }

    /// Applies the route filter and limit to a mapped, sorted list.
    pub(crate) fn finish(&self, mut arrivals: Vec<StandardArrival>) -> Vec<StandardArrival> {
        if !self.routes.is_empty() {
            arrivals.retain(|a| {
                self.routes
                    .iter()
                    .any(|r| r.eq_ignore_ascii_case(&a.line))
            });
        }
        crate::arrivals::sort_arrivals(&mut arrivals);
        if let Some(limit) = self.limit {
            arrivals.truncate(limit);
        }
        arrivals
    }
}

/// Why an adapter could not produce arrivals.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("no API key configured for {0}")]
    MissingCredentials(&'static str),

    #[error("upstream request failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("{agency} returned a payload this adapter cannot read: {message}")]
    Vendor {
        agency: &'static str,
        message: String,
    },

    #[error("{agency} rejected the query: {message}")]
    Rejected {
        agency: &'static str,
        message: String,
    },

    #[error("no {agency} feed covers route {route}")]
    UnknownRoute {
        agency: &'static str,
        route: String,
    },
}

/// One agency's arrival source.
///
/// Implementations must return sorted arrivals and must not panic on vendor
/// garbage; anything unreadable becomes an [`AdapterError::Vendor`].
#[async_trait]
pub trait AgencyAdapter: Send + Sync {
    fn agency(&self) -> Agency;

    /// Whether the adapter has the credentials it needs to reach upstream.
    fn ready(&self) -> bool {
        true
    }

    async fn arrivals(&self, query: &ArrivalsQuery) -> Result<Vec<StandardArrival>, AdapterError>;
}

/// Dispatch table from [`Agency`] id to its adapter.
pub struct AdapterRegistry {
    adapters: HashMap<Agency, Box<dyn AgencyAdapter>>,
}

impl AdapterRegistry {
    /// Builds every adapter from application config. Agencies without a
    /// configured key still register; they answer with
    /// [`AdapterError::MissingCredentials`] until one is supplied.
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let policy = config.policy.clone();
        let keys = &config.keys;

        let mut adapters: HashMap<Agency, Box<dyn AgencyAdapter>> = HashMap::new();
        adapters.insert(
            Agency::Cta,
            Box::new(CtaAdapter::new(keys.get(Agency::Cta), policy.clone())),
        );
        adapters.insert(
            Agency::Wmata,
            Box::new(WmataAdapter::new(keys.get(Agency::Wmata), policy.clone())?),
        );
        adapters.insert(
            Agency::Marta,
            Box::new(MartaAdapter::new(keys.get(Agency::Marta), policy.clone())),
        );
        adapters.insert(
            Agency::Mbta,
            Box::new(MbtaAdapter::new(keys.get(Agency::Mbta), policy.clone())?),
        );
        adapters.insert(Agency::Mta, Box::new(MtaAdapter::new(policy.clone())));
        adapters.insert(Agency::Rtd, Box::new(RtdAdapter::new(policy.clone())));
        adapters.insert(Agency::Septa, Box::new(SeptaAdapter::new(policy.clone())));
        adapters.insert(
            Agency::LaMetro,
            Box::new(LaMetroAdapter::new(keys.get(Agency::LaMetro), policy.clone())?),
        );
        adapters.insert(
            Agency::Sf511,
            Box::new(Sf511Adapter::new(keys.get(Agency::Sf511), policy.clone())),
        );

        let ready = adapters.values().filter(|a| a.ready()).count();
        info!(
            agencies = adapters.len(),
            with_credentials = ready,
            timeout_secs = policy.timeout.as_secs(),
            retries = policy.retries,
            "Adapter registry built"
        );

        Ok(Self { adapters })
    }

    pub fn get(&self, agency: Agency) -> Option<&dyn AgencyAdapter> {
        self.adapters.get(&agency).map(|a| a.as_ref())
    }

    /// Fetches and normalizes arrivals for one agency.
    #[tracing::instrument(skip(self, query), fields(agency = %agency, station = %query.station))]
    pub async fn arrivals(
        &self,
        agency: Agency,
        query: &ArrivalsQuery,
    ) -> Result<Vec<StandardArrival>, AdapterError> {
        // from_config registers every variant; a miss is a construction bug.
        let adapter = self
            .adapters
            .get(&agency)
            .expect("every agency registered at construction");
        adapter.arrivals(query).await
    }

    pub fn agencies(&self) -> Vec<Agency> {
        let mut all: Vec<Agency> = self.adapters.keys().copied().collect();
        all.sort_by_key(|a| a.id());
        all
    }
}

/// Clamps an upstream-reported countdown to something sane. Some vendors
/// report small negative waits for trains sitting in the station.
pub(crate) fn clamp_eta(seconds: i64) -> i64 {
    seconds.max(0)
}
