//! LA Metro rail arrivals.
//!
//! Upstream: the Swiftly-hosted GTFS-RT trip update feed for `lametro-rail`,
//! keyed by an `Authorization` header.

use super::feed::{arrivals_at_stop, delay_fields, parse_feed};
use super::{AdapterError, Agency, AgencyAdapter, ArrivalsQuery};
use crate::arrivals::{label_for_eta, StandardArrival};
use crate::fetch::{fetch_bytes, BasicClient, HeaderAuth, RequestPolicy};
use async_trait::async_trait;
use chrono::Utc;

const FEED_URL: &str = "https://api.goswift.ly/real-time/lametro-rail/gtfs-rt-trip-updates";

pub struct LaMetroAdapter {
    client: Option<HeaderAuth<BasicClient>>,
    policy: RequestPolicy,
}

impl LaMetroAdapter {
    pub fn new(key: Option<&str>, policy: RequestPolicy) -> anyhow::Result<Self> {
        let client = match key {
            Some(k) => Some(HeaderAuth::new(BasicClient::new(), "authorization", k)?),
            None => None,
        };
        Ok(Self { client, policy })
    }
}

#[async_trait]
impl AgencyAdapter for LaMetroAdapter {
    fn agency(&self) -> Agency {
        Agency::LaMetro
    }

    fn ready(&self) -> bool {
        self.client.is_some()
    }

    async fn arrivals(&self, query: &ArrivalsQuery) -> Result<Vec<StandardArrival>, AdapterError> {
        let client = self
            .client
            .as_ref()
            .ok_or(AdapterError::MissingCredentials("lametro"))?;

        let bytes = fetch_bytes(client, FEED_URL, &self.policy).await?;
        let feed = parse_feed(&bytes).map_err(|e| AdapterError::Vendor {
            agency: "lametro",
            message: e.to_string(),
        })?;

        let now = Utc::now().timestamp();
        let arrivals = arrivals_at_stop(&feed, &query.station, now)
            .into_iter()
            .map(|stop_arrival| {
                let (status, delay) = delay_fields(stop_arrival.delay_seconds);
                StandardArrival {
                    line: stop_arrival.route_id,
                    destination: String::new(),
                    arrival_time: label_for_eta(stop_arrival.eta_seconds),
                    direction: stop_arrival
                        .direction_id
                        .map(|d| d.to_string())
                        .unwrap_or_default(),
                    status,
                    delay,
                    eta_seconds: Some(stop_arrival.eta_seconds),
                }
            })
            .collect();

        Ok(query.finish(arrivals))
    }
}
