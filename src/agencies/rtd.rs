//! RTD Denver rail arrivals.
//!
//! Upstream: the public GTFS-RT TripUpdate feed, no key required. Station
//! queries are GTFS stop ids.

use super::feed::{arrivals_at_stop, delay_fields, parse_feed};
use super::{AdapterError, Agency, AgencyAdapter, ArrivalsQuery};
use crate::arrivals::{label_for_eta, StandardArrival};
use crate::fetch::{fetch_bytes, BasicClient, RequestPolicy};
use async_trait::async_trait;
use chrono::Utc;

const FEED_URL: &str = "https://www.rtd-denver.com/files/gtfs-rt/TripUpdate.pb";

pub struct RtdAdapter {
    client: BasicClient,
    policy: RequestPolicy,
}

impl RtdAdapter {
    pub fn new(policy: RequestPolicy) -> Self {
        Self {
            client: BasicClient::new(),
            policy,
        }
    }
}

#[async_trait]
impl AgencyAdapter for RtdAdapter {
    fn agency(&self) -> Agency {
        Agency::Rtd
    }

    async fn arrivals(&self, query: &ArrivalsQuery) -> Result<Vec<StandardArrival>, AdapterError> {
        let bytes = fetch_bytes(&self.client, FEED_URL, &self.policy).await?;
        let feed = parse_feed(&bytes).map_err(|e| AdapterError::Vendor {
            agency: "rtd",
            message: e.to_string(),
        })?;

        let now = Utc::now().timestamp();
        let arrivals = arrivals_at_stop(&feed, &query.station, now)
            .into_iter()
            .map(|stop_arrival| {
                let (status, delay) = delay_fields(stop_arrival.delay_seconds);
                StandardArrival {
                    line: stop_arrival.route_id,
                    // Trip updates carry no headsign.
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
