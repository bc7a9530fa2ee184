//! SEPTA Regional Rail arrivals.
//!
//! Upstream: the Arrivals API, no key required. The response is keyed by a
//! human-readable banner ("Suburban Station Departures: ...") wrapping
//! per-direction train lists, so the outer layers deserialize as maps.
//! `status` is either `"On Time"` or a minutes-late count.

use super::{clamp_eta, AdapterError, Agency, AgencyAdapter, ArrivalsQuery};
use crate::arrivals::{label_for_eta, ArrivalStatus, StandardArrival};
use crate::fetch::{fetch_json, BasicClient, RequestPolicy};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Deserialize;
use std::collections::HashMap;

const BASE_URL: &str = "https://www3.septa.org/api/Arrivals/index.php";

/// `{"<banner>": [{"Northbound": [...], "Southbound": [...]}]}`
pub type SeptaResponse = HashMap<String, Vec<HashMap<String, Vec<SeptaTrain>>>>;

#[derive(Debug, Deserialize)]
pub struct SeptaTrain {
    #[serde(default)]
    pub line: String,
    #[serde(default)]
    pub destination: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub sched_time: String,
    #[serde(default)]
    pub depart_time: String,
}

/// SEPTA timestamps look like `2026-08-05 12:10:00.000`, local time.
fn parse_time(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").ok()
}

/// Minutes late out of the `status` field, `None` when on time or unreadable.
fn minutes_late(status: &str) -> Option<i64> {
    if status.eq_ignore_ascii_case("on time") {
        return None;
    }
    status
        .split_whitespace()
        .next()
        .and_then(|n| n.parse::<i64>().ok())
        .filter(|n| *n > 0)
}

/// Pure mapping from an Arrivals document to canonical arrivals.
///
/// `now` is the local wall clock matching the feed's timezone; tests pin it.
pub fn map_arrivals(payload: &SeptaResponse, now: NaiveDateTime) -> Vec<StandardArrival> {
    let mut arrivals = Vec::new();

    for groups in payload.values() {
        for group in groups {
            for (direction, trains) in group {
                for train in trains {
                    let Some(scheduled) = parse_time(&train.depart_time)
                        .or_else(|| parse_time(&train.sched_time))
                    else {
                        continue;
                    };

                    let late = minutes_late(&train.status);
                    let expected = scheduled + chrono::Duration::minutes(late.unwrap_or(0));
                    let eta_seconds = (expected - now).num_seconds();
                    if eta_seconds < -30 {
                        continue;
                    }
                    let eta_seconds = clamp_eta(eta_seconds);

                    let (status, delay) = match late {
                        Some(minutes) => {
                            (ArrivalStatus::Delayed, format!("{minutes} min late"))
                        }
                        None => (ArrivalStatus::OnTime, String::new()),
                    };

                    arrivals.push(StandardArrival {
                        line: train.line.clone(),
                        destination: train.destination.clone(),
                        arrival_time: label_for_eta(eta_seconds),
                        direction: direction.clone(),
                        status,
                        delay,
                        eta_seconds: Some(eta_seconds),
                    });
                }
            }
        }
    }

    arrivals
}

pub struct SeptaAdapter {
    client: BasicClient,
    policy: RequestPolicy,
}

impl SeptaAdapter {
    pub fn new(policy: RequestPolicy) -> Self {
        Self {
            client: BasicClient::new(),
            policy,
        }
    }
}

#[async_trait]
impl AgencyAdapter for SeptaAdapter {
    fn agency(&self) -> Agency {
        Agency::Septa
    }

    async fn arrivals(&self, query: &ArrivalsQuery) -> Result<Vec<StandardArrival>, AdapterError> {
        let results = query.limit.unwrap_or(10);
        let url = format!(
            "{BASE_URL}?station={}&results={results}",
            query.station.replace(' ', "%20")
        );
        let payload: SeptaResponse = fetch_json(&self.client, &url, &self.policy).await?;

        Ok(query.finish(map_arrivals(&payload, chrono::Local::now().naive_local())))
    }
}
