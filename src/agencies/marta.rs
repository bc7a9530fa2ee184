//! MARTA rail real-time arrivals.
//!
//! Upstream: the `traindata` endpoint, keyed by an `apiKey` query parameter.
//! The feed returns every tracked train system-wide; filtering down to the
//! requested station happens here. `WAITING_TIME` is MARTA's own signage
//! text and is passed through; `DELAY` is an ISO-8601-ish duration such as
//! `T90S`.

use super::{clamp_eta, AdapterError, Agency, AgencyAdapter, ArrivalsQuery};
use crate::arrivals::{ArrivalStatus, StandardArrival};
use crate::fetch::{fetch_json, BasicClient, QueryAuth, RequestPolicy};
use async_trait::async_trait;
use serde::Deserialize;

const BASE_URL: &str =
    "https://developerservices.itsmarta.com:18096/itsmarta/railrealtimearrivals/developerservices/traindata";

#[derive(Debug, Deserialize)]
pub struct MartaTrain {
    #[serde(rename = "DESTINATION", default)]
    pub destination: String,
    #[serde(rename = "DIRECTION", default)]
    pub direction: String,
    #[serde(rename = "LINE", default)]
    pub line: String,
    #[serde(rename = "STATION", default)]
    pub station: String,
    #[serde(rename = "WAITING_SECONDS", default)]
    pub waiting_seconds: String,
    #[serde(rename = "WAITING_TIME", default)]
    pub waiting_time: String,
    #[serde(rename = "DELAY", default)]
    pub delay: String,
}

/// `GOLD` -> `Gold`, matching the casing every other agency uses.
fn line_name(line: &str) -> String {
    let lower = line.to_ascii_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => lower,
    }
}

/// Parses MARTA's `DELAY` duration (`T0S`, `T90S`) into seconds.
fn delay_seconds(delay: &str) -> Option<i64> {
    delay
        .strip_prefix('T')
        .and_then(|d| d.strip_suffix('S'))
        .and_then(|d| d.parse().ok())
}

/// Pure mapping from the system-wide train list to canonical arrivals for
/// one station. Matching is case-insensitive and tolerant of the feed's
/// `" STATION"` suffix convention.
pub fn map_arrivals(trains: &[MartaTrain], station_query: &str) -> Vec<StandardArrival> {
    let wanted = station_query.to_ascii_uppercase();

    let mut arrivals = Vec::new();
    for train in trains {
        if !train.station.to_ascii_uppercase().contains(&wanted) {
            continue;
        }

        let eta_seconds = train
            .waiting_seconds
            .parse::<i64>()
            .ok()
            .map(clamp_eta);

        let (status, delay) = match delay_seconds(&train.delay) {
            Some(secs) if secs > 60 => {
                (ArrivalStatus::Delayed, format!("{} min late", (secs + 30) / 60))
            }
            _ => (ArrivalStatus::OnTime, String::new()),
        };
        let status = match train.waiting_time.as_str() {
            "Boarding" => ArrivalStatus::Boarding,
            "Arriving" => ArrivalStatus::Arrived,
            _ => status,
        };

        arrivals.push(StandardArrival {
            line: line_name(&train.line),
            destination: train.destination.clone(),
            arrival_time: train.waiting_time.clone(),
            direction: train.direction.clone(),
            status,
            delay,
            eta_seconds,
        });
    }

    arrivals
}

pub struct MartaAdapter {
    client: Option<QueryAuth<BasicClient>>,
    policy: RequestPolicy,
}

impl MartaAdapter {
    pub fn new(key: Option<&str>, policy: RequestPolicy) -> Self {
        Self {
            client: key.map(|k| QueryAuth::new(BasicClient::new(), "apiKey", k)),
            policy,
        }
    }
}

#[async_trait]
impl AgencyAdapter for MartaAdapter {
    fn agency(&self) -> Agency {
        Agency::Marta
    }

    fn ready(&self) -> bool {
        self.client.is_some()
    }

    async fn arrivals(&self, query: &ArrivalsQuery) -> Result<Vec<StandardArrival>, AdapterError> {
        let client = self
            .client
            .as_ref()
            .ok_or(AdapterError::MissingCredentials("marta"))?;

        let trains: Vec<MartaTrain> = fetch_json(client, BASE_URL, &self.policy).await?;

        Ok(query.finish(map_arrivals(&trains, &query.station)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRAINDATA: &str = r#"[
      {"DESTINATION": "Airport", "DIRECTION": "S", "EVENT_TIME": "8/5/2026 12:00:10 PM",
       "LINE": "GOLD", "NEXT_ARR": "12:02:00 PM", "STATION": "FIVE POINTS STATION",
       "TRAIN_ID": "303506", "WAITING_SECONDS": "95", "WAITING_TIME": "2 min", "DELAY": "T0S"},
      {"DESTINATION": "Doraville", "DIRECTION": "N", "EVENT_TIME": "8/5/2026 12:00:12 PM",
       "LINE": "GOLD", "NEXT_ARR": "12:00:30 PM", "STATION": "FIVE POINTS STATION",
       "TRAIN_ID": "303510", "WAITING_SECONDS": "-36", "WAITING_TIME": "Boarding", "DELAY": "T0S"},
      {"DESTINATION": "North Springs", "DIRECTION": "N", "EVENT_TIME": "8/5/2026 12:00:09 PM",
       "LINE": "RED", "NEXT_ARR": "12:06:00 PM", "STATION": "FIVE POINTS STATION",
       "TRAIN_ID": "301402", "WAITING_SECONDS": "350", "WAITING_TIME": "6 min", "DELAY": "T120S"},
      {"DESTINATION": "Indian Creek", "DIRECTION": "E", "EVENT_TIME": "8/5/2026 12:00:15 PM",
       "LINE": "BLUE", "NEXT_ARR": "12:03:00 PM", "STATION": "GEORGIA STATE STATION",
       "TRAIN_ID": "302201", "WAITING_SECONDS": "170", "WAITING_TIME": "3 min", "DELAY": "T0S"}
    ]"#;

    #[test]
    fn test_filters_to_requested_station() {
        let trains: Vec<MartaTrain> = serde_json::from_str(TRAINDATA).unwrap();
        let arrivals = map_arrivals(&trains, "Five Points");

        assert_eq!(arrivals.len(), 3);
        assert!(arrivals.iter().all(|a| a.line == "Gold" || a.line == "Red"));
    }

    #[test]
    fn test_boarding_train_clamps_negative_wait() {
        let trains: Vec<MartaTrain> = serde_json::from_str(TRAINDATA).unwrap();
        let arrivals = map_arrivals(&trains, "FIVE POINTS");

        let boarding = arrivals
            .iter()
            .find(|a| a.arrival_time == "Boarding")
            .unwrap();
        assert_eq!(boarding.status, ArrivalStatus::Boarding);
        assert_eq!(boarding.eta_seconds, Some(0));
    }

    #[test]
    fn test_delay_duration_marks_delayed() {
        let trains: Vec<MartaTrain> = serde_json::from_str(TRAINDATA).unwrap();
        let arrivals = map_arrivals(&trains, "FIVE POINTS");

        let late = arrivals.iter().find(|a| a.line == "Red").unwrap();
        assert_eq!(late.status, ArrivalStatus::Delayed);
        assert_eq!(late.delay, "2 min late");
    }

    #[test]
    fn test_delay_parse() {
        assert_eq!(delay_seconds("T0S"), Some(0));
        assert_eq!(delay_seconds("T90S"), Some(90));
        assert_eq!(delay_seconds(""), None);
        assert_eq!(delay_seconds("90"), None);
    }
}
