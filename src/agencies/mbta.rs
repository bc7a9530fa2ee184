//! MBTA v3 predictions.
//!
//! Upstream: the JSON:API `/predictions` endpoint, optionally keyed by an
//! `x-api-key` header (the open tier works without one, at a lower rate
//! limit). Trip headsigns ride along in the `included` side-channel.

use super::{AdapterError, Agency, AgencyAdapter, ArrivalsQuery};
use crate::arrivals::{ArrivalStatus, StandardArrival};
use crate::fetch::{fetch_json, BasicClient, HeaderAuth, HttpClient, RequestPolicy};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;

const BASE_URL: &str = "https://api-v3.mbta.com";

#[derive(Debug, Deserialize)]
pub struct MbtaResponse {
    #[serde(default)]
    pub data: Vec<MbtaPrediction>,
    #[serde(default)]
    pub included: Vec<MbtaIncluded>,
}

#[derive(Debug, Deserialize)]
pub struct MbtaPrediction {
    pub attributes: MbtaAttributes,
    #[serde(default)]
    pub relationships: MbtaRelationships,
}

#[derive(Debug, Deserialize)]
pub struct MbtaAttributes {
    pub arrival_time: Option<String>,
    pub departure_time: Option<String>,
    pub direction_id: Option<i64>,
    /// Free-text override the MBTA uses for non-countdown rows
    /// ("Stopped 5 stops away", "Delayed").
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MbtaRelationships {
    pub route: Option<MbtaRelation>,
    pub trip: Option<MbtaRelation>,
}

#[derive(Debug, Deserialize)]
pub struct MbtaRelation {
    pub data: Option<MbtaRef>,
}

#[derive(Debug, Deserialize)]
pub struct MbtaRef {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct MbtaIncluded {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: serde_json::Value,
}

fn relation_id(rel: &Option<MbtaRelation>) -> Option<&str> {
    rel.as_ref()?.data.as_ref().map(|r| r.id.as_str())
}

/// The countdown tiers MBTA countdown clocks use.
fn countdown(eta_seconds: i64) -> (String, ArrivalStatus) {
    if eta_seconds <= 30 {
        ("Arriving".to_string(), ArrivalStatus::Arrived)
    } else if eta_seconds <= 60 {
        ("Approaching".to_string(), ArrivalStatus::OnTime)
    } else if eta_seconds <= 90 {
        ("1 min".to_string(), ArrivalStatus::OnTime)
    } else {
        let minutes = (eta_seconds + 30) / 60;
        (format!("{minutes} min"), ArrivalStatus::OnTime)
    }
}

/// Pure mapping from a predictions document to canonical arrivals.
pub fn map_arrivals(payload: &MbtaResponse, now: DateTime<Utc>) -> Vec<StandardArrival> {
    let headsigns: HashMap<&str, &str> = payload
        .included
        .iter()
        .filter(|inc| inc.kind == "trip")
        .filter_map(|inc| {
            inc.attributes
                .get("headsign")
                .and_then(|h| h.as_str())
                .map(|h| (inc.id.as_str(), h))
        })
        .collect();

    let mut arrivals = Vec::with_capacity(payload.data.len());
    for prediction in &payload.data {
        let attrs = &prediction.attributes;
        let Some(when) = attrs.arrival_time.as_deref().or(attrs.departure_time.as_deref()) else {
            continue;
        };
        let Ok(when) = DateTime::parse_from_rfc3339(when) else {
            continue;
        };
        let eta_seconds = (when.with_timezone(&Utc) - now).num_seconds();
        if eta_seconds < -30 {
            continue;
        }
        let eta_seconds = eta_seconds.max(0);

        let (arrival_time, status) = match &attrs.status {
            Some(text) if text.contains("Delay") => (text.clone(), ArrivalStatus::Delayed),
            Some(text) => (text.clone(), ArrivalStatus::OnTime),
            None => countdown(eta_seconds),
        };

        let destination = relation_id(&prediction.relationships.trip)
            .and_then(|trip_id| headsigns.get(trip_id))
            .unwrap_or(&"")
            .to_string();

        arrivals.push(StandardArrival {
            line: relation_id(&prediction.relationships.route)
                .unwrap_or_default()
                .to_string(),
            destination,
            arrival_time,
            direction: attrs
                .direction_id
                .map(|d| d.to_string())
                .unwrap_or_default(),
            status,
            delay: String::new(),
            eta_seconds: Some(eta_seconds),
        });
    }

    arrivals
}

pub struct MbtaAdapter {
    client: Box<dyn HttpClient>,
    policy: RequestPolicy,
}

impl MbtaAdapter {
    pub fn new(key: Option<&str>, policy: RequestPolicy) -> anyhow::Result<Self> {
        let client: Box<dyn HttpClient> = match key {
            Some(k) => Box::new(HeaderAuth::new(BasicClient::new(), "x-api-key", k)?),
            None => Box::new(BasicClient::new()),
        };
        Ok(Self { client, policy })
    }
}

#[async_trait]
impl AgencyAdapter for MbtaAdapter {
    fn agency(&self) -> Agency {
        Agency::Mbta
    }

    async fn arrivals(&self, query: &ArrivalsQuery) -> Result<Vec<StandardArrival>, AdapterError> {
        let mut url = format!(
            "{BASE_URL}/predictions?filter[stop]={}&sort=arrival_time&include=trip&fields[trip]=headsign",
            query.station
        );
        if !query.routes.is_empty() {
            url.push_str("&filter[route]=");
            url.push_str(&query.routes.join(","));
        }

        let payload: MbtaResponse = fetch_json(self.client.as_ref(), &url, &self.policy).await?;

        Ok(query.finish(map_arrivals(&payload, Utc::now())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixture() -> MbtaResponse {
        serde_json::from_str(
            r#"{
              "data": [
                {"id": "p1", "type": "prediction",
                 "attributes": {"arrival_time": "2026-08-05T12:00:20-04:00",
                                "departure_time": null, "direction_id": 0, "status": null},
                 "relationships": {"route": {"data": {"id": "Red", "type": "route"}},
                                   "trip": {"data": {"id": "t1", "type": "trip"}}}},
                {"id": "p2", "type": "prediction",
                 "attributes": {"arrival_time": "2026-08-05T12:01:10-04:00",
                                "departure_time": null, "direction_id": 1, "status": null},
                 "relationships": {"route": {"data": {"id": "Red", "type": "route"}},
                                   "trip": {"data": {"id": "t2", "type": "trip"}}}},
                {"id": "p3", "type": "prediction",
                 "attributes": {"arrival_time": "2026-08-05T12:07:00-04:00",
                                "departure_time": null, "direction_id": 0, "status": null},
                 "relationships": {"route": {"data": {"id": "Red", "type": "route"}},
                                   "trip": {"data": {"id": "t1", "type": "trip"}}}}
              ],
              "included": [
                {"id": "t1", "type": "trip", "attributes": {"headsign": "Ashmont"}},
                {"id": "t2", "type": "trip", "attributes": {"headsign": "Alewife"}}
              ]
            }"#,
        )
        .unwrap()
    }

    fn noon_utc() -> DateTime<Utc> {
        // 12:00:00 -04:00
        Utc.with_ymd_and_hms(2026, 8, 5, 16, 0, 0).unwrap()
    }

    #[test]
    fn test_countdown_tiers() {
        let arrivals = map_arrivals(&fixture(), noon_utc());

        assert_eq!(arrivals.len(), 3);
        // 20 seconds out.
        assert_eq!(arrivals[0].arrival_time, "Arriving");
        assert_eq!(arrivals[0].status, ArrivalStatus::Arrived);
        // 70 seconds out.
        assert_eq!(arrivals[1].arrival_time, "1 min");
        // 7 minutes out.
        assert_eq!(arrivals[2].arrival_time, "7 min");
    }

    #[test]
    fn test_headsigns_resolved_from_included_trips() {
        let arrivals = map_arrivals(&fixture(), noon_utc());
        assert_eq!(arrivals[0].destination, "Ashmont");
        assert_eq!(arrivals[1].destination, "Alewife");
    }

    #[test]
    fn test_status_text_overrides_countdown() {
        let payload: MbtaResponse = serde_json::from_str(
            r#"{"data": [
              {"id": "p", "type": "prediction",
               "attributes": {"arrival_time": "2026-08-05T12:10:00-04:00",
                              "departure_time": null, "direction_id": 0, "status": "Delayed"},
               "relationships": {"route": {"data": {"id": "Orange", "type": "route"}}}}
            ], "included": []}"#,
        )
        .unwrap();

        let arrivals = map_arrivals(&payload, noon_utc());
        assert_eq!(arrivals[0].arrival_time, "Delayed");
        assert_eq!(arrivals[0].status, ArrivalStatus::Delayed);
    }

    #[test]
    fn test_boundary_tier_values() {
        assert_eq!(countdown(30).0, "Arriving");
        assert_eq!(countdown(31).0, "Approaching");
        assert_eq!(countdown(60).0, "Approaching");
        assert_eq!(countdown(61).0, "1 min");
        assert_eq!(countdown(90).0, "1 min");
        assert_eq!(countdown(91).0, "2 min");
    }
}
