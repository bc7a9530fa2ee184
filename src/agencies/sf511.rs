//! 511 SF Bay stop monitoring (SIRI).
//!
//! Upstream: `api.511.org/transit/StopMonitoring`, keyed by an `api_key`
//! query parameter. A station query is `operator:stopcode` (operator
//! defaults to BART). The upstream prepends a UTF-8 BOM to its JSON, so the
//! body is fetched as bytes and stripped before decoding.

use super::{clamp_eta, AdapterError, Agency, AgencyAdapter, ArrivalsQuery};
use crate::arrivals::{label_for_eta, ArrivalStatus, StandardArrival};
use crate::fetch::{fetch_bytes, BasicClient, QueryAuth, RequestPolicy};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

const BASE_URL: &str = "https://api.511.org/transit/StopMonitoring";

const DEFAULT_OPERATOR: &str = "BA";

#[derive(Debug, Deserialize)]
pub struct SiriEnvelope {
    #[serde(rename = "ServiceDelivery")]
    pub service_delivery: ServiceDelivery,
}

#[derive(Debug, Deserialize)]
pub struct ServiceDelivery {
    #[serde(rename = "StopMonitoringDelivery")]
    pub stop_monitoring_delivery: StopMonitoringDelivery,
}

#[derive(Debug, Deserialize)]
pub struct StopMonitoringDelivery {
    #[serde(rename = "MonitoredStopVisit", default)]
    pub visits: Vec<MonitoredStopVisit>,
}

#[derive(Debug, Deserialize)]
pub struct MonitoredStopVisit {
    #[serde(rename = "MonitoredVehicleJourney")]
    pub journey: Journey,
}

#[derive(Debug, Deserialize)]
pub struct Journey {
    #[serde(rename = "LineRef", default)]
    pub line: String,
    #[serde(rename = "DirectionRef", default)]
    pub direction: String,
    #[serde(rename = "DestinationName", default)]
    pub destination: String,
    #[serde(rename = "MonitoredCall")]
    pub call: Option<Call>,
}

#[derive(Debug, Deserialize)]
pub struct Call {
    #[serde(rename = "AimedArrivalTime")]
    pub aimed: Option<String>,
    #[serde(rename = "ExpectedArrivalTime")]
    pub expected: Option<String>,
}

fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes)
}

fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Pure mapping from a SIRI stop monitoring document to canonical arrivals.
pub fn map_arrivals(payload: &SiriEnvelope, now: DateTime<Utc>) -> Vec<StandardArrival> {
    let visits = &payload.service_delivery.stop_monitoring_delivery.visits;

    let mut arrivals = Vec::with_capacity(visits.len());
    for visit in visits {
        let journey = &visit.journey;
        let Some(call) = &journey.call else {
            continue;
        };
        let aimed = call.aimed.as_deref().and_then(parse_instant);
        let expected = call.expected.as_deref().and_then(parse_instant);
        let Some(when) = expected.or(aimed) else {
            continue;
        };

        let eta_seconds = (when - now).num_seconds();
        if eta_seconds < -30 {
            continue;
        }
        let eta_seconds = clamp_eta(eta_seconds);

        let behind = match (expected, aimed) {
            (Some(e), Some(a)) => (e - a).num_seconds(),
            _ => 0,
        };
        let (status, delay) = if behind > 60 {
            (
                ArrivalStatus::Delayed,
                format!("{} min late", (behind + 30) / 60),
            )
        } else {
            (ArrivalStatus::OnTime, String::new())
        };

        arrivals.push(StandardArrival {
            line: journey.line.clone(),
            destination: journey.destination.clone(),
            arrival_time: label_for_eta(eta_seconds),
            direction: journey.direction.clone(),
            status,
            delay,
            eta_seconds: Some(eta_seconds),
        });
    }

    arrivals
}

pub struct Sf511Adapter {
    client: Option<QueryAuth<BasicClient>>,
    policy: RequestPolicy,
}

impl Sf511Adapter {
    pub fn new(key: Option<&str>, policy: RequestPolicy) -> Self {
        Self {
            client: key.map(|k| QueryAuth::new(BasicClient::new(), "api_key", k)),
            policy,
        }
    }

    /// Splits `operator:stopcode`, defaulting the operator to BART.
    fn split_station(station: &str) -> (&str, &str) {
        match station.split_once(':') {
            Some((operator, code)) => (operator, code),
            None => (DEFAULT_OPERATOR, station),
        }
    }
}

#[async_trait]
impl AgencyAdapter for Sf511Adapter {
    fn agency(&self) -> Agency {
        Agency::Sf511
    }

    fn ready(&self) -> bool {
        self.client.is_some()
    }

    async fn arrivals(&self, query: &ArrivalsQuery) -> Result<Vec<StandardArrival>, AdapterError> {
        let client = self
            .client
            .as_ref()
            .ok_or(AdapterError::MissingCredentials("sf511"))?;

        let (operator, stop_code) = Self::split_station(&query.station);
        let url = format!("{BASE_URL}?agency={operator}&stopcode={stop_code}&format=json");

        let bytes = fetch_bytes(client, &url, &self.policy).await?;
        let payload: SiriEnvelope = serde_json::from_slice(strip_bom(&bytes))
            .map_err(|e| AdapterError::Vendor {
                agency: "sf511",
                message: e.to_string(),
            })?;

        Ok(query.finish(map_arrivals(&payload, Utc::now())))
    }
}
