//! CTA Train Tracker arrivals.
//!
//! Upstream: `ttarrivals.aspx` with `outputType=JSON`, keyed by a `key`
//! query parameter. Stop ids (3xxxx) query one platform via `stpid`;
//! parent station ids (4xxxx) query the whole station via `mapid`.

use super::{clamp_eta, AdapterError, Agency, AgencyAdapter, ArrivalsQuery};
use crate::arrivals::{ArrivalStatus, StandardArrival};
use crate::fetch::{fetch_json, BasicClient, QueryAuth, RequestPolicy};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Deserialize;

const BASE_URL: &str = "https://lapi.transitchicago.com/api/1.0/ttarrivals.aspx";

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Deserialize)]
pub struct CtaResponse {
    pub ctatt: Ctatt,
}

#[derive(Debug, Deserialize)]
pub struct Ctatt {
    #[serde(rename = "errCd")]
    pub err_cd: String,
    #[serde(rename = "errNm")]
    pub err_nm: Option<String>,
    #[serde(default)]
    pub eta: Vec<CtaEta>,
}

#[derive(Debug, Deserialize)]
pub struct CtaEta {
    /// Route code: `Red`, `Blue`, `Brn`, `G`, `Org`, `P`, `Pink`, `Y`.
    pub rt: String,
    #[serde(rename = "destNm")]
    pub dest_nm: String,
    #[serde(rename = "trDr")]
    pub tr_dr: String,
    /// Prediction generation time.
    pub prdt: String,
    /// Predicted arrival time.
    #[serde(rename = "arrT")]
    pub arr_t: String,
    #[serde(rename = "isApp")]
    pub is_app: String,
    #[serde(rename = "isDly")]
    pub is_dly: String,
}

/// Expands Train Tracker route codes to rider-facing line names.
fn line_name(rt: &str) -> String {
    match rt {
        "Red" => "Red",
        "Blue" => "Blue",
        "Brn" => "Brown",
        "G" => "Green",
        "Org" => "Orange",
        "P" | "Pexp" => "Purple",
        "Pink" => "Pink",
        "Y" => "Yellow",
        other => other,
    }
    .to_string()
}

/// Pure mapping from a Train Tracker payload to canonical arrivals.
///
/// Both timestamps come from the payload itself (`arrT` minus `prdt`), so
/// the mapping needs no clock.
pub fn map_arrivals(payload: &CtaResponse) -> Result<Vec<StandardArrival>, AdapterError> {
    if payload.ctatt.err_cd != "0" {
        return Err(AdapterError::Rejected {
            agency: "cta",
            message: payload
                .ctatt
                .err_nm
                .clone()
                .unwrap_or_else(|| format!("error code {}", payload.ctatt.err_cd)),
        });
    }

    let mut arrivals = Vec::with_capacity(payload.ctatt.eta.len());
    for eta in &payload.ctatt.eta {
        let (Ok(predicted_at), Ok(arrives_at)) = (
            NaiveDateTime::parse_from_str(&eta.prdt, TIME_FORMAT),
            NaiveDateTime::parse_from_str(&eta.arr_t, TIME_FORMAT),
        ) else {
            // One malformed row should not sink the station.
            continue;
        };
        let eta_seconds = clamp_eta((arrives_at - predicted_at).num_seconds());

        let approaching = eta.is_app == "1";
        let (arrival_time, status) = if approaching {
            ("Due".to_string(), ArrivalStatus::Arrived)
        } else {
            let minutes = ((eta_seconds + 30) / 60).max(1);
            (format!("{minutes} min"), ArrivalStatus::OnTime)
        };
        let status = if eta.is_dly == "1" {
            ArrivalStatus::Delayed
        } else {
            status
        };

        arrivals.push(StandardArrival {
            line: line_name(&eta.rt),
            destination: eta.dest_nm.clone(),
            arrival_time,
            direction: eta.tr_dr.clone(),
            status,
            delay: String::new(),
            eta_seconds: Some(eta_seconds),
        });
    }

    Ok(arrivals)
}

pub struct CtaAdapter {
    client: Option<QueryAuth<BasicClient>>,
    policy: RequestPolicy,
}

impl CtaAdapter {
    pub fn new(key: Option<&str>, policy: RequestPolicy) -> Self {
        Self {
            client: key.map(|k| QueryAuth::new(BasicClient::new(), "key", k)),
            policy,
        }
    }

    fn station_param(station: &str) -> &'static str {
        if station.starts_with('4') {
            "mapid"
        } else {
            "stpid"
        }
    }
}

#[async_trait]
impl AgencyAdapter for CtaAdapter {
    fn agency(&self) -> Agency {
        Agency::Cta
    }

    fn ready(&self) -> bool {
        self.client.is_some()
    }

    async fn arrivals(&self, query: &ArrivalsQuery) -> Result<Vec<StandardArrival>, AdapterError> {
        let client = self
            .client
            .as_ref()
            .ok_or(AdapterError::MissingCredentials("cta"))?;

        let url = format!(
            "{BASE_URL}?outputType=JSON&{}={}",
            Self::station_param(&query.station),
            query.station
        );
        let payload: CtaResponse = fetch_json(client, &url, &self.policy).await?;

        Ok(query.finish(map_arrivals(&payload)?))
    }
}
