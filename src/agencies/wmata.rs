//! WMATA rail predictions.
//!
//! Upstream: `StationPrediction.svc/json/GetPrediction/{codes}`, keyed by an
//! `api_key` header. The `Min` field carries either a minute count or one of
//! the signage words `ARR`, `BRD`, `DLY`.

use super::{AdapterError, Agency, AgencyAdapter, ArrivalsQuery};
use crate::arrivals::{ArrivalStatus, StandardArrival};
use crate::fetch::{fetch_json, BasicClient, HeaderAuth, RequestPolicy};
use async_trait::async_trait;
use serde::Deserialize;

const BASE_URL: &str = "https://api.wmata.com/StationPrediction.svc/json/GetPrediction";

#[derive(Debug, Deserialize)]
pub struct WmataResponse {
    #[serde(rename = "Trains", default)]
    pub trains: Vec<WmataTrain>,
}

#[derive(Debug, Deserialize)]
pub struct WmataTrain {
    #[serde(rename = "Line", default)]
    pub line: String,
    #[serde(rename = "Destination", default)]
    pub destination: String,
    #[serde(rename = "DestinationName", default)]
    pub destination_name: String,
    #[serde(rename = "Group", default)]
    pub group: String,
    #[serde(rename = "Min", default)]
    pub min: String,
}

fn line_name(code: &str) -> Option<String> {
    let name = match code {
        "RD" => "Red",
        "BL" => "Blue",
        "OR" => "Orange",
        "SV" => "Silver",
        "GR" => "Green",
        "YL" => "Yellow",
        // "No passenger" and ghost trains come through as "--" or "No".
        "--" | "No" | "" => return None,
        other => other,
    };
    Some(name.to_string())
}

/// Pure mapping from a WMATA prediction payload to canonical arrivals.
pub fn map_arrivals(payload: &WmataResponse) -> Vec<StandardArrival> {
    let mut arrivals = Vec::with_capacity(payload.trains.len());

    for train in &payload.trains {
        let Some(line) = line_name(&train.line) else {
            continue;
        };

        let (arrival_time, status, eta_seconds) = match train.min.as_str() {
            "ARR" => ("Arriving".to_string(), ArrivalStatus::Arrived, Some(0)),
            "BRD" => ("Boarding".to_string(), ArrivalStatus::Boarding, Some(0)),
            "DLY" => ("Delayed".to_string(), ArrivalStatus::Delayed, None),
            "" | "---" => continue,
            minutes => match minutes.parse::<i64>() {
                Ok(m) => (format!("{m} min"), ArrivalStatus::OnTime, Some(m * 60)),
                Err(_) => continue,
            },
        };

        let destination = if train.destination_name.is_empty() {
            train.destination.clone()
        } else {
            train.destination_name.clone()
        };

        arrivals.push(StandardArrival {
            line,
            destination,
            arrival_time,
            direction: train.group.clone(),
            status,
            delay: String::new(),
            eta_seconds,
        });
    }

    arrivals
}

pub struct WmataAdapter {
    client: Option<HeaderAuth<BasicClient>>,
    policy: RequestPolicy,
}

impl WmataAdapter {
    pub fn new(key: Option<&str>, policy: RequestPolicy) -> anyhow::Result<Self> {
        let client = match key {
            Some(k) => Some(HeaderAuth::new(BasicClient::new(), "api_key", k)?),
            None => None,
        };
        Ok(Self { client, policy })
    }
}

#[async_trait]
impl AgencyAdapter for WmataAdapter {
    fn agency(&self) -> Agency {
        Agency::Wmata
    }

    fn ready(&self) -> bool {
        self.client.is_some()
    }

    async fn arrivals(&self, query: &ArrivalsQuery) -> Result<Vec<StandardArrival>, AdapterError> {
        let client = self
            .client
            .as_ref()
            .ok_or(AdapterError::MissingCredentials("wmata"))?;

        let url = format!("{BASE_URL}/{}", query.station);
        let payload: WmataResponse = fetch_json(client, &url, &self.policy).await?;

        Ok(query.finish(map_arrivals(&payload)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const METRO_CENTER: &str = r#"{
      "Trains": [
        {"Car": "8", "Destination": "Glenmont", "DestinationCode": "B11",
         "DestinationName": "Glenmont", "Group": "1", "Line": "RD",
         "LocationCode": "A01", "LocationName": "Metro Center", "Min": "7"},
        {"Car": "6", "Destination": "Shady Gr", "DestinationCode": "A15",
         "DestinationName": "Shady Grove", "Group": "2", "Line": "RD",
         "LocationCode": "A01", "LocationName": "Metro Center", "Min": "ARR"},
        {"Car": "8", "Destination": "Frnconia", "DestinationCode": "J13",
         "DestinationName": "Franconia-Springfield", "Group": "2", "Line": "BL",
         "LocationCode": "C01", "LocationName": "Metro Center", "Min": "BRD"},
        {"Car": "-", "Destination": "ssenger", "DestinationCode": null,
         "DestinationName": "No Passenger", "Group": "1", "Line": "--",
         "LocationCode": "C01", "LocationName": "Metro Center", "Min": ""}
      ]
    }"#;

    #[test]
    fn test_signage_words_map_to_statuses() {
        let payload: WmataResponse = serde_json::from_str(METRO_CENTER).unwrap();
        let arrivals = map_arrivals(&payload);

        // Ghost train row is dropped.
        assert_eq!(arrivals.len(), 3);

        let numeric = &arrivals[0];
        assert_eq!(numeric.arrival_time, "7 min");
        assert_eq!(numeric.status, ArrivalStatus::OnTime);
        assert_eq!(numeric.eta_seconds, Some(420));

        let arr = &arrivals[1];
        assert_eq!(arr.arrival_time, "Arriving");
        assert_eq!(arr.status, ArrivalStatus::Arrived);

        let brd = &arrivals[2];
        assert_eq!(brd.arrival_time, "Boarding");
        assert_eq!(brd.status, ArrivalStatus::Boarding);
        assert_eq!(brd.line, "Blue");
    }

    #[test]
    fn test_delayed_train_has_no_eta() {
        let payload: WmataResponse = serde_json::from_str(
            r#"{"Trains": [{"Destination": "Largo", "DestinationName": "Largo",
                "Group": "1", "Line": "SV", "Min": "DLY"}]}"#,
        )
        .unwrap();
        let arrivals = map_arrivals(&payload);

        assert_eq!(arrivals[0].status, ArrivalStatus::Delayed);
        assert_eq!(arrivals[0].eta_seconds, None);
        assert_eq!(arrivals[0].line, "Silver");
    }

    #[test]
    fn test_destination_name_preferred_over_abbreviation() {
        let payload: WmataResponse = serde_json::from_str(METRO_CENTER).unwrap();
        let arrivals = map_arrivals(&payload);
        assert_eq!(arrivals[2].destination, "Franconia-Springfield");
    }
}
