//! MTA New York City Transit subway arrivals.
//!
//! Upstream: the NYCT GTFS-RT feeds, one protobuf feed per route group, no
//! key required. A station query is a GTFS stop id; the parent form ("127")
//! matches both directional platforms ("127N"/"127S"). Routes select which
//! feeds to pull; with no routes the 1-6/S feed is used.

use super::feed::{arrivals_at_stop, delay_fields, parse_feed};
use super::{AdapterError, Agency, AgencyAdapter, ArrivalsQuery};
use crate::arrivals::{label_for_eta, StandardArrival};
use crate::fetch::{fetch_bytes, BasicClient, RequestPolicy};
use async_trait::async_trait;
use chrono::Utc;

const FEED_BASE: &str = "https://api-endpoint.mta.info/Dataservice/mtagtfsfeeds/nyct%2Fgtfs";

/// Maps a subway route to its feed URL suffix.
fn feed_suffix(route: &str) -> Option<&'static str> {
    match route {
        "1" | "2" | "3" | "4" | "5" | "6" | "GS" | "S" => Some(""),
        "A" | "C" | "E" => Some("-ace"),
        "B" | "D" | "F" | "M" => Some("-bdfm"),
        "G" => Some("-g"),
        "J" | "Z" => Some("-jz"),
        "N" | "Q" | "R" | "W" => Some("-nqrw"),
        "L" => Some("-l"),
        "7" => Some("-7"),
        "SI" | "SIR" => Some("-si"),
        _ => None,
    }
}

/// Deduplicated feed URLs for a set of routes.
fn feed_urls(routes: &[String]) -> Result<Vec<String>, AdapterError> {
    if routes.is_empty() {
        return Ok(vec![FEED_BASE.to_string()]);
    }

    let mut seen = Vec::new();
    let mut urls = Vec::new();
    for route in routes {
        let upper = route.to_ascii_uppercase();
        let suffix = feed_suffix(&upper).ok_or_else(|| AdapterError::UnknownRoute {
            agency: "mta",
            route: route.clone(),
        })?;
        if !seen.contains(&suffix) {
            seen.push(suffix);
            urls.push(format!("{FEED_BASE}{suffix}"));
        }
    }
    Ok(urls)
}

fn direction_word(stop_id: &str) -> (&'static str, &'static str) {
    match stop_id.chars().last() {
        Some('N') => ("N", "Northbound"),
        Some('S') => ("S", "Southbound"),
        _ => ("", ""),
    }
}

pub struct MtaAdapter {
    client: BasicClient,
    policy: RequestPolicy,
}

impl MtaAdapter {
    pub fn new(policy: RequestPolicy) -> Self {
        Self {
            client: BasicClient::new(),
            policy,
        }
    }
}

#[async_trait]
impl AgencyAdapter for MtaAdapter {
    fn agency(&self) -> Agency {
        Agency::Mta
    }

    async fn arrivals(&self, query: &ArrivalsQuery) -> Result<Vec<StandardArrival>, AdapterError> {
        let now = Utc::now().timestamp();
        let mut arrivals = Vec::new();

        for url in feed_urls(&query.routes)? {
            let bytes = fetch_bytes(&self.client, &url, &self.policy).await?;
            let feed = parse_feed(&bytes).map_err(|e| AdapterError::Vendor {
                agency: "mta",
                message: e.to_string(),
            })?;

            for stop_arrival in arrivals_at_stop(&feed, &query.station, now) {
                let (direction, dest_word) = direction_word(&stop_arrival.stop_id);
                let (status, delay) = delay_fields(stop_arrival.delay_seconds);

                // NYCT trip updates carry no headsign; the direction word is
                // the best rider-facing destination the feed offers.
                arrivals.push(StandardArrival {
                    line: stop_arrival.route_id,
                    destination: dest_word.to_string(),
                    arrival_time: label_for_eta(stop_arrival.eta_seconds),
                    direction: direction.to_string(),
                    status,
                    delay,
                    eta_seconds: Some(stop_arrival.eta_seconds),
                });
            }
        }

        Ok(query.finish(arrivals))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_suffix_for_known_routes() {
        assert_eq!(feed_suffix("1"), Some(""));
        assert_eq!(feed_suffix("A"), Some("-ace"));
        assert_eq!(feed_suffix("N"), Some("-nqrw"));
        assert_eq!(feed_suffix("L"), Some("-l"));
        assert_eq!(feed_suffix("7"), Some("-7"));
        assert_eq!(feed_suffix("X"), None);
    }

    #[test]
    fn test_feed_urls_deduplicate_shared_feeds() {
        let routes: Vec<String> = vec!["1".into(), "2".into(), "3".into(), "A".into()];
        let urls = feed_urls(&routes).unwrap();
        // 1, 2, 3 share the base feed; A is separate.
        assert_eq!(urls.len(), 2);
    }

    #[test]
    fn test_unknown_route_is_an_error() {
        let routes: Vec<String> = vec!["X9".into()];
        assert!(matches!(
            feed_urls(&routes),
            Err(AdapterError::UnknownRoute { .. })
        ));
    }

    #[test]
    fn test_no_routes_defaults_to_base_feed() {
        let urls = feed_urls(&[]).unwrap();
        assert_eq!(urls, vec![FEED_BASE.to_string()]);
    }

    #[test]
    fn test_direction_word_from_platform_suffix() {
        assert_eq!(direction_word("127N"), ("N", "Northbound"));
        assert_eq!(direction_word("127S"), ("S", "Southbound"));
        assert_eq!(direction_word("127"), ("", ""));
    }
}
