//! Shared GTFS-Realtime extraction for the protobuf agencies (MTA, RTD,
//! LA Metro).
//!
//! These feeds publish raw POSIX predictions per trip and stop; this module
//! decodes the feed and flattens the stop time updates for one stop into
//! [`StopTimeArrival`]s, one shared derivation instead of a copy per agency.

use crate::arrivals::ArrivalStatus;
use crate::gtfs_rt::trip_update::stop_time_update::ScheduleRelationship;
use crate::gtfs_rt::FeedMessage;
use anyhow::Result;
use prost::Message;

/// Trains already gone still linger in some feeds with slightly-past
/// predictions; anything older than this is dropped.
const DEPARTED_GRACE_SECS: i64 = 30;

/// Predictions more than a minute behind schedule count as delayed.
const DELAY_THRESHOLD_SECS: i64 = 60;

/// One stop time update flattened out of a feed, still in GTFS terms.
#[derive(Debug, Clone, PartialEq)]
pub struct StopTimeArrival {
    pub route_id: String,
    pub stop_id: String,
    pub direction_id: Option<u32>,
    pub eta_seconds: i64,
    pub delay_seconds: Option<i64>,
}

/// Decodes a protobuf-encoded GTFS-RT [`FeedMessage`] from raw bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not valid protobuf for a `FeedMessage`.
pub fn parse_feed(bytes: &[u8]) -> Result<FeedMessage> {
    Ok(FeedMessage::decode(bytes)?)
}

/// Collects upcoming arrivals at a stop.
///
/// `stop_prefix` matches GTFS stop ids by prefix so a parent station id
/// ("127") picks up its directional platforms ("127N", "127S"). Skipped
/// stops, deleted entities, and departures older than the grace window are
/// dropped. `now_unix` is passed in so callers (and tests) control the clock.
pub fn arrivals_at_stop(
    feed: &FeedMessage,
    stop_prefix: &str,
    now_unix: i64,
) -> Vec<StopTimeArrival> {
    let mut out = Vec::new();

    for entity in &feed.entity {
        if entity.is_deleted() {
            continue;
        }
        let Some(update) = &entity.trip_update else {
            continue;
        };
        let route_id = update.trip.route_id().to_string();
        let direction_id = update.trip.direction_id;

        for stu in &update.stop_time_update {
            let stop_id = stu.stop_id();
            if !stop_id.starts_with(stop_prefix) {
                continue;
            }
            if stu.schedule_relationship() == ScheduleRelationship::Skipped {
                continue;
            }
            let event = stu.arrival.as_ref().or(stu.departure.as_ref());
            let Some(event) = event else {
                continue;
            };
            let Some(time) = event.time else {
                continue;
            };
            let eta = time - now_unix;
            if eta < -DEPARTED_GRACE_SECS {
                continue;
            }

            out.push(StopTimeArrival {
                route_id: route_id.clone(),
                stop_id: stop_id.to_string(),
                direction_id,
                eta_seconds: eta.max(0),
                delay_seconds: event.delay.map(i64::from),
            });
        }
    }

    out
}

/// Status and delay label from a GTFS-RT delay value.
pub fn delay_fields(delay_seconds: Option<i64>) -> (ArrivalStatus, String) {
    match delay_seconds {
        Some(delay) if delay > DELAY_THRESHOLD_SECS => {
            let minutes = (delay + 30) / 60;
            (ArrivalStatus::Delayed, format!("{minutes} min late"))
        }
        _ => (ArrivalStatus::OnTime, String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gtfs_rt::trip_update::{StopTimeEvent, StopTimeUpdate};
    use crate::gtfs_rt::{FeedEntity, FeedHeader, FeedMessage, TripDescriptor, TripUpdate};

    fn header() -> FeedHeader {
        FeedHeader {
            gtfs_realtime_version: "2.0".to_string(),
            incrementality: None,
            timestamp: Some(1_700_000_000),
        }
    }

    fn trip_entity(id: &str, route: &str, stops: Vec<(&str, i64)>) -> FeedEntity {
        FeedEntity {
            id: id.to_string(),
            is_deleted: None,
            trip_update: Some(TripUpdate {
                trip: TripDescriptor {
                    trip_id: Some(format!("trip-{id}")),
                    route_id: Some(route.to_string()),
                    direction_id: Some(0),
                    start_time: None,
                    start_date: None,
                    schedule_relationship: None,
                },
                vehicle: None,
                stop_time_update: stops
                    .into_iter()
                    .map(|(stop_id, time)| StopTimeUpdate {
                        stop_sequence: None,
                        stop_id: Some(stop_id.to_string()),
                        arrival: Some(StopTimeEvent {
                            delay: None,
                            time: Some(time),
                            uncertainty: None,
                        }),
                        departure: None,
                        schedule_relationship: None,
                    })
                    .collect(),
                timestamp: None,
                delay: None,
            }),
            vehicle: None,
        }
    }

    #[test]
    fn test_parse_round_trip() {
        let feed = FeedMessage {
            header: header(),
            entity: vec![trip_entity("1", "A", vec![("127N", 1_700_000_300)])],
        };
        let parsed = parse_feed(&feed.encode_to_vec()).unwrap();
        assert_eq!(parsed.entity.len(), 1);
        assert_eq!(parsed.header.gtfs_realtime_version, "2.0");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_feed(&[0xFF, 0xFE, 0x00, 0x01]).is_err());
    }

    #[test]
    fn test_prefix_matches_directional_platforms() {
        let now = 1_700_000_000;
        let feed = FeedMessage {
            header: header(),
            entity: vec![
                trip_entity("1", "1", vec![("127N", now + 120)]),
                trip_entity("2", "2", vec![("127S", now + 60)]),
                trip_entity("3", "3", vec![("631N", now + 30)]),
            ],
        };

        let arrivals = arrivals_at_stop(&feed, "127", now);
        assert_eq!(arrivals.len(), 2);
        assert!(arrivals.iter().all(|a| a.stop_id.starts_with("127")));
    }

    #[test]
    fn test_departed_trains_are_dropped() {
        let now = 1_700_000_000;
        let feed = FeedMessage {
            header: header(),
            entity: vec![
                trip_entity("1", "1", vec![("127N", now - 120)]),
                trip_entity("2", "1", vec![("127N", now - 10)]),
            ],
        };

        let arrivals = arrivals_at_stop(&feed, "127", now);
        // Slightly-past predictions clamp to zero; long-gone ones drop.
        assert_eq!(arrivals.len(), 1);
        assert_eq!(arrivals[0].eta_seconds, 0);
    }

    #[test]
    fn test_delay_fields_thresholds() {
        assert_eq!(delay_fields(None).0, ArrivalStatus::OnTime);
        assert_eq!(delay_fields(Some(45)).0, ArrivalStatus::OnTime);
        let (status, label) = delay_fields(Some(150));
        assert_eq!(status, ArrivalStatus::Delayed);
        assert_eq!(label, "3 min late");
    }
}
