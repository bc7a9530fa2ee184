//! The normalized arrival record every agency adapter produces.
//!
//! Vendor payloads differ wildly (JSON predictions, SIRI stop monitoring,
//! GTFS-RT trip updates); everything is flattened into [`StandardArrival`]
//! before it leaves an adapter. The only cross-agency invariant is ordering:
//! a successful response is sorted ascending by time to arrival.

use serde::{Deserialize, Serialize};

/// Coarse arrival state, agency-agnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArrivalStatus {
    OnTime,
    Delayed,
    Boarding,
    Arrived,
}

/// One upcoming train at a station, in the canonical wire shape.
///
/// `arrival_time` is the rider-facing label the agency's own signage would
/// show ("Arriving", "Boarding", "7 min"); `eta_seconds` is the machine
/// estimate the sort order runs on. Arrivals with no usable estimate keep
/// `eta_seconds = None` and sort last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StandardArrival {
    pub line: String,
    pub destination: String,
    pub arrival_time: String,
    pub direction: String,
    pub status: ArrivalStatus,
    #[serde(default)]
    pub delay: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<i64>,
}

/// Sorts arrivals ascending by estimated time to arrival.
///
/// Stable, so arrivals the vendor reported without an estimate keep their
/// upstream relative order at the tail.
pub fn sort_arrivals(arrivals: &mut [StandardArrival]) {
    arrivals.sort_by_key(|a| a.eta_seconds.unwrap_or(i64::MAX));
}

/// Countdown label for agencies that publish raw predictions and no display
/// text of their own (the GTFS-RT feeds, SEPTA, 511).
///
/// Agencies with signage text keep it (WMATA's `ARR`/`BRD`, MBTA's
/// 30/60/90-second tiers, MARTA's `WAITING_TIME`); those are that agency's
/// own semantics, not shared ones.
pub fn label_for_eta(eta_seconds: i64) -> String {
    if eta_seconds <= 30 {
        return "Due".to_string();
    }
    let minutes = ((eta_seconds + 30) / 60).max(1);
    format!("{minutes} min")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arrival(line: &str, eta: Option<i64>) -> StandardArrival {
        StandardArrival {
            line: line.to_string(),
            destination: "Test".to_string(),
            arrival_time: "5 min".to_string(),
            direction: "N".to_string(),
            status: ArrivalStatus::OnTime,
            delay: String::new(),
            eta_seconds: eta,
        }
    }

    #[test]
    fn test_sort_ascending_by_eta() {
        let mut arrivals = vec![
            arrival("Red", Some(420)),
            arrival("Purple", Some(60)),
            arrival("Yellow", Some(180)),
        ];
        sort_arrivals(&mut arrivals);

        let lines: Vec<_> = arrivals.iter().map(|a| a.line.as_str()).collect();
        assert_eq!(lines, ["Purple", "Yellow", "Red"]);
    }

    #[test]
    fn test_sort_puts_unknown_eta_last() {
        let mut arrivals = vec![
            arrival("A", None),
            arrival("B", Some(30)),
            arrival("C", None),
        ];
        sort_arrivals(&mut arrivals);

        assert_eq!(arrivals[0].line, "B");
        // Stable: A and C keep their relative order.
        assert_eq!(arrivals[1].line, "A");
        assert_eq!(arrivals[2].line, "C");
    }

    #[test]
    fn test_label_tiers() {
        assert_eq!(label_for_eta(0), "Due");
        assert_eq!(label_for_eta(30), "Due");
        assert_eq!(label_for_eta(31), "1 min");
        assert_eq!(label_for_eta(90), "2 min");
        assert_eq!(label_for_eta(420), "7 min");
    }

    #[test]
    fn test_wire_shape_is_camel_case() {
        let json = serde_json::to_value(arrival("Red", Some(60))).unwrap();
        assert!(json.get("arrivalTime").is_some());
        assert!(json.get("etaSeconds").is_some());
        assert_eq!(json["status"], "OnTime");
    }

    #[test]
    fn test_eta_omitted_when_unknown() {
        let json = serde_json::to_value(arrival("Red", None)).unwrap();
        assert!(json.get("etaSeconds").is_none());
    }
}
