//! Row types for the backend tables.
//!
//! Field names serialize snake_case to line up with the Postgres columns,
//! so the same types work for the REST backend and the canonical HTTP
//! surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Active,
    Resolved,
}

/// A rider-filed incident. Rows are never physically deleted; resolution is
/// a status flip performed by the owning reporter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentReport {
    pub id: Uuid,
    pub reporter_id: Uuid,
    pub city: String,
    pub incident_type: String,
    pub transit_line: String,
    pub location_name: String,
    pub description: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub accuracy: Option<f64>,
    pub image_url: Option<String>,
    pub status: IncidentStatus,
    pub created_at: DateTime<Utc>,
}

/// Fields the reporter supplies when filing. `reporter_id` is attached
/// client-side; row-level security on the backend is what actually binds
/// rows to the authenticated caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewIncident {
    pub reporter_id: Uuid,
    pub city: String,
    pub incident_type: String,
    pub transit_line: String,
    pub location_name: String,
    pub description: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRide {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub city: String,
    pub origin: String,
    pub destination: String,
    pub departure_at: DateTime<Utc>,
    pub max_spots: u32,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRide {
    pub creator_id: Uuid,
    pub city: String,
    pub origin: String,
    pub destination: String,
    pub departure_at: DateTime<Utc>,
    pub max_spots: u32,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideMember {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub user_id: Uuid,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMessage {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// One row per authenticated user; read and written only by its owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: Uuid,
    pub display_name: String,
    #[serde(default)]
    pub university: Option<String>,
    pub verified: bool,
    pub updated_at: DateTime<Utc>,
}
