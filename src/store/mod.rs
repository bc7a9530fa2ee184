//! Persistence for incidents, group rides, messages, and profiles.
//!
//! [`Backend`] is the seam: [`MemoryBackend`] serves tests and the demo CLI,
//! [`RestBackend`] speaks the managed Postgres backend's REST conventions.
//! Both publish change events through a [`RealtimeHub`]. Row-level security
//! lives behind the REST surface and is not re-implemented here; this layer
//! attaches caller ids and trusts the backend's policies to enforce them.

mod feed;
mod memory;
pub mod models;
mod rest;

pub use feed::IncidentFeed;
pub use memory::MemoryBackend;
pub use rest::RestBackend;

use crate::realtime::RealtimeHub;
use async_trait::async_trait;
use models::{
    GroupMessage, GroupRide, IncidentReport, NewIncident, NewRide, Profile, RideMember,
};
use serde::Serialize;
use uuid::Uuid;

const DEFAULT_PAGE_LIMIT: usize = 20;
const MAX_PAGE_LIMIT: usize = 100;

/// A zero-based page request. Limits clamp to `1..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub limit: usize,
}

impl PageRequest {
    pub fn new(page: usize, limit: usize) -> Self {
        Self {
            page,
            limit: limit.clamp(1, MAX_PAGE_LIMIT),
        }
    }

    pub fn offset(&self) -> usize {
        self.page * self.limit
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 0,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

/// One page of rows plus the exact total, produced by a single backend
/// round trip so the count can never race the page contents.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: usize,
    pub limit: usize,
}

impl<T> Page<T> {
    pub fn has_next_page(&self) -> bool {
        ((self.page as u64 + 1) * self.limit as u64) < self.total
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("row not found")]
    NotFound,

    #[error("only the owning user may change this row")]
    NotOwner,

    #[error("ride is already full")]
    RideFull,

    #[error("already a member of this ride")]
    AlreadyJoined,

    #[error("backend request failed: {0}")]
    Transport(String),

    #[error("backend returned an unreadable response: {0}")]
    Decode(String),

    #[error("backend rejected the write: {0}")]
    Rejected(String),
}

/// The persistence operations the product needs.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn create_incident(&self, new: NewIncident) -> Result<IncidentReport, StoreError>;

    /// Newest-first page of a city's incidents.
    async fn incidents_page(
        &self,
        city: &str,
        page: PageRequest,
    ) -> Result<Page<IncidentReport>, StoreError>;

    /// Flips an active report to resolved. Only the owning reporter may.
    async fn resolve_incident(
        &self,
        id: Uuid,
        reporter_id: Uuid,
    ) -> Result<IncidentReport, StoreError>;

    async fn create_ride(&self, new: NewRide) -> Result<GroupRide, StoreError>;

    /// Soonest-departure-first page of a city's rides.
    async fn rides_page(&self, city: &str, page: PageRequest)
        -> Result<Page<GroupRide>, StoreError>;

    /// Adds a member, rejecting with [`StoreError::RideFull`] once
    /// `max_spots` is reached.
    async fn join_ride(&self, ride_id: Uuid, user_id: Uuid) -> Result<RideMember, StoreError>;

    async fn leave_ride(&self, ride_id: Uuid, user_id: Uuid) -> Result<(), StoreError>;

    async fn ride_members(&self, ride_id: Uuid) -> Result<Vec<RideMember>, StoreError>;

    async fn send_message(
        &self,
        ride_id: Uuid,
        sender_id: Uuid,
        body: String,
    ) -> Result<GroupMessage, StoreError>;

    /// Oldest-first page of a ride's messages.
    async fn messages_page(
        &self,
        ride_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<GroupMessage>, StoreError>;

    async fn get_profile(&self, user_id: Uuid) -> Result<Profile, StoreError>;

    async fn upsert_profile(&self, profile: Profile) -> Result<Profile, StoreError>;

    /// The hub this backend publishes change events through.
    fn hub(&self) -> &RealtimeHub;
}
