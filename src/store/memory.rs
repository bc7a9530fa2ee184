//! In-process [`Backend`] used by tests and the demo CLI.
//!
//! Enforces the same rules the production backend's policies do: capacity on
//! ride joins, owner checks on incident resolution, no physical deletes of
//! incident rows.

use super::models::{
    GroupMessage, GroupRide, IncidentReport, IncidentStatus, NewIncident, NewRide, Profile,
    RideMember,
};
use super::{Backend, Page, PageRequest, StoreError};
use crate::realtime::{ChangeEvent, ChangeOp, RealtimeHub, Table};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    incidents: Vec<IncidentReport>,
    rides: Vec<GroupRide>,
    members: Vec<RideMember>,
    messages: Vec<GroupMessage>,
    profiles: HashMap<Uuid, Profile>,
}

pub struct MemoryBackend {
    tables: RwLock<Tables>,
    hub: RealtimeHub,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            hub: RealtimeHub::new(),
        }
    }

    fn publish(&self, table: Table, op: ChangeOp, row_id: Uuid) {
        self.hub.publish(ChangeEvent { table, op, row_id });
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn paginate<T: Clone>(rows: Vec<T>, page: PageRequest) -> Page<T> {
    let total = rows.len() as u64;
    let items = rows
        .into_iter()
        .skip(page.offset())
        .take(page.limit)
        .collect();
    Page {
        items,
        total,
        page: page.page,
        limit: page.limit,
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn create_incident(&self, new: NewIncident) -> Result<IncidentReport, StoreError> {
        let report = IncidentReport {
            id: Uuid::new_v4(),
            reporter_id: new.reporter_id,
            city: new.city,
            incident_type: new.incident_type,
            transit_line: new.transit_line,
            location_name: new.location_name,
            description: new.description,
            latitude: new.latitude,
            longitude: new.longitude,
            accuracy: new.accuracy,
            image_url: new.image_url,
            status: IncidentStatus::Active,
            created_at: Utc::now(),
        };

        self.tables.write().await.incidents.push(report.clone());
        self.publish(Table::IncidentReports, ChangeOp::Insert, report.id);
        Ok(report)
    }

    async fn incidents_page(
        &self,
        city: &str,
        page: PageRequest,
    ) -> Result<Page<IncidentReport>, StoreError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<IncidentReport> = tables
            .incidents
            .iter()
            .filter(|i| i.city.eq_ignore_ascii_case(city))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(rows, page))
    }

    async fn resolve_incident(
        &self,
        id: Uuid,
        reporter_id: Uuid,
    ) -> Result<IncidentReport, StoreError> {
        let mut tables = self.tables.write().await;
        let report = tables
            .incidents
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or(StoreError::NotFound)?;
        if report.reporter_id != reporter_id {
            return Err(StoreError::NotOwner);
        }
        report.status = IncidentStatus::Resolved;
        let resolved = report.clone();
        drop(tables);

        self.publish(Table::IncidentReports, ChangeOp::Update, id);
        Ok(resolved)
    }

    async fn create_ride(&self, new: NewRide) -> Result<GroupRide, StoreError> {
        if new.max_spots == 0 {
            return Err(StoreError::Rejected("max_spots must be positive".into()));
        }
        let ride = GroupRide {
            id: Uuid::new_v4(),
            creator_id: new.creator_id,
            city: new.city,
            origin: new.origin,
            destination: new.destination,
            departure_at: new.departure_at,
            max_spots: new.max_spots,
            notes: new.notes,
            created_at: Utc::now(),
        };

        {
            let mut tables = self.tables.write().await;
            tables.rides.push(ride.clone());
            // The creator occupies the first spot.
            tables.members.push(RideMember {
                id: Uuid::new_v4(),
                ride_id: ride.id,
                user_id: ride.creator_id,
                joined_at: Utc::now(),
            });
        }

        self.publish(Table::GroupRides, ChangeOp::Insert, ride.id);
        Ok(ride)
    }

    async fn rides_page(
        &self,
        city: &str,
        page: PageRequest,
    ) -> Result<Page<GroupRide>, StoreError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<GroupRide> = tables
            .rides
            .iter()
            .filter(|r| r.city.eq_ignore_ascii_case(city))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.departure_at.cmp(&b.departure_at));
        Ok(paginate(rows, page))
    }

    async fn join_ride(&self, ride_id: Uuid, user_id: Uuid) -> Result<RideMember, StoreError> {
        let mut tables = self.tables.write().await;
        let ride = tables
            .rides
            .iter()
            .find(|r| r.id == ride_id)
            .ok_or(StoreError::NotFound)?;
        let max_spots = ride.max_spots as usize;

        let members = tables.members.iter().filter(|m| m.ride_id == ride_id);
        let mut count = 0;
        for member in members {
            if member.user_id == user_id {
                return Err(StoreError::AlreadyJoined);
            }
            count += 1;
        }
        if count >= max_spots {
            return Err(StoreError::RideFull);
        }

        let member = RideMember {
            id: Uuid::new_v4(),
            ride_id,
            user_id,
            joined_at: Utc::now(),
        };
        tables.members.push(member.clone());
        drop(tables);

        self.publish(Table::RideMembers, ChangeOp::Insert, member.id);
        Ok(member)
    }

    async fn leave_ride(&self, ride_id: Uuid, user_id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let before = tables.members.len();
        tables
            .members
            .retain(|m| !(m.ride_id == ride_id && m.user_id == user_id));
        if tables.members.len() == before {
            return Err(StoreError::NotFound);
        }
        drop(tables);

        self.publish(Table::RideMembers, ChangeOp::Delete, ride_id);
        Ok(())
    }

    async fn ride_members(&self, ride_id: Uuid) -> Result<Vec<RideMember>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .members
            .iter()
            .filter(|m| m.ride_id == ride_id)
            .cloned()
            .collect())
    }

    async fn send_message(
        &self,
        ride_id: Uuid,
        sender_id: Uuid,
        body: String,
    ) -> Result<GroupMessage, StoreError> {
        {
            let tables = self.tables.read().await;
            if !tables.rides.iter().any(|r| r.id == ride_id) {
                return Err(StoreError::NotFound);
            }
            if !tables
                .members
                .iter()
                .any(|m| m.ride_id == ride_id && m.user_id == sender_id)
            {
                return Err(StoreError::NotOwner);
            }
        }

        let message = GroupMessage {
            id: Uuid::new_v4(),
            ride_id,
            sender_id,
            body,
            created_at: Utc::now(),
        };
        self.tables.write().await.messages.push(message.clone());
        self.publish(Table::GroupMessages, ChangeOp::Insert, message.id);
        Ok(message)
    }

    async fn messages_page(
        &self,
        ride_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<GroupMessage>, StoreError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<GroupMessage> = tables
            .messages
            .iter()
            .filter(|m| m.ride_id == ride_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(paginate(rows, page))
    }

    async fn get_profile(&self, user_id: Uuid) -> Result<Profile, StoreError> {
        self.tables
            .read()
            .await
            .profiles
            .get(&user_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn upsert_profile(&self, profile: Profile) -> Result<Profile, StoreError> {
        let user_id = profile.user_id;
        self.tables
            .write()
            .await
            .profiles
            .insert(user_id, profile.clone());
        self.publish(Table::Profiles, ChangeOp::Update, user_id);
        Ok(profile)
    }

    fn hub(&self) -> &RealtimeHub {
        &self.hub
    }
}
