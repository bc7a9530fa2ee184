//! [`Backend`] over the managed Postgres backend's REST surface.
//!
//! Follows PostgREST conventions: filter expressions in the query string,
//! `Prefer: count=exact` plus `Range` headers so a page and its exact total
//! arrive in one round trip, `Prefer: return=representation` so writes echo
//! the stored row. Row-level security runs behind this surface; the service
//! key this client authenticates with determines what the policies allow.
//!
//! The backend's own realtime channels are not bridged here; the hub echoes
//! mutations made through this process so local subscribers still invalidate.

use super::models::{
    GroupMessage, GroupRide, IncidentReport, IncidentStatus, NewIncident, NewRide, Profile,
    RideMember,
};
use super::{Backend, Page, PageRequest, StoreError};
use crate::config::BackendConfig;
use crate::realtime::{ChangeEvent, ChangeOp, RealtimeHub, Table};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

pub struct RestBackend {
    base_url: String,
    client: reqwest::Client,
    hub: RealtimeHub,
}

impl RestBackend {
    pub fn new(config: &BackendConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        let mut key: HeaderValue = config.service_key.parse()?;
        key.set_sensitive(true);
        headers.insert("apikey", key);
        let mut bearer: HeaderValue = format!("Bearer {}", config.service_key).parse()?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            base_url: config.base_url.clone(),
            client,
            hub: RealtimeHub::new(),
        })
    }

    fn url(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.base_url, table.name())
    }

    fn publish(&self, table: Table, op: ChangeOp, row_id: Uuid) {
        self.hub.publish(ChangeEvent { table, op, row_id });
    }

    /// One paged read: rows plus the exact total from `Content-Range`.
    async fn select_page<T: DeserializeOwned>(
        &self,
        table: Table,
        filter: &str,
        order: &str,
        page: PageRequest,
    ) -> Result<Page<T>, StoreError> {
        let url = format!("{}?{filter}&order={order}", self.url(table));
        let from = page.offset();
        let to = from + page.limit - 1;

        let resp = self
            .client
            .get(&url)
            .header("Range-Unit", "items")
            .header("Range", format!("{from}-{to}"))
            .header("Prefer", "count=exact")
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let status = resp.status();
        // 416 means the requested page starts past the end; PostgREST still
        // reports the total in Content-Range.
        if !status.is_success() && status != StatusCode::RANGE_NOT_SATISFIABLE {
            return Err(reject(table, status, resp.text().await.unwrap_or_default()));
        }

        let total = resp
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total)
            .unwrap_or(0);

        let items: Vec<T> = if status == StatusCode::RANGE_NOT_SATISFIABLE {
            Vec::new()
        } else {
            resp.json()
                .await
                .map_err(|e| StoreError::Decode(e.to_string()))?
        };

        debug!(table = table.name(), total, returned = items.len(), "Page fetched");

        Ok(Page {
            items,
            total,
            page: page.page,
            limit: page.limit,
        })
    }

    /// Inserts one row and returns the stored representation.
    async fn insert_row<T: DeserializeOwned, B: Serialize>(
        &self,
        table: Table,
        body: &B,
    ) -> Result<T, StoreError> {
        let resp = self
            .client
            .post(self.url(table))
            .header("Prefer", "return=representation")
            .json(&[body])
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(reject(table, status, resp.text().await.unwrap_or_default()));
        }

        let mut rows: Vec<T> = resp
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        rows.pop().ok_or(StoreError::NotFound)
    }

    async fn row_exists(&self, table: Table, id: Uuid) -> Result<bool, StoreError> {
        let url = format!("{}?id=eq.{id}&select=id", self.url(table));
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        let rows: Vec<serde_json::Value> = resp
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(!rows.is_empty())
    }
}

/// `Content-Range: 0-19/134` (or `*/0` for an empty set).
fn parse_content_range_total(value: &str) -> Option<u64> {
    value.rsplit_once('/')?.1.parse().ok()
}

fn reject(table: Table, status: StatusCode, body: String) -> StoreError {
    match status {
        StatusCode::NOT_FOUND => StoreError::NotFound,
        StatusCode::CONFLICT => StoreError::Rejected(format!(
            "{}: constraint violation: {body}",
            table.name()
        )),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StoreError::NotOwner,
        _ => StoreError::Rejected(format!("{}: HTTP {status}: {body}", table.name())),
    }
}

#[async_trait]
impl Backend for RestBackend {
    async fn create_incident(&self, new: NewIncident) -> Result<IncidentReport, StoreError> {
        let report: IncidentReport = self.insert_row(Table::IncidentReports, &new).await?;
        self.publish(Table::IncidentReports, ChangeOp::Insert, report.id);
        Ok(report)
    }

    async fn incidents_page(
        &self,
        city: &str,
        page: PageRequest,
    ) -> Result<Page<IncidentReport>, StoreError> {
        self.select_page(
            Table::IncidentReports,
            &format!("city=ilike.{city}"),
            "created_at.desc",
            page,
        )
        .await
    }

    async fn resolve_incident(
        &self,
        id: Uuid,
        reporter_id: Uuid,
    ) -> Result<IncidentReport, StoreError> {
        let url = format!(
            "{}?id=eq.{id}&reporter_id=eq.{reporter_id}",
            self.url(Table::IncidentReports)
        );
        let resp = self
            .client
            .patch(&url)
            .header("Prefer", "return=representation")
            .json(&json!({"status": IncidentStatus::Resolved}))
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(reject(
                Table::IncidentReports,
                status,
                resp.text().await.unwrap_or_default(),
            ));
        }

        let mut rows: Vec<IncidentReport> = resp
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        match rows.pop() {
            Some(report) => {
                self.publish(Table::IncidentReports, ChangeOp::Update, id);
                Ok(report)
            }
            // The filter matched nothing: either the row is someone else's
            // or it does not exist. One extra probe tells the caller which.
            None => {
                if self.row_exists(Table::IncidentReports, id).await? {
                    Err(StoreError::NotOwner)
                } else {
                    Err(StoreError::NotFound)
                }
            }
        }
    }

    async fn create_ride(&self, new: NewRide) -> Result<GroupRide, StoreError> {
        let ride: GroupRide = self.insert_row(Table::GroupRides, &new).await?;
        // The creator occupies the first spot.
        let _: RideMember = self
            .insert_row(
                Table::RideMembers,
                &json!({"ride_id": ride.id, "user_id": ride.creator_id}),
            )
            .await?;
        self.publish(Table::GroupRides, ChangeOp::Insert, ride.id);
        Ok(ride)
    }

    async fn rides_page(
        &self,
        city: &str,
        page: PageRequest,
    ) -> Result<Page<GroupRide>, StoreError> {
        self.select_page(
            Table::GroupRides,
            &format!("city=ilike.{city}"),
            "departure_at.asc",
            page,
        )
        .await
    }

    async fn join_ride(&self, ride_id: Uuid, user_id: Uuid) -> Result<RideMember, StoreError> {
        let result: Result<RideMember, StoreError> = self
            .insert_row(
                Table::RideMembers,
                &json!({"ride_id": ride_id, "user_id": user_id}),
            )
            .await;

        match result {
            Ok(member) => {
                self.publish(Table::RideMembers, ChangeOp::Insert, member.id);
                Ok(member)
            }
            // The capacity trigger and the membership uniqueness constraint
            // both surface as conflicts; tell them apart by message.
            Err(StoreError::Rejected(message)) if message.contains("constraint") => {
                if message.contains("unique") || message.contains("duplicate") {
                    Err(StoreError::AlreadyJoined)
                } else {
                    Err(StoreError::RideFull)
                }
            }
            Err(other) => Err(other),
        }
    }

    async fn leave_ride(&self, ride_id: Uuid, user_id: Uuid) -> Result<(), StoreError> {
        let url = format!(
            "{}?ride_id=eq.{ride_id}&user_id=eq.{user_id}",
            self.url(Table::RideMembers)
        );
        let resp = self
            .client
            .delete(&url)
            .header("Prefer", "return=representation")
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(reject(
                Table::RideMembers,
                status,
                resp.text().await.unwrap_or_default(),
            ));
        }
        let rows: Vec<RideMember> = resp
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        if rows.is_empty() {
            return Err(StoreError::NotFound);
        }

        self.publish(Table::RideMembers, ChangeOp::Delete, ride_id);
        Ok(())
    }

    async fn ride_members(&self, ride_id: Uuid) -> Result<Vec<RideMember>, StoreError> {
        let page = self
            .select_page(
                Table::RideMembers,
                &format!("ride_id=eq.{ride_id}"),
                "joined_at.asc",
                PageRequest::new(0, 100),
            )
            .await?;
        Ok(page.items)
    }

    async fn send_message(
        &self,
        ride_id: Uuid,
        sender_id: Uuid,
        body: String,
    ) -> Result<GroupMessage, StoreError> {
        let message: GroupMessage = self
            .insert_row(
                Table::GroupMessages,
                &json!({"ride_id": ride_id, "sender_id": sender_id, "body": body}),
            )
            .await?;
        self.publish(Table::GroupMessages, ChangeOp::Insert, message.id);
        Ok(message)
    }

    async fn messages_page(
        &self,
        ride_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<GroupMessage>, StoreError> {
        self.select_page(
            Table::GroupMessages,
            &format!("ride_id=eq.{ride_id}"),
            "created_at.asc",
            page,
        )
        .await
    }

    async fn get_profile(&self, user_id: Uuid) -> Result<Profile, StoreError> {
        let page: Page<Profile> = self
            .select_page(
                Table::Profiles,
                &format!("user_id=eq.{user_id}"),
                "updated_at.desc",
                PageRequest::new(0, 1),
            )
            .await?;
        page.items.into_iter().next().ok_or(StoreError::NotFound)
    }

    async fn upsert_profile(&self, profile: Profile) -> Result<Profile, StoreError> {
        let resp = self
            .client
            .post(self.url(Table::Profiles))
            .header(
                "Prefer",
                "resolution=merge-duplicates,return=representation",
            )
            .json(&[&profile])
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(reject(
                Table::Profiles,
                status,
                resp.text().await.unwrap_or_default(),
            ));
        }

        let mut rows: Vec<Profile> = resp
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        let stored = rows.pop().ok_or(StoreError::NotFound)?;
        self.publish(Table::Profiles, ChangeOp::Update, stored.user_id);
        Ok(stored)
    }

    fn hub(&self) -> &RealtimeHub {
        &self.hub
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_range_total() {
        assert_eq!(parse_content_range_total("0-19/134"), Some(134));
        assert_eq!(parse_content_range_total("*/0"), Some(0));
        assert_eq!(parse_content_range_total("0-19/*"), None);
        assert_eq!(parse_content_range_total("garbage"), None);
    }

    #[test]
    fn test_reject_maps_statuses() {
        assert!(matches!(
            reject(Table::GroupRides, StatusCode::NOT_FOUND, String::new()),
            StoreError::NotFound
        ));
        assert!(matches!(
            reject(Table::GroupRides, StatusCode::FORBIDDEN, String::new()),
            StoreError::NotOwner
        ));
        assert!(matches!(
            reject(Table::RideMembers, StatusCode::CONFLICT, "x".into()),
            StoreError::Rejected(_)
        ));
    }
}
