//! Endpoint handlers for the canonical service surface.

use super::error::{ApiError, ApiErrorCode};
use super::AppState;
use crate::agencies::{Agency, ArrivalsQuery};
use crate::schedule::ArrivalsResponse;
use crate::store::models::{
    GroupMessage, GroupRide, IncidentReport, NewIncident, NewRide, Profile, RideMember,
};
use crate::store::{Page, PageRequest};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// Page of rows in the wire shape the clients consume.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageBody<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: usize,
    pub limit: usize,
    pub has_next_page: bool,
}

impl<T> From<Page<T>> for PageBody<T> {
    fn from(page: Page<T>) -> Self {
        let has_next_page = page.has_next_page();
        Self {
            items: page.items,
            total: page.total,
            page: page.page,
            limit: page.limit,
            has_next_page,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl PageParams {
    fn request(&self) -> PageRequest {
        let defaults = PageRequest::default();
        PageRequest::new(
            self.page.unwrap_or(defaults.page),
            self.limit.unwrap_or(defaults.limit),
        )
    }
}

pub async fn healthz_handler(State(state): State<AppState>) -> Json<Value> {
    let uptime = (Utc::now() - state.started_at).num_seconds();
    Json(json!({ "status": "ok", "uptime_seconds": uptime }))
}

pub async fn agencies_handler(State(state): State<AppState>) -> Json<Value> {
    let agencies: Vec<Value> = state
        .registry
        .agencies()
        .into_iter()
        .map(|agency| {
            let ready = state
                .registry
                .get(agency)
                .map(|a| a.ready())
                .unwrap_or(false);
            json!({
                "id": agency.id(),
                "name": agency.display_name(),
                "ready": ready,
            })
        })
        .collect();
    Json(json!({ "agencies": agencies }))
}

#[derive(Debug, Deserialize)]
pub struct ArrivalsParams {
    pub station: String,
    #[serde(default)]
    pub routes: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

pub async fn arrivals_handler(
    State(state): State<AppState>,
    Path(agency_id): Path<String>,
    Query(params): Query<ArrivalsParams>,
) -> Result<Json<ArrivalsResponse>, ApiError> {
    let agency = Agency::from_id(&agency_id).ok_or_else(|| {
        ApiError::new(
            ApiErrorCode::UnknownAgency,
            format!("'{agency_id}' is not a supported agency"),
        )
        .with_details(json!({
            "supported": Agency::ALL.iter().map(|a| a.id()).collect::<Vec<_>>()
        }))
    })?;

    let station = params.station.trim();
    if station.is_empty() {
        return Err(ApiError::invalid_params("station must not be empty"));
    }

    let query = ArrivalsQuery {
        station: station.to_string(),
        routes: params
            .routes
            .as_deref()
            .map(|r| {
                r.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        limit: params.limit,
    };

    let arrivals = state.registry.arrivals(agency, &query).await?;

    Ok(Json(ArrivalsResponse {
        agency: agency.id().to_string(),
        station: query.station,
        arrivals,
        timestamp: Utc::now(),
    }))
}

pub async fn create_incident_handler(
    State(state): State<AppState>,
    Json(new): Json<NewIncident>,
) -> Result<(StatusCode, Json<IncidentReport>), ApiError> {
    if new.city.trim().is_empty() {
        return Err(ApiError::invalid_params("city must not be empty"));
    }
    if new.incident_type.trim().is_empty() {
        return Err(ApiError::invalid_params("incident_type must not be empty"));
    }
    if new.description.trim().is_empty() {
        return Err(ApiError::invalid_params("description must not be empty"));
    }

    let report = state.backend.create_incident(new).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

// Not a flattened PageParams: serde_urlencoded cannot drive flattened
// numeric fields through axum's Query extractor.
#[derive(Debug, Deserialize)]
pub struct CityPageParams {
    pub city: String,
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl CityPageParams {
    fn request(&self) -> PageRequest {
        let defaults = PageRequest::default();
        PageRequest::new(
            self.page.unwrap_or(defaults.page),
            self.limit.unwrap_or(defaults.limit),
        )
    }
}

pub async fn incidents_handler(
    State(state): State<AppState>,
    Query(params): Query<CityPageParams>,
) -> Result<Json<PageBody<IncidentReport>>, ApiError> {
    let page = state
        .backend
        .incidents_page(&params.city, params.request())
        .await?;
    Ok(Json(page.into()))
}

#[derive(Debug, Deserialize)]
pub struct ResolveBody {
    pub reporter_id: Uuid,
}

pub async fn resolve_incident_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ResolveBody>,
) -> Result<Json<IncidentReport>, ApiError> {
    let report = state
        .backend
        .resolve_incident(id, body.reporter_id)
        .await?;
    Ok(Json(report))
}

pub async fn create_ride_handler(
    State(state): State<AppState>,
    Json(new): Json<NewRide>,
) -> Result<(StatusCode, Json<GroupRide>), ApiError> {
    if new.city.trim().is_empty() {
        return Err(ApiError::invalid_params("city must not be empty"));
    }
    if new.max_spots == 0 {
        return Err(ApiError::invalid_params("max_spots must be at least 1"));
    }

    let ride = state.backend.create_ride(new).await?;
    Ok((StatusCode::CREATED, Json(ride)))
}

pub async fn rides_handler(
    State(state): State<AppState>,
    Query(params): Query<CityPageParams>,
) -> Result<Json<PageBody<GroupRide>>, ApiError> {
    let page = state
        .backend
        .rides_page(&params.city, params.request())
        .await?;
    Ok(Json(page.into()))
}

#[derive(Debug, Deserialize)]
pub struct MemberBody {
    pub user_id: Uuid,
}

pub async fn join_ride_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<MemberBody>,
) -> Result<(StatusCode, Json<RideMember>), ApiError> {
    let member = state.backend.join_ride(id, body.user_id).await?;
    Ok((StatusCode::CREATED, Json(member)))
}

pub async fn leave_ride_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<MemberBody>,
) -> Result<StatusCode, ApiError> {
    state.backend.leave_ride(id, body.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn ride_members_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<RideMember>>, ApiError> {
    Ok(Json(state.backend.ride_members(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct MessageBody {
    pub sender_id: Uuid,
    pub body: String,
}

pub async fn send_message_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<MessageBody>,
) -> Result<(StatusCode, Json<GroupMessage>), ApiError> {
    if body.body.trim().is_empty() {
        return Err(ApiError::invalid_params("message body must not be empty"));
    }
    let message = state
        .backend
        .send_message(id, body.sender_id, body.body)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn messages_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<PageParams>,
) -> Result<Json<PageBody<GroupMessage>>, ApiError> {
    let page = state
        .backend
        .messages_page(id, params.request())
        .await?;
    Ok(Json(page.into()))
}

pub async fn get_profile_handler(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Profile>, ApiError> {
    Ok(Json(state.backend.get_profile(user_id).await?))
}

pub async fn put_profile_handler(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(mut profile): Json<Profile>,
) -> Result<Json<Profile>, ApiError> {
    // The path wins over whatever id rode in on the body.
    profile.user_id = user_id;
    profile.updated_at = Utc::now();
    Ok(Json(state.backend.upsert_profile(profile).await?))
}
