//! The SOS failsafe.
//!
//! Lifecycle: `Idle -> Holding (1s window) -> Activating -> Done | Failed`.
//! Releasing the button before the hold window elapses cancels with zero
//! side effects. Activation grabs a best-effort GPS fix under its own
//! timeout, writes an emergency-tagged incident, then fires the backup
//! logging call. The backup call is the one intentionally-silent failure
//! path in the system: its errors are logged and swallowed so they can never
//! block the primary flow. A failed incident write is terminal; the caller
//! is expected to tell the user to dial emergency services directly.

use crate::fetch::RequestPolicy;
use crate::store::models::{IncidentReport, NewIncident};
use crate::store::{Backend, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

pub const HOLD_WINDOW: Duration = Duration::from_secs(1);

const LOCATION_TIMEOUT: Duration = Duration::from_secs(5);

const EMERGENCY_INCIDENT_TYPE: &str = "emergency";

/// A device location fix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoFix {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: Option<f64>,
}

#[derive(Debug, thiserror::Error)]
pub enum LocationError {
    #[error("location permission denied")]
    Denied,
    #[error("no position available")]
    Unavailable,
}

/// Source of device GPS fixes.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    async fn current(&self) -> Result<GeoFix, LocationError>;
}

/// A provider with no device behind it. Activation proceeds without
/// coordinates.
pub struct NoLocation;

#[async_trait]
impl LocationProvider for NoLocation {
    async fn current(&self) -> Result<GeoFix, LocationError> {
        Err(LocationError::Unavailable)
    }
}

/// A fixed coordinate, for the demo CLI and tests.
pub struct StaticLocation(pub GeoFix);

#[async_trait]
impl LocationProvider for StaticLocation {
    async fn current(&self) -> Result<GeoFix, LocationError> {
        Ok(self.0)
    }
}

/// Payload for the secondary logging path.
#[derive(Debug, Clone, Serialize)]
pub struct BackupEvent {
    pub reporter_id: Uuid,
    pub city: String,
    pub transit_line: String,
    pub occurred_at: DateTime<Utc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Secondary logging sink for activations. Failures here never propagate to
/// the rider-visible flow.
#[async_trait]
pub trait BackupLogger: Send + Sync {
    async fn log(&self, event: &BackupEvent) -> anyhow::Result<()>;
}

/// Posts backup events to an HTTP endpoint under the quick policy.
pub struct HttpBackupLogger {
    url: String,
    client: reqwest::Client,
}

impl HttpBackupLogger {
    pub fn new(url: impl Into<String>) -> anyhow::Result<Self> {
        let policy = RequestPolicy::quick();
        let client = reqwest::Client::builder().timeout(policy.timeout).build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl BackupLogger for HttpBackupLogger {
    async fn log(&self, event: &BackupEvent) -> anyhow::Result<()> {
        let resp = self.client.post(&self.url).json(event).send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("backup endpoint returned HTTP {}", resp.status());
        }
        Ok(())
    }
}

/// Rider and ride context captured when the button is armed.
#[derive(Debug, Clone)]
pub struct SosContext {
    pub reporter_id: Uuid,
    pub city: String,
    pub transit_line: String,
    pub location_name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum EmergencyError {
    #[error("could not record the emergency report: {0}")]
    Write(#[source] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SosState {
    Idle,
    Holding,
    Activating,
    Done,
    Failed,
}

#[derive(Debug)]
pub enum SosOutcome {
    /// Released before the hold window elapsed; nothing was written.
    Cancelled,
    Activated(IncidentReport),
}

/// The press-and-hold SOS control.
pub struct SosButton {
    backend: Arc<dyn Backend>,
    location: Arc<dyn LocationProvider>,
    backup: Option<Arc<dyn BackupLogger>>,
    hold_window: Duration,
    state: SosState,
    pressed_at: Option<Instant>,
}

impl SosButton {
    pub fn new(
        backend: Arc<dyn Backend>,
        location: Arc<dyn LocationProvider>,
        backup: Option<Arc<dyn BackupLogger>>,
    ) -> Self {
        Self {
            backend,
            location,
            backup,
            hold_window: HOLD_WINDOW,
            state: SosState::Idle,
            pressed_at: None,
        }
    }

    /// Shrinks the hold window. Test hook.
    #[cfg(test)]
    pub(crate) fn with_hold_window(mut self, window: Duration) -> Self {
        self.hold_window = window;
        self
    }

    pub fn state(&self) -> SosState {
        self.state
    }

    /// Arms the hold timer. Pressing again while holding restarts it.
    pub fn press(&mut self) {
        self.state = SosState::Holding;
        self.pressed_at = Some(Instant::now());
    }

    /// Handles the button release. Before the window: cancel, no side
    /// effects. At or past it: activate.
    pub async fn release(&mut self, ctx: &SosContext) -> Result<SosOutcome, EmergencyError> {
        let Some(pressed_at) = self.pressed_at.take() else {
            return Ok(SosOutcome::Cancelled);
        };
        if pressed_at.elapsed() < self.hold_window {
            info!("SOS released early, cancelled");
            self.state = SosState::Idle;
            return Ok(SosOutcome::Cancelled);
        }
        self.activate(ctx).await.map(SosOutcome::Activated)
    }

    /// Waits out the remainder of the hold window while the button stays
    /// down, then activates.
    pub async fn hold_through(&mut self, ctx: &SosContext) -> Result<IncidentReport, EmergencyError> {
        if let Some(pressed_at) = self.pressed_at.take() {
            tokio::time::sleep_until(pressed_at + self.hold_window).await;
        }
        self.activate(ctx).await
    }

    async fn activate(&mut self, ctx: &SosContext) -> Result<IncidentReport, EmergencyError> {
        self.state = SosState::Activating;

        // Best effort only. A slow or denied device must not delay the
        // incident write past the location timeout.
        let fix = match tokio::time::timeout(LOCATION_TIMEOUT, self.location.current()).await {
            Ok(Ok(fix)) => Some(fix),
            Ok(Err(err)) => {
                warn!(error = %err, "SOS proceeding without location");
                None
            }
            Err(_) => {
                warn!("Location fix timed out, SOS proceeding without it");
                None
            }
        };

        let report = self
            .backend
            .create_incident(NewIncident {
                reporter_id: ctx.reporter_id,
                city: ctx.city.clone(),
                incident_type: EMERGENCY_INCIDENT_TYPE.to_string(),
                transit_line: ctx.transit_line.clone(),
                location_name: ctx.location_name.clone(),
                description: "Emergency SOS activated".to_string(),
                latitude: fix.map(|f| f.latitude),
                longitude: fix.map(|f| f.longitude),
                accuracy: fix.and_then(|f| f.accuracy),
                image_url: None,
            })
            .await
            .map_err(|err| {
                self.state = SosState::Failed;
                EmergencyError::Write(err)
            })?;

        info!(incident_id = %report.id, "Emergency incident recorded");

        if let Some(backup) = &self.backup {
            let event = BackupEvent {
                reporter_id: ctx.reporter_id,
                city: ctx.city.clone(),
                transit_line: ctx.transit_line.clone(),
                occurred_at: Utc::now(),
                latitude: fix.map(|f| f.latitude),
                longitude: fix.map(|f| f.longitude),
            };
            if let Err(err) = backup.log(&event).await {
                // Swallowed on purpose; the primary write already landed.
                warn!(error = %err, "Backup logging failed");
            }
        }

        self.state = SosState::Done;
        Ok(report)
    }
}
