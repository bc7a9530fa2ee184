//! In-process change notifications for backend tables.
//!
//! The managed backend pushes row-change events over realtime channels; this
//! hub is the process-local rendition. One broadcast channel exists per
//! table, a subscription is just a receiver, and dropping the receiver is
//! the channel teardown. Publishing never blocks and never fails: an event
//! with no listeners is simply dropped.

use std::collections::HashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 64;

/// Backend tables that emit change events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    IncidentReports,
    GroupRides,
    RideMembers,
    GroupMessages,
    Profiles,
}

impl Table {
    pub const ALL: [Table; 5] = [
        Table::IncidentReports,
        Table::GroupRides,
        Table::RideMembers,
        Table::GroupMessages,
        Table::Profiles,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Table::IncidentReports => "incident_reports",
            Table::GroupRides => "group_rides",
            Table::RideMembers => "group_ride_members",
            Table::GroupMessages => "group_messages",
            Table::Profiles => "profiles",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// One row changed in one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent {
    pub table: Table,
    pub op: ChangeOp,
    pub row_id: Uuid,
}

/// Fan-out point for change events, one channel per table.
pub struct RealtimeHub {
    channels: HashMap<Table, broadcast::Sender<ChangeEvent>>,
}

impl RealtimeHub {
    pub fn new() -> Self {
        let channels = Table::ALL
            .into_iter()
            .map(|table| (table, broadcast::channel(CHANNEL_CAPACITY).0))
            .collect();
        Self { channels }
    }

    fn sender(&self, table: Table) -> &broadcast::Sender<ChangeEvent> {
        // `new` seeds every table.
        self.channels
            .get(&table)
            .expect("every table has a channel")
    }

    /// Opens a subscription for one table. Dropping the receiver tears the
    /// subscription down.
    pub fn subscribe(&self, table: Table) -> broadcast::Receiver<ChangeEvent> {
        self.sender(table).subscribe()
    }

    pub fn publish(&self, event: ChangeEvent) {
        // A send error only means nobody is listening.
        let _ = self.sender(event.table).send(event);
    }

    /// Number of live subscriptions on a table. Used by tests and the
    /// health surface.
    pub fn listeners(&self, table: Table) -> usize {
        self.sender(table).receiver_count()
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}
