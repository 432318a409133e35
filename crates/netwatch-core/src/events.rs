//! Event types published while the discovery engine runs.
//!
//! Presentation collaborators (REST API, terminal dashboard) subscribe to
//! these instead of diffing device snapshots themselves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::SshStatus;

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

/// An event emitted by the discovery engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryEvent {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl DiscoveryEvent {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: EventId::new(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// The event payload, tagged by type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event_type")]
pub enum EventPayload {
    // ── Cycle lifecycle ───────────────────────────────────────
    CycleStarted {
        cycle_id: Uuid,
        cidr: String,
    },
    CycleCompleted {
        cycle_id: Uuid,
        devices: u32,
        added: u32,
        dropped: u32,
        duration_ms: u64,
    },

    // ── Cache membership ──────────────────────────────────────
    /// A host entered the cache.
    HostDiscovered { ip: String, mac: String, vendor: String },
    /// A host was missing from the latest cycle and left the cache.
    HostVanished { ip: String },

    // ── Credential bootstrap ──────────────────────────────────
    LoginSucceeded { ip: String, status: SshStatus },
    LoginFailed { ip: String, status: SshStatus },
    /// Post-login telemetry harvest finished (possibly partially).
    TelemetryCollected {
        ip: String,
        snmp_ok: u32,
        snmp_total: u32,
        export_bytes: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_payload_tags() {
        let payload = EventPayload::LoginSucceeded {
            ip: "192.168.1.10".to_string(),
            status: SshStatus::AutoLoginOk,
        };

        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"event_type\":\"LoginSucceeded\""));
        assert!(json.contains("\"status\":\"auto_login_ok\""));
    }

    #[test]
    fn event_keeps_identity_through_json() {
        let event = DiscoveryEvent::new(EventPayload::HostVanished {
            ip: "192.168.1.20".to_string(),
        });

        let json = serde_json::to_string(&event).unwrap();
        let back: DiscoveryEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, event.id);
        assert_eq!(back.payload, event.payload);
    }
}
