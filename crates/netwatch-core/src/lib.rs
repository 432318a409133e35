//! netwatch-core: Shared types for the Netwatch discovery engine.
//!
//! This crate provides the records exchanged between the discovery engine
//! and the presentation collaborators that poll it:
//! - Device records and the login classification attached to them
//! - Credential memo records
//! - Device-family classification driving vendor-specific behaviour
//! - Event types published while scan cycles run

pub mod events;
pub mod types;

pub use types::{
    Credential, CredentialRecord, Device, DeviceKind, DeviceSkeleton, SnmpData, SshStatus,
};
