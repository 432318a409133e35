//! Credential bootstrap and the post-login telemetry harvest.
//!
//! Devices exposing SSH (22) or telnet (23) that carry no classification yet
//! are tried one at a time against an ordered list of default credentials.
//! Attempts are strictly sequential to stay clear of device lockout
//! policies. A rejected credential moves on to the next one; a transport
//! failure abandons the device.
//!
//! After any successful login, automatic or operator-driven, the same
//! harvest runs over the open session: enable SNMP where we know how, stream
//! the configuration export, collect SNMP, then persist and update the cache.
//! Harvest failures are logged and never undo the login classification.

use std::time::Duration;

use netwatch_core::events::EventPayload;
use netwatch_core::{Credential, CredentialRecord, Device, SnmpData, SshStatus};
use tokio::time::{sleep, timeout_at, Instant};

use crate::cache::DeviceCache;
use crate::config::DiscoverConfig;
use crate::error::{DiscoverError, Result};
use crate::events::EventBus;
use crate::persist::SnapshotWriter;
use crate::session::{LoginError, RemoteSession, SessionConnector};
use crate::snmp::{answered_count, SnmpClient, SnmpCollector};

// ── Login state machine ───────────────────────────────────────────

/// Result of one credential attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Accepted,
    Rejected,
    Unreachable,
}

impl From<&LoginError> for AttemptOutcome {
    fn from(e: &LoginError) -> Self {
        match e {
            LoginError::Auth => Self::Rejected,
            LoginError::Connection(_) => Self::Unreachable,
        }
    }
}

/// Per-device progress through the credential list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    NotAttempted,
    /// About to try the credential at this index.
    Trying(usize),
    /// The credential at this index was accepted.
    LoggedIn(usize),
    AuthExhausted,
    ConnectionFailed,
}

impl LoginState {
    /// First state for a credential list of length `total`.
    pub fn start(total: usize) -> Self {
        if total == 0 {
            Self::AuthExhausted
        } else {
            Self::Trying(0)
        }
    }

    pub fn advance(self, outcome: AttemptOutcome, total: usize) -> Self {
        match (self, outcome) {
            (Self::NotAttempted, _) => Self::start(total),
            (Self::Trying(i), AttemptOutcome::Accepted) => Self::LoggedIn(i),
            (Self::Trying(i), AttemptOutcome::Rejected) if i + 1 < total => Self::Trying(i + 1),
            (Self::Trying(_), AttemptOutcome::Rejected) => Self::AuthExhausted,
            (Self::Trying(_), AttemptOutcome::Unreachable) => Self::ConnectionFailed,
            (terminal, _) => terminal,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::LoggedIn(_) | Self::AuthExhausted | Self::ConnectionFailed
        )
    }

    /// Classification recorded for a terminal state.
    pub fn status(&self) -> Option<SshStatus> {
        match self {
            Self::LoggedIn(_) => Some(SshStatus::AutoLoginOk),
            Self::AuthExhausted => Some(SshStatus::AuthFailed),
            Self::ConnectionFailed => Some(SshStatus::ConnectionFailed),
            Self::NotAttempted | Self::Trying(_) => None,
        }
    }
}

// ── Bootstrapper ──────────────────────────────────────────────────

/// Telemetry pulled over an authenticated session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Harvest {
    pub snmp: SnmpData,
    pub export: String,
}

#[derive(Debug, Clone)]
struct Timing {
    login: Duration,
    manual_login: Duration,
    snmp_settle: Duration,
    export: Duration,
    export_poll: Duration,
}

pub struct CredentialBootstrapper<C, N> {
    connector: C,
    snmp: SnmpCollector<N>,
    credentials: Vec<Credential>,
    timing: Timing,
    cache: DeviceCache,
    writer: SnapshotWriter,
    events: EventBus,
}

impl<C, N> CredentialBootstrapper<C, N>
where
    C: SessionConnector,
    N: SnmpClient,
{
    pub fn new(
        connector: C,
        snmp_client: N,
        config: &DiscoverConfig,
        cache: DeviceCache,
        writer: SnapshotWriter,
        events: EventBus,
    ) -> Self {
        Self {
            connector,
            snmp: SnmpCollector::new(snmp_client, &config.snmp_community, config.snmp_timeout()),
            credentials: config.default_credentials.clone(),
            timing: Timing {
                login: Duration::from_secs(config.login_timeout_secs),
                manual_login: Duration::from_secs(config.manual_login_timeout_secs),
                snmp_settle: Duration::from_secs(config.snmp_settle_secs),
                export: Duration::from_secs(config.export_timeout_secs),
                export_poll: Duration::from_millis(config.export_poll_millis.max(1)),
            },
            cache,
            writer,
            events,
        }
    }

    /// Try default credentials on every eligible device, in order.
    ///
    /// Classification and harvested telemetry are written onto `devices`
    /// as well as the credential memo, so the cycle's merge sees them even
    /// for hosts not cached yet. A device that gains a classification while
    /// the cycle is running (an operator login) is left alone.
    pub async fn attempt_logins(&self, devices: &mut [Device]) {
        let classified = self.cache.classified_ips().await;
        let eligible: Vec<usize> = devices
            .iter()
            .enumerate()
            .filter(|(_, d)| d.has_login_port() && !classified.contains(&d.ip))
            .map(|(i, _)| i)
            .collect();

        if eligible.is_empty() {
            tracing::debug!("No unclassified devices with login ports");
            return;
        }
        tracing::info!(devices = eligible.len(), "Attempting default-credential logins");

        for index in eligible {
            self.bootstrap_device(&mut devices[index]).await;
        }
    }

    async fn bootstrap_device(&self, device: &mut Device) {
        let Some(port) = device.login_port() else {
            return;
        };
        let total = self.credentials.len();
        let mut state = LoginState::start(total);

        while let LoginState::Trying(i) = state {
            if self.cache.has_credential(&device.ip).await {
                tracing::info!(ip = %device.ip, "Classified while the cycle was running, skipping");
                return;
            }
            let credential = &self.credentials[i];
            tracing::debug!(ip = %device.ip, port, credential = %credential.redacted(), "Trying credential");

            match self
                .connector
                .connect(&device.ip, port, credential, self.timing.login)
                .await
            {
                Ok(mut session) => {
                    state = state.advance(AttemptOutcome::Accepted, total);
                    let status = SshStatus::AutoLoginOk;
                    let stored = self
                        .cache
                        .store_credential_if_unclassified(&device.ip, CredentialRecord::new(credential, status))
                        .await;
                    if !stored {
                        tracing::info!(ip = %device.ip, "Classified while logging in, discarding session");
                        session.close().await;
                        return;
                    }
                    tracing::info!(ip = %device.ip, port, credential = %credential.redacted(), "Default-credential login succeeded");

                    device.ssh_status = status;
                    self.events.publish(EventPayload::LoginSucceeded {
                        ip: device.ip.clone(),
                        status,
                    });

                    let harvest = self.harvest(&mut session, device).await;
                    session.close().await;
                    self.apply_harvest(device, harvest).await;
                }
                Err(e) => {
                    tracing::debug!(ip = %device.ip, error = %e, "Login attempt failed");
                    state = state.advance(AttemptOutcome::from(&e), total);
                }
            }
        }

        if let Some(status) = state.status().filter(SshStatus::is_failure) {
            let stored = self
                .cache
                .store_credential_if_unclassified(&device.ip, CredentialRecord::failed(status))
                .await;
            if !stored {
                tracing::info!(ip = %device.ip, "Classified while the cycle was running, keeping it");
                return;
            }
            tracing::info!(ip = %device.ip, status = %status, "Default-credential login gave up");
            device.ssh_status = status;
            self.events.publish(EventPayload::LoginFailed {
                ip: device.ip.clone(),
                status,
            });
        }
    }

    /// Log in with operator-supplied credentials and run the harvest.
    ///
    /// Overwrites any earlier classification for `ip`. Login failures are
    /// recorded as a classification; only an unknown IP is an error.
    pub async fn manual_login(&self, ip: &str, credential: Credential) -> Result<SshStatus> {
        let mut device = self
            .cache
            .device(ip)
            .await
            .ok_or_else(|| DiscoverError::UnknownDevice(ip.to_string()))?;
        let port = device.login_port().unwrap_or(netwatch_core::types::SSH_PORT);

        self.cache
            .store_credential(ip, CredentialRecord::new(&credential, SshStatus::Submitted))
            .await;
        tracing::info!(ip = %ip, port, credential = %credential.redacted(), "Manual login submitted");

        let status = match self
            .connector
            .connect(ip, port, &credential, self.timing.manual_login)
            .await
        {
            Ok(mut session) => {
                let status = SshStatus::ManualLoginOk;
                device.ssh_status = status;
                self.cache
                    .store_credential(ip, CredentialRecord::new(&credential, status))
                    .await;
                self.events.publish(EventPayload::LoginSucceeded {
                    ip: ip.to_string(),
                    status,
                });

                let harvest = self.harvest(&mut session, &device).await;
                session.close().await;
                self.apply_harvest(&mut device, harvest).await;
                status
            }
            Err(e) => {
                let status = match e {
                    LoginError::Auth => SshStatus::AuthFailed,
                    LoginError::Connection(_) => SshStatus::ConnectionFailed,
                };
                tracing::warn!(ip = %ip, error = %e, "Manual login failed");
                self.cache
                    .store_credential(ip, CredentialRecord::new(&credential, status))
                    .await;
                self.cache.write_snapshot(&self.writer).await;
                self.events.publish(EventPayload::LoginFailed {
                    ip: ip.to_string(),
                    status,
                });
                status
            }
        };

        Ok(status)
    }

    /// The post-login sequence. Every step is best effort.
    async fn harvest(&self, session: &mut C::Session, device: &Device) -> Harvest {
        let kind = device.kind();
        tracing::debug!(ip = %device.ip, kind = ?kind, "Classified device");

        if let Some(command) = kind.snmp_enable_command() {
            match session.exec(command).await {
                Ok(_) => {
                    tracing::info!(ip = %device.ip, "SNMP agent enabled");
                    sleep(self.timing.snmp_settle).await;
                }
                Err(e) => tracing::warn!(ip = %device.ip, error = %e, "Could not enable SNMP"),
            }
        }

        let export = match kind.export_command() {
            Some(command) => match self.stream_export(session, command).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(ip = %device.ip, error = %e, "Configuration export failed");
                    String::new()
                }
            },
            None => String::new(),
        };

        let snmp = self.snmp.collect(&device.ip).await;
        Harvest { snmp, export }
    }

    /// Stream `command` output until it finishes or the export timeout passes.
    async fn stream_export(&self, session: &mut C::Session, command: &str) -> Result<String> {
        session.start(command).await?;
        let deadline = Instant::now() + self.timing.export;
        let mut output = String::new();

        loop {
            let Ok(chunk) = timeout_at(deadline, session.read_available()).await else {
                tracing::warn!(command, "Export stream timed out");
                break;
            };
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    tracing::warn!(command, error = %e, bytes = output.len(), "Export stream broke, keeping partial output");
                    break;
                }
            };
            output.push_str(&chunk.data);
            if chunk.finished {
                break;
            }
            if Instant::now() + self.timing.export_poll > deadline {
                tracing::warn!(command, bytes = output.len(), "Export stream timed out");
                break;
            }
            sleep(self.timing.export_poll).await;
        }

        Ok(output.trim().to_string())
    }

    /// Persist a harvest and attach it to the device and the cache.
    async fn apply_harvest(&self, device: &mut Device, harvest: Harvest) {
        let Harvest { snmp, export } = harvest;
        let ip = device.ip.clone();

        if let Err(e) = self.writer.write_export(&ip, &export) {
            tracing::warn!(ip = %ip, error = %e, "Failed to write export");
        }
        if let Err(e) = self.writer.write_device_snapshot(&ip, &snmp, &export) {
            tracing::warn!(ip = %ip, error = %e, "Failed to write SNMP snapshot");
        }

        let snmp_ok = answered_count(&snmp) as u32;
        let snmp_total = snmp.len() as u32;
        let export_bytes = export.len() as u64;

        if !snmp.is_empty() {
            device.set_snmp(snmp.clone());
        }
        if !export.is_empty() {
            device.export = export.clone();
        }
        if self.cache.record_telemetry(&ip, snmp, export).await.is_some() {
            self.cache.write_snapshot(&self.writer).await;
        }

        tracing::info!(ip = %ip, snmp_ok, snmp_total, export_bytes, "Telemetry harvested");
        self.events.publish(EventPayload::TelemetryCollected {
            ip,
            snmp_ok,
            snmp_total,
            export_bytes,
        });
    }
}
