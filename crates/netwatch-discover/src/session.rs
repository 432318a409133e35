//! Remote management sessions.
//!
//! [`SessionConnector`] opens an authenticated session to a device and
//! classifies failures into [`LoginError::Auth`] (try the next credential)
//! and [`LoginError::Connection`] (give up on the host). The production
//! implementation drives the blocking `ssh2` crate from
//! `tokio::task::spawn_blocking`.

use std::future::Future;
use std::io::{ErrorKind, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use netwatch_core::Credential;
use thiserror::Error;

use crate::error::{DiscoverError, Result};

/// libssh2 `LIBSSH2_ERROR_AUTHENTICATION_FAILED`.
const SSH_AUTH_FAILED: i32 = -18;

/// Why a login attempt did not produce a session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoginError {
    /// The transport came up but the credential was rejected.
    #[error("authentication rejected")]
    Auth,

    /// Unreachable, timed out, or the handshake failed.
    #[error("connection failed: {0}")]
    Connection(String),
}

/// Output gathered by one non-blocking read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamChunk {
    pub data: String,
    /// The remote command has closed its output.
    pub finished: bool,
}

/// An authenticated session to a device.
pub trait RemoteSession: Send + 'static {
    /// Run a command to completion and return its output.
    fn exec(&mut self, command: &str) -> impl Future<Output = Result<String>> + Send;

    /// Start a long-running command whose output is read with
    /// [`read_available`](Self::read_available).
    fn start(&mut self, command: &str) -> impl Future<Output = Result<()>> + Send;

    /// Drain whatever output is ready without waiting for more.
    fn read_available(&mut self) -> impl Future<Output = Result<StreamChunk>> + Send;

    fn close(self) -> impl Future<Output = ()> + Send;
}

/// Opens sessions with a username/password pair.
pub trait SessionConnector: Send + Sync + 'static {
    type Session: RemoteSession;

    fn connect(
        &self,
        ip: &str,
        port: u16,
        credential: &Credential,
        timeout: Duration,
    ) -> impl Future<Output = std::result::Result<Self::Session, LoginError>> + Send;
}

// ── ssh2 implementation ───────────────────────────────────────────

/// Password-authenticated SSH via libssh2.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ssh2Connector;

struct Ssh2Inner {
    session: ssh2::Session,
    stream: Option<ssh2::Channel>,
}

pub struct Ssh2Session {
    inner: Arc<Mutex<Ssh2Inner>>,
}

impl SessionConnector for Ssh2Connector {
    type Session = Ssh2Session;

    async fn connect(
        &self,
        ip: &str,
        port: u16,
        credential: &Credential,
        timeout: Duration,
    ) -> std::result::Result<Ssh2Session, LoginError> {
        let ip = ip.to_string();
        let credential = credential.clone();

        let session = tokio::task::spawn_blocking(move || open_session(&ip, port, &credential, timeout))
            .await
            .map_err(|e| LoginError::Connection(e.to_string()))??;

        Ok(Ssh2Session {
            inner: Arc::new(Mutex::new(Ssh2Inner {
                session,
                stream: None,
            })),
        })
    }
}

fn open_session(
    ip: &str,
    port: u16,
    credential: &Credential,
    timeout: Duration,
) -> std::result::Result<ssh2::Session, LoginError> {
    let connection = |e: &dyn std::fmt::Display| LoginError::Connection(e.to_string());

    let addr = (ip, port)
        .to_socket_addrs()
        .map_err(|e| connection(&e))?
        .next()
        .ok_or_else(|| LoginError::Connection(format!("no address for {ip}:{port}")))?;

    let tcp = TcpStream::connect_timeout(&addr, timeout).map_err(|e| connection(&e))?;
    let _ = tcp.set_read_timeout(Some(timeout));
    let _ = tcp.set_write_timeout(Some(timeout));

    let mut session = ssh2::Session::new().map_err(|e| connection(&e))?;
    session.set_timeout(u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX));
    session.set_tcp_stream(tcp);
    session.handshake().map_err(|e| connection(&e))?;

    session
        .userauth_password(&credential.username, &credential.password)
        .map_err(|e| match e.code() {
            ssh2::ErrorCode::Session(SSH_AUTH_FAILED) => LoginError::Auth,
            _ => connection(&e),
        })?;

    if !session.authenticated() {
        return Err(LoginError::Auth);
    }
    Ok(session)
}

impl Ssh2Session {
    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Ssh2Inner) -> Result<T> + Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = inner
                .lock()
                .map_err(|_| DiscoverError::Session("session lock poisoned".to_string()))?;
            op(&mut *guard)
        })
        .await
        .map_err(|e| DiscoverError::Session(e.to_string()))?
    }
}

fn session_err(e: impl std::fmt::Display) -> DiscoverError {
    DiscoverError::Session(e.to_string())
}

impl RemoteSession for Ssh2Session {
    async fn exec(&mut self, command: &str) -> Result<String> {
        let command = command.to_string();
        self.blocking(move |inner| {
            inner.session.set_blocking(true);
            let mut channel = inner.session.channel_session().map_err(session_err)?;
            channel.exec(&command).map_err(session_err)?;

            let mut output = String::new();
            channel.read_to_string(&mut output).map_err(session_err)?;
            channel.wait_close().ok();
            Ok(output.trim().to_string())
        })
        .await
    }

    async fn start(&mut self, command: &str) -> Result<()> {
        let command = command.to_string();
        self.blocking(move |inner| {
            inner.session.set_blocking(true);
            let mut channel = inner.session.channel_session().map_err(session_err)?;
            channel.exec(&command).map_err(session_err)?;
            inner.session.set_blocking(false);
            inner.stream = Some(channel);
            Ok(())
        })
        .await
    }

    async fn read_available(&mut self) -> Result<StreamChunk> {
        self.blocking(|inner| {
            let Some(channel) = inner.stream.as_mut() else {
                return Ok(StreamChunk {
                    data: String::new(),
                    finished: true,
                });
            };

            let mut collected = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                match channel.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => collected.extend_from_slice(&buf[..n]),
                    Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                    Err(e) => return Err(session_err(e)),
                }
            }

            Ok(StreamChunk {
                data: String::from_utf8_lossy(&collected).into_owned(),
                finished: channel.eof(),
            })
        })
        .await
    }

    async fn close(self) {
        let result = self
            .blocking(|inner| {
                inner.session.set_blocking(true);
                if let Some(mut channel) = inner.stream.take() {
                    channel.close().ok();
                }
                inner
                    .session
                    .disconnect(None, "bye", None)
                    .map_err(session_err)
            })
            .await;
        if let Err(e) = result {
            tracing::debug!(error = %e, "Session close failed");
        }
    }
}
