//! Per-operation session factory.
//!
//! `SessionFactory::open` walks connect → authenticate → attach share and
//! hands back an `SmbSession` owning all three handles. Every caller must
//! finish with `SmbSession::close`; a session is never reused.

use crate::smb::error::{SmbError, SmbResult};
use crate::smb::path;
use crate::smb::protocol::*;
use crate::smb::types::SmbConnectionProfile;
use log::{info, warn};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Build the identity for a profile: guest when both username and
/// password are empty, named credentials otherwise.
pub fn credentials_for(profile: &SmbConnectionProfile) -> Credentials {
    if profile.is_anonymous() {
        Credentials::Anonymous
    } else {
        Credentials::Named {
            username: profile.username.clone(),
            password: profile.password.clone(),
            domain: profile.domain.clone(),
        }
    }
}

#[derive(Clone)]
pub struct SessionFactory {
    transport: Arc<dyn ShareTransport>,
}

impl SessionFactory {
    pub fn new(transport: Arc<dyn ShareTransport>) -> Self {
        Self { transport }
    }

    pub async fn open(&self, profile: &SmbConnectionProfile) -> SmbResult<SmbSession> {
        let server = profile.server.trim();
        if server.is_empty() {
            return Err(SmbError::invalid_input("server address must not be empty"));
        }
        let share = path::normalize_share_name(&profile.share);
        if share.is_empty() {
            return Err(SmbError::invalid_input("share name must not be empty"));
        }

        let mut connection = self.transport.connect(server).await.map_err(|e| match e {
            SmbError::Connection { .. } => e,
            other => SmbError::connection(format!("{}: {}", server, other)),
        })?;

        let credentials = credentials_for(profile);
        let mut auth = match connection.authenticate(&credentials).await {
            Ok(auth) => auth,
            Err(e) => {
                let _ = connection.close().await;
                return Err(match e {
                    SmbError::Authentication { .. } => e,
                    other => SmbError::authentication(format!(
                        "{} as {}: {}",
                        server,
                        credentials.display_user(),
                        other
                    )),
                });
            }
        };

        let handle = match auth.attach_share(&share).await {
            Ok(handle) => handle,
            Err(e) => {
                let _ = auth.close().await;
                let _ = connection.close().await;
                return Err(match e {
                    SmbError::ShareUnavailable { .. } => e,
                    other => SmbError::share_unavailable(&share, other.to_string()),
                });
            }
        };

        let session = SmbSession {
            id: Uuid::new_v4().to_string(),
            share,
            user: credentials.display_user(),
            opened_at: Instant::now(),
            handle,
            auth,
            connection,
            closed: false,
        };
        info!(
            "SMB session {} opened: //{}/{} as {}",
            session.id, server, session.share, session.user
        );
        Ok(session)
    }
}

/// Exclusive ownership of one connection, its authenticated session and
/// the attached share.
pub struct SmbSession {
    pub id: String,
    pub share: String,
    pub user: String,
    opened_at: Instant,
    handle: Box<dyn ShareHandle>,
    auth: Box<dyn AuthenticatedSession>,
    connection: Box<dyn ShareConnection>,
    closed: bool,
}

impl SmbSession {
    pub fn share(&mut self) -> &mut dyn ShareHandle {
        self.handle.as_mut()
    }

    /// Close share, session and connection, innermost first. Close
    /// failures are logged; the first one is returned.
    pub async fn close(mut self) -> SmbResult<()> {
        let mut first_err: Option<SmbError> = None;
        if let Err(e) = self.handle.close().await {
            first_err.get_or_insert(e);
        }
        if let Err(e) = self.auth.close().await {
            first_err.get_or_insert(e);
        }
        if let Err(e) = self.connection.close().await {
            first_err.get_or_insert(e);
        }
        self.closed = true;
        info!(
            "SMB session {} closed after {} ms",
            self.id,
            self.opened_at.elapsed().as_millis()
        );
        match first_err {
            Some(e) => {
                warn!("SMB session {}: error while closing: {}", self.id, e);
                Err(e)
            }
            None => Ok(()),
        }
    }
}

/// Reached when the owning operation future is dropped. The handles drop
/// right after this, innermost first, and each backend releases its side.
impl Drop for SmbSession {
    fn drop(&mut self) {
        if !self.closed {
            warn!(
                "SMB session {} dropped without close after {} ms; releasing through the backend",
                self.id,
                self.opened_at.elapsed().as_millis()
            );
        }
    }
}
