//! Session store
//!
//! Holds at most one live credential and keeps it fresh.
//!
//! # Status
//!
//! ```text
//! Unauthenticated --sign in / persist--> Authenticated
//! Authenticated --within margin--> Refreshing --ok--> Authenticated
//! Authenticated | Refreshing --refresh rejected / sign out / clear--> Unauthenticated
//! ```
//!
//! # Refresh collapse
//!
//! Concurrent callers that find the credential inside the refresh margin
//! share one in-flight refresh task and all observe its single outcome.
//!
//! # Sign-out during refresh
//!
//! Every `persist` and `clear` starts a new session epoch. A refresh whose
//! epoch is no longer current when it completes is discarded: it never
//! reinstates a signed-out session. Its waiters receive whatever credential
//! is current at that point, or `AuthError::Unauthenticated` if none.

use crate::provider::AuthProvider;
use crate::storage::CredentialStorage;
use basekit_core::{AuthError, Clock, Credential, Error, Result};
use basekit_observability::Metrics;
use chrono::Duration;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Unauthenticated,
    Authenticated,
    Refreshing,
}

type SharedRefresh = Shared<BoxFuture<'static, Result<Credential>>>;

struct Inner {
    provider: Arc<dyn AuthProvider>,
    storage: Arc<dyn CredentialStorage>,
    clock: Arc<dyn Clock>,
    refresh_margin: Duration,
    credential: RwLock<Option<Credential>>,
    epoch: AtomicU64,
    status: watch::Sender<SessionStatus>,
    /// Serializes credential replacement with its storage write
    write_lock: tokio::sync::Mutex<()>,
    in_flight: Mutex<Option<(u64, SharedRefresh)>>,
    metrics: OnceLock<Metrics>,
}

/// Cheap to clone; all clones share one session
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl SessionStore {
    pub fn new(
        provider: Arc<dyn AuthProvider>,
        storage: Arc<dyn CredentialStorage>,
        clock: Arc<dyn Clock>,
        refresh_margin: Duration,
    ) -> Self {
        let (status, _) = watch::channel(SessionStatus::Unauthenticated);
        Self {
            inner: Arc::new(Inner {
                provider,
                storage,
                clock,
                refresh_margin,
                credential: RwLock::new(None),
                epoch: AtomicU64::new(0),
                status,
                write_lock: tokio::sync::Mutex::new(()),
                in_flight: Mutex::new(None),
                metrics: OnceLock::new(),
            }),
        }
    }

    pub fn with_metrics(self, metrics: Metrics) -> Self {
        let _ = self.inner.metrics.set(metrics);
        self
    }

    /// The current credential, if signed in. Never triggers a refresh.
    pub fn credential(&self) -> Option<Credential> {
        self.inner
            .credential
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn status(&self) -> SessionStatus {
        *self.inner.status.borrow()
    }

    /// Watch status transitions
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.inner.status.subscribe()
    }

    pub fn refresh_margin(&self) -> Duration {
        self.inner.refresh_margin
    }

    /// Load the credential persisted by an earlier run
    ///
    /// An expired credential is restored as-is; the next
    /// `refresh_if_needed` renews or clears it.
    pub async fn restore(&self) -> Result<Option<Credential>> {
        let _guard = self.inner.write_lock.lock().await;
        let restored = self.inner.storage.load().await?;
        if let Some(credential) = &restored {
            debug!(expires_at = %credential.expires_at, "Restored persisted session");
            self.install(credential.clone(), true);
        }
        Ok(restored)
    }

    /// Replace the credential and write it to storage
    ///
    /// Storage is written first; on failure the in-memory session is left
    /// unchanged.
    pub async fn persist(&self, credential: Credential) -> Result<()> {
        let _guard = self.inner.write_lock.lock().await;
        self.inner.storage.save(&credential).await?;
        self.install(credential, true);
        Ok(())
    }

    /// Drop the credential locally and from storage
    ///
    /// The in-memory session is always cleared; a storage failure is
    /// returned afterwards.
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.inner.write_lock.lock().await;
        self.clear_locked().await
    }

    /// Return a credential that is valid for at least the refresh margin,
    /// refreshing first when needed
    ///
    /// # Errors
    /// - `AuthError::Unauthenticated` when nobody is signed in
    /// - `AuthError::SessionExpired` when the refresh token was refused
    ///   (the session is cleared)
    /// - transport or 5xx errors from the refresh endpoint, with the
    ///   credential kept
    pub async fn refresh_if_needed(&self) -> Result<Credential> {
        let current = self.credential().ok_or(AuthError::Unauthenticated)?;
        if !current.expires_within(self.inner.clock.now(), self.inner.refresh_margin) {
            return Ok(current);
        }
        self.join_refresh().await
    }

    /// Refresh after the service rejected `rejected_access_token`
    ///
    /// When the credential has already been replaced since that token was
    /// handed out, the replacement is returned without another attempt.
    pub async fn force_refresh(&self, rejected_access_token: &str) -> Result<Credential> {
        let current = self.credential().ok_or(AuthError::Unauthenticated)?;
        if current.access_token != rejected_access_token {
            debug!("Credential already replaced, skipping refresh");
            return Ok(current);
        }
        self.join_refresh().await
    }

    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Credential> {
        let credential = self.inner.provider.sign_in(email, password).await?;
        self.persist(credential.clone()).await?;
        info!("Session started");
        Ok(credential)
    }

    /// Register and, when the service issues a session right away, sign in
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Credential>> {
        let credential = self.inner.provider.sign_up(email, password).await?;
        if let Some(credential) = &credential {
            self.persist(credential.clone()).await?;
            info!("Session started after sign-up");
        }
        Ok(credential)
    }

    /// End the session
    ///
    /// Remote revocation is best-effort; the local session is cleared
    /// regardless of its outcome.
    pub async fn sign_out(&self) -> Result<()> {
        if let Some(credential) = self.credential() {
            if let Err(e) = self.inner.provider.sign_out(&credential.access_token).await {
                warn!(error = %e, "Remote sign-out failed, clearing local session anyway");
            }
        }
        self.clear().await?;
        info!("Session ended");
        Ok(())
    }

    /// Refresh in the background so foreground calls rarely wait
    ///
    /// The task stops when the returned handle is stopped or dropped.
    pub fn spawn_auto_refresh(&self, interval: std::time::Duration) -> AutoRefreshHandle {
        let store = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if store.credential().is_none() {
                    continue;
                }
                if let Err(e) = store.refresh_if_needed().await {
                    warn!(error = %e, "Background refresh failed");
                }
            }
        });
        AutoRefreshHandle { handle }
    }

    async fn join_refresh(&self) -> Result<Credential> {
        let refresh = {
            let mut slot = self.inner.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            let epoch = self.inner.epoch.load(Ordering::SeqCst);
            match slot.as_ref() {
                Some((slot_epoch, refresh)) if *slot_epoch == epoch => refresh.clone(),
                _ => {
                    let refresh = self.spawn_refresh(epoch);
                    *slot = Some((epoch, refresh.clone()));
                    refresh
                }
            }
        };
        refresh.await
    }

    // The refresh runs on its own task so an abandoned caller cannot stall
    // the callers joined to it.
    fn spawn_refresh(&self, epoch: u64) -> SharedRefresh {
        let store = self.clone();
        let task = tokio::spawn(async move {
            let result = store.run_refresh(epoch).await;
            let mut slot = store.inner.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            if matches!(slot.as_ref(), Some((slot_epoch, _)) if *slot_epoch == epoch) {
                *slot = None;
            }
            result
        });

        async move {
            task.await
                .unwrap_or_else(|e| Err(Error::InvalidResponse(format!("Refresh task failed: {}", e))))
        }
        .boxed()
        .shared()
    }

    #[instrument(skip(self))]
    async fn run_refresh(&self, epoch: u64) -> Result<Credential> {
        // A session persisted or cleared before this task started needs no refresh
        if self.inner.epoch.load(Ordering::SeqCst) != epoch {
            debug!("Session changed before refreshing, skipping");
            return self.discard_refresh();
        }
        let current = self.credential().ok_or(AuthError::Unauthenticated)?;
        self.set_status(SessionStatus::Refreshing);

        let outcome = self.inner.provider.refresh(&current.refresh_token).await;

        let _guard = self.inner.write_lock.lock().await;
        if self.inner.epoch.load(Ordering::SeqCst) != epoch {
            debug!("Session changed while refreshing, discarding result");
            return self.discard_refresh();
        }

        match outcome {
            Ok(fresh) => {
                self.install(fresh.clone(), false);
                if let Err(e) = self.inner.storage.save(&fresh).await {
                    warn!(error = %e, "Refreshed credential could not be persisted");
                }
                self.record_refresh("ok");
                debug!(expires_at = %fresh.expires_at, "Credential refreshed");
                Ok(fresh)
            }
            Err(e) if refresh_token_refused(&e) => {
                warn!(error = %e, "Refresh token refused, session expired");
                if let Err(e) = self.clear_locked().await {
                    warn!(error = %e, "Failed to clear persisted credential");
                }
                self.record_refresh("session_expired");
                Err(AuthError::SessionExpired.into())
            }
            Err(e) => {
                warn!(error = %e, "Refresh failed, keeping current credential");
                self.set_status(SessionStatus::Authenticated);
                self.record_refresh("failed");
                Err(e)
            }
        }
    }

    /// Hand waiters of a stale refresh whatever session is current now
    fn discard_refresh(&self) -> Result<Credential> {
        self.record_refresh("discarded");
        match self.credential() {
            Some(credential) => {
                self.set_status(SessionStatus::Authenticated);
                Ok(credential)
            }
            None => {
                self.set_status(SessionStatus::Unauthenticated);
                Err(AuthError::Unauthenticated.into())
            }
        }
    }

    /// Caller holds `write_lock`
    fn install(&self, credential: Credential, new_session: bool) {
        *self
            .inner
            .credential
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(credential);
        if new_session {
            self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        }
        self.set_status(SessionStatus::Authenticated);
    }

    /// Caller holds `write_lock`
    async fn clear_locked(&self) -> Result<()> {
        *self
            .inner
            .credential
            .write()
            .unwrap_or_else(|e| e.into_inner()) = None;
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        self.set_status(SessionStatus::Unauthenticated);
        self.inner.storage.clear().await
    }

    fn set_status(&self, status: SessionStatus) {
        self.inner.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }

    fn record_refresh(&self, outcome: &str) {
        if let Some(metrics) = self.inner.metrics.get() {
            metrics.record_refresh(outcome);
        }
    }
}

/// A refused refresh token cannot be retried into a session
fn refresh_token_refused(error: &Error) -> bool {
    match error {
        Error::Auth(_) => true,
        Error::Remote { status_code, .. } => {
            (400..500).contains(status_code) && !matches!(*status_code, 408 | 429)
        }
        _ => false,
    }
}

/// Stops the background refresh task when stopped or dropped
pub struct AutoRefreshHandle {
    handle: JoinHandle<()>,
}

impl AutoRefreshHandle {
    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for AutoRefreshHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
