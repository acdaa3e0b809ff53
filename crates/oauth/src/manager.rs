//! Token lifecycle: cached access token, single-flight refresh, proactive renewal.
//!
//! The manager owns the session's one [`Credential`]. Callers ask for a token
//! with [`TokenManager::get_valid_token`]; a token that is expired or inside the
//! refresh margin is renewed first. Concurrent renewals collapse into one
//! upstream exchange whose result every waiter receives, so a rotating refresh
//! token is never spent twice.
//!
//! After every successful exchange a one-shot timer is armed to renew
//! `refresh_margin` before expiry. The timer goes through the same
//! single-flight path as callers do. When it fails nothing is retried until
//! the next `get_valid_token`.

use std::{
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    futures::future::{BoxFuture, FutureExt, Shared},
    secrecy::ExposeSecret,
    tokio::{
        sync::RwLock,
        task::AbortHandle,
        time::{Instant, sleep_until},
    },
    tracing::{debug, info, warn},
};

use crate::{
    error::TokenError,
    flow::TokenExchange,
    types::{AccessToken, Credential, TokenResponse},
};

/// Renew this long before the access token expires.
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(300);

type RefreshResult = Result<Credential, TokenError>;
type PendingRefresh = Shared<BoxFuture<'static, RefreshResult>>;

/// The stored credential plus a counter bumped on every replacement, so a
/// refresh that raced with `init`/`dispose` can tell its input went stale.
#[derive(Default)]
struct Slot {
    epoch: u64,
    credential: Option<Credential>,
}

struct ScheduledRefresh {
    generation: u64,
    fires_at: Instant,
    handle: AbortHandle,
}

struct Inner {
    exchange: Arc<dyn TokenExchange>,
    refresh_margin: Duration,
    slot: RwLock<Slot>,
    in_flight: Mutex<Option<PendingRefresh>>,
    timer: Mutex<Option<ScheduledRefresh>>,
    timer_generation: AtomicU64,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let timer = self.timer.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(scheduled) = timer.take() {
            scheduled.handle.abort();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Frees the single-flight slot when the refresh task ends, even by panic
/// or abort.
struct InFlightRelease(Arc<Inner>);

impl Drop for InFlightRelease {
    fn drop(&mut self) {
        lock(&self.0.in_flight).take();
    }
}

/// Process-wide owner of the session credential.
///
/// Cheap to clone; clones share the same credential, timer and in-flight refresh.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

impl TokenManager {
    pub fn new(exchange: Arc<dyn TokenExchange>) -> Self {
        Self::with_margin(exchange, DEFAULT_REFRESH_MARGIN)
    }

    pub fn with_margin(exchange: Arc<dyn TokenExchange>, refresh_margin: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                exchange,
                refresh_margin,
                slot: RwLock::new(Slot::default()),
                in_flight: Mutex::new(None),
                timer: Mutex::new(None),
                timer_generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn refresh_margin(&self) -> Duration {
        self.inner.refresh_margin
    }

    /// Start a session from the authorization-code exchange result.
    pub async fn init(&self, response: TokenResponse) -> Credential {
        let credential = Credential::from_response(response, None, Instant::now());
        self.install(credential.clone()).await;
        credential
    }

    /// Replace the stored credential and arm the timer for its remaining lifetime.
    pub async fn install(&self, credential: Credential) {
        let expires_in = credential.expires_in();
        {
            // Timer and credential change together under the slot lock.
            let mut slot = self.inner.slot.write().await;
            slot.epoch += 1;
            slot.credential = Some(credential);
            self.inner.schedule(expires_in);
        }
        info!(expires_in_secs = expires_in.as_secs(), "token session started");
    }

    /// End the session: cancel the timer and forget the credential.
    pub async fn dispose(&self) {
        let mut slot = self.inner.slot.write().await;
        self.cancel_scheduled_refresh();
        slot.epoch += 1;
        if slot.credential.take().is_some() {
            info!("token session disposed");
        }
    }

    pub async fn is_authenticated(&self) -> bool {
        self.inner.slot.read().await.credential.is_some()
    }

    /// A token valid right now, refreshing first if it is expired or expiring.
    pub async fn get_valid_token(&self) -> Result<AccessToken, TokenError> {
        {
            let slot = self.inner.slot.read().await;
            match slot.credential.as_ref() {
                None => return Err(TokenError::AuthRequired),
                Some(credential)
                    if !credential.needs_refresh(Instant::now(), self.inner.refresh_margin) =>
                {
                    return Ok(credential.access());
                },
                Some(_) => debug!("access token expired or inside refresh margin"),
            }
        }
        self.refresh().await.map(|credential| credential.access())
    }

    /// Exchange the stored refresh token now, or join the exchange already running.
    ///
    /// On failure the stored credential is left untouched.
    pub async fn refresh(&self) -> RefreshResult {
        self.join_or_start_refresh().await
    }

    fn join_or_start_refresh(&self) -> PendingRefresh {
        let mut in_flight = lock(&self.inner.in_flight);
        if let Some(pending) = in_flight.as_ref() {
            debug!("joining in-flight token refresh");
            return pending.clone();
        }

        // The exchange runs as its own task: a caller that stops waiting must
        // not cancel it after the upstream has already rotated the refresh token.
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let _release = InFlightRelease(Arc::clone(&inner));
            inner.run_refresh().await
        });

        let pending = task
            .map(|joined| {
                joined.unwrap_or_else(|e| {
                    Err(TokenError::refresh_failed(
                        "refresh_aborted",
                        Some(e.to_string()),
                    ))
                })
            })
            .boxed()
            .shared();
        *in_flight = Some(pending.clone());
        pending
    }

    /// Arm the one-shot renewal timer for a token expiring in `expires_in`.
    ///
    /// Any armed timer is cancelled first. Returns `false` when the expiry is
    /// already inside the refresh margin; the next `get_valid_token` then
    /// refreshes synchronously.
    pub fn schedule_proactive_refresh(&self, expires_in: Duration) -> bool {
        self.inner.schedule(expires_in)
    }

    pub fn cancel_scheduled_refresh(&self) -> bool {
        match lock(&self.inner.timer).take() {
            Some(scheduled) => {
                scheduled.handle.abort();
                debug!(generation = scheduled.generation, "proactive refresh cancelled");
                true
            },
            None => false,
        }
    }

    pub fn has_scheduled_refresh(&self) -> bool {
        lock(&self.inner.timer).is_some()
    }

    /// When the armed timer fires, if one is armed.
    pub fn scheduled_refresh_at(&self) -> Option<Instant> {
        lock(&self.inner.timer).as_ref().map(|s| s.fires_at)
    }
}

impl Inner {
    async fn run_refresh(self: &Arc<Self>) -> RefreshResult {
        // Read the refresh token inside the single flight so a refresh started
        // after another completed uses the rotated value.
        let (epoch, refresh_token) = {
            let slot = self.slot.read().await;
            let refresh_token = slot
                .credential
                .as_ref()
                .and_then(|c| c.refresh_token.clone())
                .ok_or(TokenError::AuthRequired)?;
            (slot.epoch, refresh_token)
        };

        debug!("exchanging refresh token");
        let response = match self.exchange.refresh(refresh_token.expose_secret()).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "token refresh failed");
                return Err(e);
            },
        };

        if !response.has_sane_lifetime() {
            warn!(expires_in = response.expires_in, "token endpoint returned an absurd lifetime");
            return Err(TokenError::refresh_failed(
                "invalid_response",
                Some(format!("expires_in out of range: {}", response.expires_in)),
            ));
        }

        let expires_in = response.lifetime();
        let rotated = response.refresh_token.is_some();
        let credential = Credential::from_response(response, Some(refresh_token), Instant::now());

        {
            let mut slot = self.slot.write().await;
            if slot.epoch != epoch {
                debug!("credential replaced while refreshing, discarding result");
                return slot.credential.clone().ok_or(TokenError::AuthRequired);
            }
            slot.epoch += 1;
            slot.credential = Some(credential.clone());
            self.schedule(expires_in);
        }

        info!(
            expires_in_secs = expires_in.as_secs(),
            rotated, "access token refreshed"
        );
        Ok(credential)
    }

    fn schedule(self: &Arc<Self>, expires_in: Duration) -> bool {
        let mut timer = lock(&self.timer);
        if let Some(previous) = timer.take() {
            previous.handle.abort();
        }

        let Some(delay) = expires_in
            .checked_sub(self.refresh_margin)
            .filter(|d| !d.is_zero())
        else {
            debug!(
                expires_in_secs = expires_in.as_secs(),
                "expiry inside refresh margin, proactive refresh not armed"
            );
            return false;
        };

        let Some(fires_at) = Instant::now().checked_add(delay) else {
            warn!(delay_secs = delay.as_secs(), "proactive refresh delay out of range, not armed");
            return false;
        };
        let generation = self.timer_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(proactive_refresh(weak, generation, fires_at)).abort_handle();

        *timer = Some(ScheduledRefresh {
            generation,
            fires_at,
            handle,
        });
        debug!(generation, delay_secs = delay.as_secs(), "proactive refresh armed");
        true
    }
}

async fn proactive_refresh(inner: Weak<Inner>, generation: u64, fires_at: Instant) {
    sleep_until(fires_at).await;

    let Some(inner) = inner.upgrade() else {
        return;
    };
    {
        let mut timer = lock(&inner.timer);
        // Superseded between waking up and taking the lock.
        if timer.as_ref().map(|s| s.generation) != Some(generation) {
            return;
        }
        timer.take();
    }

    info!(generation, "proactive token refresh");
    let manager = TokenManager { inner };
    if let Err(e) = manager.refresh().await {
        warn!(error = %e, "proactive refresh failed, next token request will retry");
    }
}
