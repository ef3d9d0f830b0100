//! Sessions: activation, channel binding, transfer and teardown.

use crate::continuation::ContinuationPointManager;
use crate::error::CoreError;
use crate::monitored_item::MonitoredItem;
use crate::publish_engine::PublishEngine;
use crate::subscription::{Subscription, SubscriptionLimits};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uaserve_types::service::{AuthenticationToken, CreateSubscriptionParams};
use uaserve_types::{IdentityToken, NodeId};
use uuid::Uuid;

/// The secure channel a request arrived on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub channel_id: u32,
    /// SHA-256 thumbprint of the client certificate, when the channel is
    /// secured.
    pub certificate_thumbprint: Option<String>,
}

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Created but never activated.
    New,
    Active,
    /// A service call arrived before activation; the session is unusable
    /// and every further call fails.
    Poisoned,
    Closed,
}

/// Bounds imposed on sessions and what they contain.
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    pub min_timeout_ms: f64,
    pub max_timeout_ms: f64,
    pub max_subscriptions_per_session: usize,
    pub max_pending_publish_requests: usize,
    pub max_continuation_points: usize,
    pub subscription_limits: SubscriptionLimits,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            min_timeout_ms: 10_000.0,
            max_timeout_ms: 3_600_000.0,
            max_subscriptions_per_session: 100,
            max_pending_publish_requests: 100,
            max_continuation_points: 100,
            subscription_limits: SubscriptionLimits::default(),
        }
    }
}

struct SessionState {
    status: SessionStatus,
    /// Fresh on every activation, including re-activation over the same
    /// channel.
    nonce: Vec<u8>,
    channel: ChannelInfo,
    identity_token: Option<IdentityToken>,
    timeout: Duration,
    deadline: Instant,
    subscriptions: HashMap<u32, Arc<Subscription>>,
    next_subscription_id: u32,
}

/// One client session, bound to a secure channel.
pub struct Session {
    session_id: NodeId,
    session_name: String,
    authentication_token: AuthenticationToken,
    limits: SessionLimits,
    publish_engine: Arc<PublishEngine>,
    continuation_points: ContinuationPointManager,
    inner: Mutex<SessionState>,
}

impl Session {
    /// Creates a session bound to `channel`, returning it together with the
    /// revised timeout and the initial server nonce.
    pub fn new(
        session_id: NodeId,
        session_name: String,
        channel: ChannelInfo,
        requested_timeout_ms: f64,
        limits: SessionLimits,
    ) -> (Arc<Self>, f64, Vec<u8>) {
        let timeout_ms = revise_timeout(requested_timeout_ms, &limits);
        let timeout = Duration::from_millis(timeout_ms as u64);
        let nonce = generate_nonce();
        let session = Arc::new(Self {
            session_id,
            session_name,
            authentication_token: AuthenticationToken::generate(),
            limits,
            publish_engine: Arc::new(PublishEngine::new(limits.max_pending_publish_requests)),
            continuation_points: ContinuationPointManager::new(limits.max_continuation_points),
            inner: Mutex::new(SessionState {
                status: SessionStatus::New,
                nonce: nonce.clone(),
                channel,
                identity_token: None,
                timeout,
                deadline: Instant::now() + timeout,
                subscriptions: HashMap::new(),
                next_subscription_id: 1,
            }),
        });
        (session, timeout_ms, nonce)
    }

    pub fn session_id(&self) -> &NodeId {
        &self.session_id
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    pub fn authentication_token(&self) -> AuthenticationToken {
        self.authentication_token
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.lock().status
    }

    pub fn current_nonce(&self) -> Vec<u8> {
        self.inner.lock().nonce.clone()
    }

    pub fn bound_channel_id(&self) -> u32 {
        self.inner.lock().channel.channel_id
    }

    pub fn publish_engine(&self) -> &Arc<PublishEngine> {
        &self.publish_engine
    }

    pub fn continuation_points(&self) -> &ContinuationPointManager {
        &self.continuation_points
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.lock().subscriptions.len()
    }

    pub fn is_expired(&self) -> bool {
        let state = self.inner.lock();
        state.status != SessionStatus::Closed && Instant::now() > state.deadline
    }

    /// Activates the session, or transfers it to a new channel.
    ///
    /// Transfer requires the new channel to present the same certificate
    /// thumbprint the session was created with and the identical identity
    /// token it was activated with. Every successful activation issues a
    /// fresh server nonce.
    pub fn activate(
        &self,
        channel: &ChannelInfo,
        identity_token: IdentityToken,
    ) -> Result<Vec<u8>, CoreError> {
        validate_identity(&identity_token)?;
        let mut state = self.inner.lock();
        match state.status {
            SessionStatus::Closed | SessionStatus::Poisoned => {
                return Err(CoreError::SessionClosed);
            }
            SessionStatus::New => {
                // First activation must come over the creating channel
                if channel.channel_id != state.channel.channel_id {
                    return Err(CoreError::SessionNotActivated);
                }
            }
            SessionStatus::Active => {
                if channel.channel_id != state.channel.channel_id {
                    if channel.certificate_thumbprint != state.channel.certificate_thumbprint {
                        warn!(
                            "session {} transfer rejected: certificate mismatch",
                            self.session_id
                        );
                        return Err(CoreError::CertificateMismatch);
                    }
                    if state.identity_token.as_ref() != Some(&identity_token) {
                        warn!(
                            "session {} transfer rejected: identity changed",
                            self.session_id
                        );
                        return Err(CoreError::IdentityChangeNotSupported);
                    }
                    info!(
                        "session {} transferred from channel {} to {}",
                        self.session_id, state.channel.channel_id, channel.channel_id
                    );
                    state.channel = channel.clone();
                }
            }
        }

        let nonce = generate_nonce();
        state.nonce = nonce.clone();
        state.identity_token = Some(identity_token);
        state.status = SessionStatus::Active;
        state.deadline = Instant::now() + state.timeout;
        debug!("session {} activated", self.session_id);
        Ok(nonce)
    }

    /// Gate every post-activation service call through here.
    ///
    /// A call on a never-activated session poisons it permanently; a call
    /// from the wrong channel is rejected without touching the deadline.
    /// Valid calls refresh the idle deadline.
    pub fn validate_request(&self, channel_id: u32) -> Result<(), CoreError> {
        let mut state = self.inner.lock();
        match state.status {
            SessionStatus::New => {
                warn!(
                    "session {} used before activation, poisoning it",
                    self.session_id
                );
                state.status = SessionStatus::Poisoned;
                Err(CoreError::SessionNotActivated)
            }
            SessionStatus::Poisoned => Err(CoreError::SessionClosed),
            SessionStatus::Closed => Err(CoreError::SessionNotFound),
            SessionStatus::Active => {
                if channel_id != state.channel.channel_id {
                    return Err(CoreError::ChannelMismatch);
                }
                state.deadline = Instant::now() + state.timeout;
                Ok(())
            }
        }
    }

    /// Creates and starts a subscription, wiring its timer into the publish
    /// rendezvous.
    pub fn create_subscription(
        &self,
        params: &CreateSubscriptionParams,
    ) -> Result<(Arc<Subscription>, (f64, u32, u32)), CoreError> {
        let mut state = self.inner.lock();
        if state.subscriptions.len() >= self.limits.max_subscriptions_per_session {
            return Err(CoreError::TooManySubscriptions);
        }
        let id = state.next_subscription_id;
        state.next_subscription_id += 1;
        let (subscription, revised) =
            Subscription::new(id, params, self.limits.subscription_limits);
        state.subscriptions.insert(id, Arc::clone(&subscription));
        drop(state);

        self.publish_engine.register(Arc::clone(&subscription));
        let engine: Weak<PublishEngine> = Arc::downgrade(&self.publish_engine);
        subscription.start(move || {
            if let Some(engine) = engine.upgrade() {
                engine.dispatch_ready();
            }
        });
        debug!(
            "session {} created subscription {} ({}ms)",
            self.session_id, id, revised.0
        );
        Ok((subscription, revised))
    }

    pub fn get_subscription(&self, subscription_id: u32) -> Result<Arc<Subscription>, CoreError> {
        self.inner
            .lock()
            .subscriptions
            .get(&subscription_id)
            .cloned()
            .ok_or(CoreError::SubscriptionNotFound {
                id: subscription_id,
            })
    }

    pub fn subscription_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.inner.lock().subscriptions.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Deletes one subscription, returning its terminated items so the
    /// caller can drop their sampling registrations.
    pub fn delete_subscription(
        &self,
        subscription_id: u32,
    ) -> Result<Vec<Arc<MonitoredItem>>, CoreError> {
        let subscription = self
            .inner
            .lock()
            .subscriptions
            .remove(&subscription_id)
            .ok_or(CoreError::SubscriptionNotFound {
                id: subscription_id,
            })?;
        self.publish_engine.unregister(subscription_id);
        Ok(subscription.close())
    }

    /// Closes the session and everything it owns: subscriptions close,
    /// monitored items terminate, parked publish requests fail and
    /// continuation points vanish. Idempotent.
    pub fn close(&self) -> Vec<Arc<MonitoredItem>> {
        let subscriptions = {
            let mut state = self.inner.lock();
            if state.status == SessionStatus::Closed {
                return Vec::new();
            }
            state.status = SessionStatus::Closed;
            state.subscriptions.drain().map(|(_, s)| s).collect::<Vec<_>>()
        };

        let mut items = Vec::new();
        for subscription in subscriptions {
            self.publish_engine.unregister(subscription.id());
            items.extend(subscription.close());
        }
        self.publish_engine.fail_all(|| CoreError::SessionClosed);
        self.continuation_points.clear();
        info!("session {} closed", self.session_id);
        items
    }
}

fn revise_timeout(requested_ms: f64, limits: &SessionLimits) -> f64 {
    if !requested_ms.is_finite() || requested_ms < limits.min_timeout_ms {
        limits.min_timeout_ms
    } else {
        requested_ms.min(limits.max_timeout_ms)
    }
}

fn generate_nonce() -> Vec<u8> {
    let mut nonce = Vec::with_capacity(32);
    nonce.extend_from_slice(Uuid::new_v4().as_bytes());
    nonce.extend_from_slice(Uuid::new_v4().as_bytes());
    nonce
}

/// Checks an identity token is well formed. Empty credentials are rejected
/// outright; everything else is the embedding server's concern.
fn validate_identity(token: &IdentityToken) -> Result<(), CoreError> {
    match token {
        IdentityToken::Anonymous => Ok(()),
        IdentityToken::UserName { user_name, .. } => {
            if user_name.is_empty() {
                Err(CoreError::IdentityTokenInvalid)
            } else {
                Ok(())
            }
        }
        IdentityToken::X509 { certificate_data } => {
            if certificate_data.is_empty() {
                Err(CoreError::IdentityTokenInvalid)
            } else {
                Ok(())
            }
        }
    }
}
