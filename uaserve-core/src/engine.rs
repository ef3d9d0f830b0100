//! The server engine: session registry, reaper and shared sampling.

use crate::error::CoreError;
use crate::monitored_item::MonitoredItem;
use crate::node_access::NodeAccessor;
use crate::scheduler::SamplingScheduler;
use crate::session::{ChannelInfo, Session, SessionLimits};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uaserve_types::service::AuthenticationToken;
use uaserve_types::NodeId;

/// Engine-wide configuration.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub max_sessions: usize,
    pub session_limits: SessionLimits,
    /// Parked publish requests older than this are failed with a timeout.
    pub publish_request_timeout: Duration,
    /// How often expired sessions and stale publishes are swept.
    pub reaper_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_sessions: 100,
            session_limits: SessionLimits::default(),
            publish_request_timeout: Duration::from_secs(30),
            reaper_interval: Duration::from_secs(1),
        }
    }
}

/// Owns every session and the shared sampling scheduler.
///
/// Sessions are keyed by their authentication token; the reaper task closes
/// the ones whose idle deadline passed and times out stale publishes.
pub struct ServerEngine {
    config: EngineConfig,
    accessor: Arc<dyn NodeAccessor>,
    scheduler: Arc<SamplingScheduler>,
    sessions: DashMap<AuthenticationToken, Arc<Session>>,
    next_session_id: AtomicU32,
    rejected_sessions: AtomicU64,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl ServerEngine {
    pub fn new(accessor: Arc<dyn NodeAccessor>, config: EngineConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            scheduler: Arc::new(SamplingScheduler::new(Arc::clone(&accessor))),
            accessor,
            sessions: DashMap::new(),
            next_session_id: AtomicU32::new(1),
            rejected_sessions: AtomicU64::new(0),
            reaper: Mutex::new(None),
        })
    }

    /// Starts the background reaper.
    pub fn start(self: &Arc<Self>) {
        let engine = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(engine.config.reaper_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                engine.reap();
            }
        });
        *self.reaper.lock() = Some(task);
        info!(
            "engine started (max {} sessions)",
            self.config.max_sessions
        );
    }

    pub fn accessor(&self) -> &Arc<dyn NodeAccessor> {
        &self.accessor
    }

    pub fn scheduler(&self) -> &Arc<SamplingScheduler> {
        &self.scheduler
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Sessions refused because the server was full.
    pub fn rejected_session_count(&self) -> u64 {
        self.rejected_sessions.load(Ordering::Relaxed)
    }

    /// Creates a session bound to the creating channel. Returns the session
    /// with its revised timeout and initial server nonce.
    pub fn create_session(
        &self,
        session_name: String,
        channel: ChannelInfo,
        requested_timeout_ms: f64,
    ) -> Result<(Arc<Session>, f64, Vec<u8>), CoreError> {
        if self.sessions.len() >= self.config.max_sessions {
            self.rejected_sessions.fetch_add(1, Ordering::Relaxed);
            warn!("session rejected: server at capacity");
            return Err(CoreError::TooManySessions);
        }

        let numeric_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let session_id = NodeId::numeric(1, numeric_id);
        let (session, revised_timeout, nonce) = Session::new(
            session_id,
            session_name,
            channel,
            requested_timeout_ms,
            self.config.session_limits,
        );
        self.sessions
            .insert(session.authentication_token(), Arc::clone(&session));
        info!(
            "session {} created ({} active)",
            session.session_id(),
            self.sessions.len()
        );
        Ok((session, revised_timeout, nonce))
    }

    pub fn find_session(&self, token: &AuthenticationToken) -> Result<Arc<Session>, CoreError> {
        self.sessions
            .get(token)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(CoreError::SessionNotFound)
    }

    /// Closes and removes a session, releasing its sampling registrations.
    pub fn close_session(&self, token: &AuthenticationToken) -> Result<(), CoreError> {
        let (_, session) = self
            .sessions
            .remove(token)
            .ok_or(CoreError::SessionNotFound)?;
        self.release_items(session.close());
        Ok(())
    }

    /// Stops the reaper and closes everything.
    pub fn shutdown(&self) {
        if let Some(task) = self.reaper.lock().take() {
            task.abort();
        }
        let tokens: Vec<AuthenticationToken> = self
            .sessions
            .iter()
            .map(|entry| *entry.key())
            .collect();
        for token in tokens {
            if let Some((_, session)) = self.sessions.remove(&token) {
                self.release_items(session.close());
            }
        }
        self.scheduler.shutdown();
        info!("engine shut down");
    }

    /// One reaper pass: expire idle sessions, time out stale publishes.
    fn reap(&self) {
        let mut expired: Vec<AuthenticationToken> = Vec::new();
        for entry in self.sessions.iter() {
            let session = entry.value();
            if session.is_expired() {
                expired.push(*entry.key());
            } else {
                session
                    .publish_engine()
                    .sweep_stale(self.config.publish_request_timeout);
            }
        }
        for token in expired {
            if let Some((_, session)) = self.sessions.remove(&token) {
                debug!("session {} expired", session.session_id());
                self.release_items(session.close());
            }
        }
    }

    fn release_items(&self, items: Vec<Arc<MonitoredItem>>) {
        for item in items {
            self.scheduler.unregister(&item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_access::{AttributeId, NodeInfo};
    use uaserve_types::{DataValue, IdentityToken, Variant};

    struct NullAccessor;

    impl NodeAccessor for NullAccessor {
        fn read_attribute(
            &self,
            _node_id: &NodeId,
            _attribute_id: AttributeId,
            _index_range: Option<&str>,
        ) -> DataValue {
            DataValue::new(Variant::Double(0.0))
        }

        fn find_object(&self, _node_id: &NodeId) -> Option<NodeInfo> {
            None
        }
    }

    fn test_engine(config: EngineConfig) -> Arc<ServerEngine> {
        ServerEngine::new(Arc::new(NullAccessor), config)
    }

    fn channel(id: u32) -> ChannelInfo {
        ChannelInfo {
            channel_id: id,
            certificate_thumbprint: None,
        }
    }

    #[tokio::test]
    async fn test_session_lookup_by_token() {
        let engine = test_engine(EngineConfig::default());
        let (session, _, _) = engine
            .create_session("client".into(), channel(1), 30_000.0)
            .unwrap();
        let token = session.authentication_token();

        let found = engine.find_session(&token).unwrap();
        assert_eq!(found.session_id(), session.session_id());
        assert!(engine
            .find_session(&AuthenticationToken::generate())
            .is_err());
    }

    #[tokio::test]
    async fn test_session_ids_are_unique() {
        let engine = test_engine(EngineConfig::default());
        let (a, _, _) = engine
            .create_session("a".into(), channel(1), 30_000.0)
            .unwrap();
        let (b, _, _) = engine
            .create_session("b".into(), channel(2), 30_000.0)
            .unwrap();
        assert_ne!(a.session_id(), b.session_id());
        assert_ne!(a.authentication_token(), b.authentication_token());
    }

    #[tokio::test]
    async fn test_capacity_limit_counts_rejections() {
        let engine = test_engine(EngineConfig {
            max_sessions: 1,
            ..Default::default()
        });
        engine
            .create_session("a".into(), channel(1), 30_000.0)
            .unwrap();
        assert!(matches!(
            engine.create_session("b".into(), channel(2), 30_000.0),
            Err(CoreError::TooManySessions)
        ));
        assert_eq!(engine.rejected_session_count(), 1);

        // Closing a session frees capacity
        let token = *engine.sessions.iter().next().unwrap().key();
        engine.close_session(&token).unwrap();
        assert!(engine
            .create_session("c".into(), channel(3), 30_000.0)
            .is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_closes_expired_sessions() {
        let engine = test_engine(EngineConfig {
            session_limits: SessionLimits {
                min_timeout_ms: 100.0,
                ..Default::default()
            },
            reaper_interval: Duration::from_millis(50),
            ..Default::default()
        });
        engine.start();

        let (session, revised, _) = engine
            .create_session("short".into(), channel(1), 100.0)
            .unwrap();
        assert_eq!(revised, 100.0);
        session
            .activate(&channel(1), IdentityToken::Anonymous)
            .unwrap();

        tokio::time::advance(Duration::from_millis(500)).await;
        tokio::task::yield_now().await;

        assert_eq!(engine.session_count(), 0);
        assert!(engine.find_session(&session.authentication_token()).is_err());
        engine.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_closes_all_sessions() {
        let engine = test_engine(EngineConfig::default());
        let (session, _, _) = engine
            .create_session("a".into(), channel(1), 30_000.0)
            .unwrap();
        engine.shutdown();
        assert_eq!(engine.session_count(), 0);
        assert_eq!(session.status(), crate::session::SessionStatus::Closed);
    }
}
