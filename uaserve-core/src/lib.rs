//! Subscription engine core for uaserve.
//!
//! The pieces fit together like this: a [`ServerEngine`] owns sessions keyed
//! by authentication token; each [`Session`] owns its subscriptions, a
//! [`PublishEngine`] rendezvous and a [`ContinuationPointManager`]; each
//! [`Subscription`] owns monitored items and a publishing timer; monitored
//! items are sampled by the shared [`SamplingScheduler`] through the
//! [`NodeAccessor`] seam the embedding server provides.
//!
//! [`ServerEngine`]: engine::ServerEngine
//! [`Session`]: session::Session
//! [`PublishEngine`]: publish_engine::PublishEngine
//! [`ContinuationPointManager`]: continuation::ContinuationPointManager
//! [`Subscription`]: subscription::Subscription
//! [`SamplingScheduler`]: scheduler::SamplingScheduler
//! [`NodeAccessor`]: node_access::NodeAccessor

pub mod continuation;
pub mod engine;
pub mod error;
pub mod monitored_item;
pub mod node_access;
pub mod publish_engine;
pub mod scheduler;
pub mod session;
pub mod subscription;

pub use continuation::ContinuationPointManager;
pub use engine::{EngineConfig, ServerEngine};
pub use error::CoreError;
pub use monitored_item::{ItemLimits, MonitoredItem};
pub use node_access::{AttributeId, NodeAccessor, NodeInfo};
pub use publish_engine::{PublishEngine, PublishResponse};
pub use scheduler::SamplingScheduler;
pub use session::{ChannelInfo, Session, SessionLimits, SessionStatus};
pub use subscription::{Subscription, SubscriptionLimits, SubscriptionState, TickOutcome};
