//! Service dispatch layer for uaserve.
//!
//! This crate wires the subscription engine into something a transport can
//! call: a [`ServiceHandler`] exposing one method per service, a layered
//! [`Config`], Prometheus [`ServerMetrics`] and the certificate thumbprint
//! helper used for session channel binding.
//!
//! [`ServiceHandler`]: handler::ServiceHandler
//! [`Config`]: config::Config
//! [`ServerMetrics`]: metrics::ServerMetrics

pub mod config;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod thumbprint;

pub use config::{Config, ConfigError};
pub use error::ServerError;
pub use handler::{PublishResult, ServiceHandler};
pub use metrics::ServerMetrics;
pub use thumbprint::certificate_thumbprint;
