//! Shared vocabulary for the ytstenut overlay crates.
//!
//! Holds the error type, the service descriptor model and its name
//! grammar, the request/error enums with their wire nicks, and the
//! overlay configuration. No async, no network; everything here is
//! plain data the protocol and overlay crates build on.

pub mod config;
pub mod error;
pub mod message;
pub mod service;

pub use config::{ChannelConfig, Config, ConfigIssue, ConfigSeverity, IdentityConfig, TimeoutConfig};
pub use error::{Error, Result};
pub use message::{ErrorType, MessageError, RequestType};
pub use service::{validate_service_name, LocalService, ServiceDescriptor};
