//! Device networking: discovery, health checks and the shared endpoint

pub mod discovery;
pub mod endpoint;
pub mod health;

pub use discovery::{discover, local_ipv4};
pub use endpoint::{DeviceEndpoint, SharedEndpoint};
pub use health::{DeviceStatus, HealthCheck, HealthClient};
