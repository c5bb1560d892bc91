use std::time::Duration;

pub mod config;
pub mod controller;
pub mod main;

/// How often the controller pings every member
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Silence after which a member is considered gone
pub const PEER_TIMEOUT: Duration = Duration::from_secs(90);

/// Cadence of the timeout sweep
pub const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(10);

/// Extra silence, past the timeout, before a record is dropped
pub const REMOVAL_GRACE: Duration = Duration::from_secs(30);
