//! input-remapper service
//!
//! Supervises one remapping worker per input device and forwards selected
//! actions to an MQTT broker.
//!
//! - [`daemon`] - startup stages, the main loop and shutdown order
//! - [`supervisor`] - worker lifecycle and target exclusivity
//! - [`mapping`] - mapping rules and handler chains
//! - [`registry`] / [`capture`] - output and input seams
//! - [`control`] - control requests and transports
//! - [`zenoh_io`] - Zenoh implementations of the seams
//! - [`entrypoint`] - runtime, bridge lifecycle and exit codes

pub mod args;
pub mod capture;
pub mod config;
pub mod control;
pub mod daemon;
pub mod entrypoint;
pub mod error;
pub mod mapping;
pub mod registry;
pub mod status;
pub mod supervisor;
pub mod worker;
pub mod zenoh_io;

pub use args::ServiceArgs;
pub use config::GlobalConfig;
pub use daemon::{Collaborators, Daemon, StartupStage};
pub use entrypoint::{ServiceExit, run_guarded};
pub use error::{Result, ServiceError};
