//! Domain models for labfleet.
//!
//! Canonical definitions for the core entities:
//! - `Node`: a device record imported into a lab
//! - `ExecutionRequest`: one fleet invocation's payload
//! - `FleetError`: the error taxonomy shared by every layer

pub mod error;
pub mod node;
pub mod request;

pub use error::{FleetError, Result};
pub use node::{Node, INFRASTRUCTURE_KINDS};
pub use request::{
    ConfigPlan, ConfigSource, ExecutionRequest, FleetPayload, LoadMethod, OutputFormat,
    UploadPlan, UploadSource,
};
