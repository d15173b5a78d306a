//! Shared types for the Redfish conformance checker.
//!
//! Everything here is consumed by every other crate in the workspace: the
//! assertion identity, the verdict status lattice, and the resolved SUT
//! (System Under Test) configuration handed to the engine.

pub mod assertion;
pub mod config;
pub mod status;

pub use assertion::AssertionId;
pub use config::SutConfig;
pub use status::Status;
