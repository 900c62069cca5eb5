//! Client library for verifying published Timestamper artifacts
//!
//! This library lets any third party check that a specific digest was
//! committed to a trusted-timestamping authority as part of a published
//! collection, consuming only the published artifacts.

pub mod verify;

pub use verify::{VerifyClient, VerifyError};
