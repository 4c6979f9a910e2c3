//! Data models for the upload adapter.
//!
//! - `BodyComposition`: one scale measurement as received on stdin
//! - `UploadSummary`: the subset echoed back after a successful upload

pub mod body_composition;

pub use body_composition::{BodyComposition, UploadSummary};
