//! REST API client module for Garmin Connect.
//!
//! This module provides the `ConnectClient` for uploading body composition
//! FIT files with an OAuth2 bearer token obtained by the `auth` module.

pub mod client;
pub mod error;

pub use client::ConnectClient;
pub use error::ApiError;
