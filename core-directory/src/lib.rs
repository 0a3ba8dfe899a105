//! # Station Directory Module
//!
//! Client for the public radio-browser directory API.
//!
//! ## Overview
//!
//! - [`ServerPool`] keeps the list of directory mirrors and decides which one
//!   serves the next request, rotating away from failed servers.
//! - [`StationDirectoryClient`] issues searches and listings through the pool,
//!   retrying once on another server when a request cannot reach its server.
//!
//! Degraded conditions are typed: see [`DirectoryError`].

pub mod client;
pub mod error;
pub mod models;
pub mod server_pool;

pub use client::StationDirectoryClient;
pub use error::{DirectoryError, Result};
pub use models::{CountryInfo, LanguageInfo, SearchFilters, SortOrder, TagInfo};
pub use server_pool::{Endpoint, EndpointSnapshot, ServerPool};
