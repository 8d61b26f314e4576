//! HR portal: an actix-web service whose list endpoints back paginated,
//! searchable, faceted tables, plus a headless client that drives those
//! tables (debounced search, facet toggles, resource-keyed reloads).

pub mod api;
pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod db;
pub mod docs;
pub mod error;
pub mod listing;
pub mod model;
pub mod models;
pub mod routes;
pub mod utils;
pub mod validation;
