//! Headless portal client: the table orchestration every portal screen uses.
//!
//! A screen wires a [`table::TableController`] to a [`api::ResourceTable`], a
//! [`debounce::DebouncedSearch`] and the [`invalidation::InvalidationBus`] shared
//! with its [`api::PortalClient`]; mutations made through the client reload
//! every table showing the same resource.

pub mod api;
pub mod config;
pub mod debounce;
pub mod error;
pub mod invalidation;
pub mod table;

pub use api::{PortalClient, ResourceTable};
pub use config::ClientConfig;
pub use error::ClientError;
pub use invalidation::InvalidationBus;
pub use table::{DataSource, TableController, TableState, TableView};
