//! Console view-state engine for a container management backend.
//!
//! Queries paged collections from the document store, tracks long-running
//! operations to completion, keeps the container/network/volume attachment
//! graph consistent and lays out request stage graphs. All state for one
//! screen is owned by a [`sync::ViewSynchronizer`].

pub mod attach;
pub mod client;
pub mod conf;
pub mod context;
pub mod poller;
pub mod query;
pub mod runtime;
pub mod stages;
pub mod sync;
