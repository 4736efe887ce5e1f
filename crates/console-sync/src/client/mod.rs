//! Client module: transport seam between the core and the document store.

pub mod error;
pub mod fake;
pub mod live;
pub mod store;

pub use error::TransportError;
pub use fake::FakeStore;
pub use live::HttpStore;
pub use store::{DocumentStore, Method, StoreFuture, StoreRequest, StoreResponse};
