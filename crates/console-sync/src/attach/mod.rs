//! Attach module: the bipartite graph between primary descriptors and the
//! shared networks/volumes they reference.

pub mod engine;
pub mod model;

pub use engine::{patch_body, rebuild, AttachmentEngine};
pub use model::{
    AttachmentGraph, PrimaryDescriptor, SharedDescriptor, SharedKind, SYSTEM_NETWORK_LINK,
    SYSTEM_NETWORK_MODES,
};
