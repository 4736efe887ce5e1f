pub mod boot;

pub use boot::{build_synchronizer, init_tracing_basic, init_tracing_from_config};
