//! Stages module: lays out the recorded stages of a request's tasks as a
//! vertical DAG, one lane per task.

pub mod builder;
pub mod model;
pub mod style;

pub use builder::StageGraphBuilder;
pub use model::{
    Position, RequestGraphResponse, StageEdge, StageGraph, StageKey, StageNode, TaskHistory, TaskStage,
    TransitionSource,
};
pub use style::{describe, StageStyle};
