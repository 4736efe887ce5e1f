//! Builder: single-pass layout of task stages.
//!
//! Stages are placed in update-time order. A stage with a transition source
//! hangs below that source; one whose source was never placed is dropped.

use std::collections::HashMap;
use tracing::debug;

use super::model::{Position, StageEdge, StageGraph, StageKey, StageNode, TaskStage};
use super::style::describe;
use crate::conf::StageLayoutConfig;

#[derive(Debug, Clone, Copy, Default)]
pub struct StageGraphBuilder {
    layout: StageLayoutConfig,
}

impl StageGraphBuilder {
    pub fn new(layout: StageLayoutConfig) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> StageLayoutConfig {
        self.layout
    }

    pub fn build(&self, stages: &[TaskStage]) -> StageGraph {
        let mut ordered: Vec<&TaskStage> = stages.iter().collect();
        ordered.sort_by_key(|s| s.update_time_micros);

        let mut graph = StageGraph::default();
        let mut placed: HashMap<StageKey, usize> = HashMap::new();
        let mut lanes: HashMap<String, usize> = HashMap::new();

        for stage in ordered {
            let key = stage.key();
            if placed.contains_key(&key) {
                continue;
            }

            let (y, edge) = match &stage.transition_source {
                None => (self.layout.base_offset, None),
                Some(source) => {
                    let source_key = source.key();
                    let Some(&idx) = placed.get(&source_key) else {
                        debug!(
                            task = %stage.task_link,
                            sub_stage = %stage.sub_stage,
                            "Skipping stage with unplaced transition source"
                        );
                        graph.skipped += 1;
                        continue;
                    };
                    let src = &graph.nodes[idx];
                    let y = src
                        .position
                        .y
                        .saturating_add(src.height)
                        .saturating_add(self.layout.padding);
                    (y, Some(StageEdge { from: source_key, to: key.clone() }))
                }
            };

            let lane = match lanes.get(&stage.task_link) {
                Some(&lane) => lane,
                None => {
                    graph.lanes.push(stage.task_link.clone());
                    lanes.insert(stage.task_link.clone(), graph.lanes.len() - 1);
                    graph.lanes.len() - 1
                }
            };

            let style = describe(&stage.task_link, &stage.sub_stage, stage.stage);
            placed.insert(key.clone(), graph.nodes.len());
            graph.nodes.push(StageNode {
                key,
                stage: stage.stage,
                label: style.label,
                color: style.color,
                position: Position {
                    x: u32::try_from(lane)
                        .unwrap_or(u32::MAX)
                        .saturating_mul(self.layout.lane_width),
                    y,
                },
                height: self.layout.node_height,
            });
            graph.edges.extend(edge);
        }

        graph
    }
}
