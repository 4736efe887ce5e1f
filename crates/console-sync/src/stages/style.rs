use serde::Serialize;

use crate::poller::Stage;

/// Task factory fragments, most specific first.
const TASK_NAMES: &[(&str, &str)] = &[
    ("/requests/", "Request"),
    ("composition-removal", "Composition Removal"),
    ("composite-component-removal", "Composition Removal"),
    ("network-allocation", "Network Allocation"),
    ("network-removal", "Network Removal"),
    ("network-provision", "Network Provisioning"),
    ("volume-allocation", "Volume Allocation"),
    ("volume-removal", "Volume Removal"),
    ("volume-provision", "Volume Provisioning"),
    ("ports-allocation", "Ports Allocation"),
    ("reservation-removal", "Reservation Removal"),
    ("reservation", "Reservation"),
    ("placement", "Placement"),
    ("closure", "Closure"),
    ("clustering", "Clustering"),
    ("service-links", "Service Links"),
    ("expose-service", "Service Exposure"),
    ("allocation", "Allocation"),
    ("provision", "Provisioning"),
    ("removal", "Removal"),
    ("operation", "Operation"),
];

const SUB_STAGE_LABELS: &[(&str, &str)] = &[
    ("CREATED", "Created"),
    ("CONTEXT_PREPARED", "Context Prepared"),
    ("RESOURCES_NAMED", "Resources Named"),
    ("RESOURCES_LINKS_BUILT", "Resource Links Built"),
    ("PLACEMENT_HOST_SELECTED", "Host Selected"),
    ("RESERVING", "Reserving"),
    ("RESERVED", "Reserved"),
    ("RESERVATION_SELECTED", "Reservation Selected"),
    ("RESERVATION_CLEANED_UP", "Reservation Cleaned Up"),
    ("QUERYING_GLOBAL", "Querying Global Policies"),
    ("SELECTED", "Selected"),
    ("SELECTED_GLOBAL", "Global Policy Selected"),
    ("ALLOCATING", "Allocating"),
    ("ALLOCATED", "Allocated"),
    ("START_PROVISIONING", "Start Provisioning"),
    ("PROVISIONING", "Provisioning"),
    ("CLUSTERING", "Clustering"),
    ("INSTANCES_REMOVING", "Removing Instances"),
    ("INSTANCES_REMOVED", "Instances Removed"),
    ("REMOVING_RESOURCE_STATES", "Removing Resource States"),
    ("EXECUTE", "Executing"),
    ("COMPLETED", "Completed"),
    ("FINISHED", "Finished"),
    ("REQUEST_FAILED", "Request Failed"),
    ("ERROR", "Error"),
    ("FAILED", "Failed"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageStyle {
    pub label: String,
    pub color: &'static str,
}

pub fn task_name(task_link: &str) -> Option<&'static str> {
    TASK_NAMES
        .iter()
        .find(|(fragment, _)| task_link.contains(fragment))
        .map(|(_, name)| *name)
}

/// Known sub-stages get a readable label; anything else echoes the raw id.
pub fn sub_stage_label(sub_stage: &str) -> &str {
    SUB_STAGE_LABELS
        .iter()
        .find(|(id, _)| *id == sub_stage)
        .map(|(_, label)| *label)
        .unwrap_or(sub_stage)
}

pub fn stage_color(stage: Stage) -> &'static str {
    match stage {
        Stage::Created => "#9aa5b1",
        Stage::Started => "#2f80ed",
        Stage::Finished => "#27ae60",
        Stage::Failed => "#eb5757",
        Stage::Cancelled => "#f2994a",
    }
}

pub fn describe(task_link: &str, sub_stage: &str, stage: Stage) -> StageStyle {
    let sub_label = sub_stage_label(sub_stage);
    let label = match task_name(task_link) {
        Some(task) => format!("{}: {}", task, sub_label),
        None => sub_label.to_string(),
    };
    StageStyle {
        label,
        color: stage_color(stage),
    }
}
