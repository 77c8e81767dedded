//! Conversions from orchestration-layer objects to engine inputs.
//!
//! Jobs arrive with their scheduling modes encoded as labels and
//! annotations; tasks carry an optional explicit rank annotation. This
//! module owns the label vocabulary and the parsing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use podgrid_state::{
    AffinityMode, FitPolicy, JobId, JobSpec, RescheduleScope, SelectorKind, TaskName,
};

/// Label selecting hard or soft super-pod affinity.
pub const LABEL_AFFINITY: &str = "podgrid.io/super-pod-affinity";
/// Label selecting the resource-fit tie-break policy.
pub const LABEL_FIT_POLICY: &str = "podgrid.io/resource-fit";
/// Label selecting the rescheduling granularity.
pub const LABEL_RESCHEDULE_SCOPE: &str = "podgrid.io/reschedule-scope";
/// Label selecting which selector fills virtual pods.
pub const LABEL_SELECTOR: &str = "podgrid.io/selector";
/// Label naming the job's co-location group.
pub const LABEL_AFFINITY_GROUP: &str = "podgrid.io/affinity-group";
/// Annotation carrying a task's explicit global rank.
pub const ANNOTATION_RANK_INDEX: &str = "podgrid.io/rank-index";

/// A job as handed over by the orchestration layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalJob {
    pub job_id: JobId,
    pub npu_task_num: u32,
    pub req_npu_num: u32,
    pub sp_block_npu_num: u32,
    #[serde(default)]
    pub scheduling_task_num: Option<u32>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

/// One task of a job, as presented to a scoring callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRef {
    pub task_name: TaskName,
    /// Position of the task within its job.
    pub index: u32,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

impl TaskRef {
    pub fn new(task_name: impl Into<TaskName>, index: u32) -> Self {
        Self {
            task_name: task_name.into(),
            index,
            annotations: HashMap::new(),
        }
    }

    /// Global rank: the explicit annotation when present and parseable,
    /// the task index otherwise.
    pub fn rank(&self) -> u32 {
        match self.annotations.get(ANNOTATION_RANK_INDEX) {
            Some(raw) => match raw.parse() {
                Ok(rank) => rank,
                Err(_) => {
                    warn!(task = %self.task_name, %raw, "unparseable rank annotation, using task index");
                    self.index
                }
            },
            None => self.index,
        }
    }
}

fn parse_label<T: Default>(
    labels: &HashMap<String, String>,
    key: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> T {
    match labels.get(key) {
        Some(value) => match parse(value) {
            Some(parsed) => parsed,
            None => {
                warn!(label = key, %value, "unknown label value, using default");
                T::default()
            }
        },
        None => T::default(),
    }
}

/// Parse an external job into the engine's [`JobSpec`].
pub fn job_spec_from_external(raw: &ExternalJob) -> JobSpec {
    let affinity = parse_label(&raw.labels, LABEL_AFFINITY, |v| match v {
        "hard" => Some(AffinityMode::Hard),
        "soft" => Some(AffinityMode::Soft),
        _ => None,
    });
    let fit_policy = parse_label(&raw.labels, LABEL_FIT_POLICY, |v| match v {
        "idlest" => Some(FitPolicy::Idlest),
        "busiest" => Some(FitPolicy::Busiest),
        _ => None,
    });
    let reschedule_scope = parse_label(&raw.labels, LABEL_RESCHEDULE_SCOPE, |v| match v {
        "job" => Some(RescheduleScope::Job),
        "pod" => Some(RescheduleScope::Pod),
        "process" => Some(RescheduleScope::Process),
        _ => None,
    });
    let selector = parse_label(&raw.labels, LABEL_SELECTOR, |v| match v {
        "phased" => Some(SelectorKind::Phased),
        "affinity-queue" => Some(SelectorKind::AffinityQueue),
        _ => None,
    });

    JobSpec {
        job_id: raw.job_id.clone(),
        npu_task_num: raw.npu_task_num,
        req_npu_num: raw.req_npu_num,
        sp_block_npu_num: raw.sp_block_npu_num,
        scheduling_task_num: raw.scheduling_task_num.unwrap_or(raw.npu_task_num),
        affinity,
        fit_policy,
        reschedule_scope,
        selector,
        affinity_group: raw.labels.get(LABEL_AFFINITY_GROUP).cloned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn external(labels: &[(&str, &str)]) -> ExternalJob {
        ExternalJob {
            job_id: "job-1".into(),
            npu_task_num: 4,
            req_npu_num: 32,
            sp_block_npu_num: 16,
            scheduling_task_num: None,
            labels: labels
                .iter()
                .map(|&(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            annotations: HashMap::new(),
        }
    }

    #[test]
    fn unlabeled_job_gets_defaults() {
        let spec = job_spec_from_external(&external(&[]));

        assert_eq!(spec.affinity, AffinityMode::Hard);
        assert_eq!(spec.fit_policy, FitPolicy::Idlest);
        assert_eq!(spec.reschedule_scope, RescheduleScope::Job);
        assert_eq!(spec.selector, SelectorKind::Phased);
        assert!(spec.affinity_group.is_none());
        assert_eq!(spec.scheduling_task_num, 4);
    }

    #[test]
    fn labels_select_modes() {
        let spec = job_spec_from_external(&external(&[
            (LABEL_AFFINITY, "soft"),
            (LABEL_FIT_POLICY, "busiest"),
            (LABEL_RESCHEDULE_SCOPE, "pod"),
            (LABEL_SELECTOR, "affinity-queue"),
            (LABEL_AFFINITY_GROUP, "chain-a"),
        ]));

        assert_eq!(spec.affinity, AffinityMode::Soft);
        assert_eq!(spec.fit_policy, FitPolicy::Busiest);
        assert_eq!(spec.reschedule_scope, RescheduleScope::Pod);
        assert_eq!(spec.selector, SelectorKind::AffinityQueue);
        assert_eq!(spec.affinity_group.as_deref(), Some("chain-a"));
    }

    #[test]
    fn unknown_label_value_falls_back() {
        let spec = job_spec_from_external(&external(&[(LABEL_AFFINITY, "medium")]));
        assert_eq!(spec.affinity, AffinityMode::Hard);
    }

    #[test]
    fn rank_prefers_annotation_over_index() {
        let mut task = TaskRef::new("task-2", 2);
        assert_eq!(task.rank(), 2);

        task.annotations
            .insert(ANNOTATION_RANK_INDEX.to_string(), "7".to_string());
        assert_eq!(task.rank(), 7);
    }

    #[test]
    fn bad_rank_annotation_falls_back_to_index() {
        let mut task = TaskRef::new("task-2", 2);
        task.annotations
            .insert(ANNOTATION_RANK_INDEX.to_string(), "seven".to_string());
        assert_eq!(task.rank(), 2);
    }
}
