//! Pipeline executions and stage ordering.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ExecutionInfo, ExecutionStatus, StageExecution, StageSnapshot, Trigger};
use crate::error::GraphError;

/// A pipeline run: top-level stages linked by `requisiteStageRefIds`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineExecution {
    pub id: String,
    pub application: String,
    #[serde(default)]
    pub trigger: Trigger,
    #[serde(default)]
    pub stages: Vec<StageExecution>,
    #[serde(default)]
    pub status: ExecutionStatus,
    #[serde(default)]
    pub start_time: Option<i64>,
    #[serde(default)]
    pub end_time: Option<i64>,
}

impl PipelineExecution {
    #[must_use]
    pub fn new(application: impl Into<String>, trigger: Trigger) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            application: application.into(),
            trigger,
            stages: Vec::new(),
            status: ExecutionStatus::NotStarted,
            start_time: None,
            end_time: None,
        }
    }

    /// Add a top-level stage, attaching this execution's data to it.
    pub fn add_stage(&mut self, mut stage: StageExecution) {
        if stage.ref_id.is_empty() {
            stage.ref_id = (self.stages.len() + 1).to_string();
        }
        stage.execution = self.execution_info();
        self.stages.push(stage);
    }

    /// Execution data without ancestor snapshots.
    #[must_use]
    pub fn execution_info(&self) -> ExecutionInfo {
        ExecutionInfo {
            id: self.id.clone(),
            application: self.application.clone(),
            trigger: self.trigger.clone(),
            ancestors: Vec::new(),
        }
    }

    /// Top-level stage indices in dependency order. Ties keep declaration
    /// order; synthetic stages are not part of the graph.
    pub fn topological_stages(&self) -> Result<Vec<usize>, GraphError> {
        let by_ref = self.index_by_ref_id();
        let top_level: Vec<usize> = (0..self.stages.len())
            .filter(|&index| self.stages[index].parent_stage_id.is_none())
            .collect();
        let mut in_degree = vec![0usize; self.stages.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.stages.len()];

        for &index in &top_level {
            let stage = &self.stages[index];
            for requisite in &stage.requisite_stage_ref_ids {
                let Some(&parent) = by_ref.get(requisite.as_str()) else {
                    return Err(GraphError::UnknownRequisite {
                        stage: stage.ref_id.clone(),
                        requisite: requisite.clone(),
                    });
                };
                in_degree[index] += 1;
                dependents[parent].push(index);
            }
        }

        let mut ready: VecDeque<usize> = top_level
            .iter()
            .copied()
            .filter(|&index| in_degree[index] == 0)
            .collect();
        let mut ordered = Vec::with_capacity(top_level.len());

        while let Some(index) = ready.pop_front() {
            ordered.push(index);
            for &dependent in &dependents[index] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.push_back(dependent);
                }
            }
        }

        if ordered.len() != top_level.len() {
            let stuck = top_level
                .iter()
                .find(|index| !ordered.contains(index))
                .map(|&index| self.stages[index].ref_id.clone())
                .unwrap_or_default();
            return Err(GraphError::Cycle(stuck));
        }

        Ok(ordered)
    }

    /// All transitive upstream stages of `index`, nearest first.
    #[must_use]
    pub fn ancestors_of(&self, index: usize) -> Vec<usize> {
        let by_ref = self.index_by_ref_id();
        let mut seen = HashSet::new();
        let mut queue: VecDeque<usize> = VecDeque::new();
        let mut ancestors = Vec::new();

        queue.push_back(index);
        while let Some(current) = queue.pop_front() {
            for requisite in &self.stages[current].requisite_stage_ref_ids {
                if let Some(&parent) = by_ref.get(requisite.as_str()) {
                    if seen.insert(parent) {
                        ancestors.push(parent);
                        queue.push_back(parent);
                    }
                }
            }
        }

        ancestors
    }

    /// Snapshot the upstream stages of `index` for expression and artifact lookups.
    #[must_use]
    pub fn ancestor_snapshots(&self, index: usize) -> Vec<StageSnapshot> {
        self.ancestors_of(index)
            .into_iter()
            .map(|ancestor| StageSnapshot::from(&self.stages[ancestor]))
            .collect()
    }

    fn index_by_ref_id(&self) -> HashMap<&str, usize> {
        self.stages
            .iter()
            .enumerate()
            .filter(|(_, stage)| stage.parent_stage_id.is_none())
            .map(|(index, stage)| (stage.ref_id.as_str(), index))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn stage(ref_id: &str, requisites: &[&str]) -> StageExecution {
        let mut stage = StageExecution::new("wait", Map::new()).with_ref_id(ref_id);
        stage.requisite_stage_ref_ids = requisites.iter().map(ToString::to_string).collect();
        stage
    }

    fn pipeline(stages: Vec<StageExecution>) -> PipelineExecution {
        let mut pipeline = PipelineExecution::new("app", Trigger::manual("tester"));
        for stage in stages {
            pipeline.add_stage(stage);
        }
        pipeline
    }

    #[test]
    fn test_topological_order_follows_requisites() {
        let pipeline = pipeline(vec![
            stage("3", &["2"]),
            stage("1", &[]),
            stage("2", &["1"]),
        ]);

        let order: Vec<&str> = pipeline
            .topological_stages()
            .unwrap()
            .into_iter()
            .map(|index| pipeline.stages[index].ref_id.as_str())
            .collect();
        assert_eq!(order, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_unknown_requisite_is_rejected() {
        let pipeline = pipeline(vec![stage("1", &["9"])]);
        assert!(matches!(
            pipeline.topological_stages(),
            Err(GraphError::UnknownRequisite { .. })
        ));
    }

    #[test]
    fn test_cycle_is_rejected() {
        let pipeline = pipeline(vec![stage("1", &["2"]), stage("2", &["1"])]);
        assert!(matches!(
            pipeline.topological_stages(),
            Err(GraphError::Cycle(_))
        ));
    }

    #[test]
    fn test_ancestors_are_transitive() {
        let pipeline = pipeline(vec![
            stage("1", &[]),
            stage("2", &["1"]),
            stage("3", &["2"]),
            stage("4", &[]),
        ]);

        let ancestors: Vec<&str> = pipeline
            .ancestors_of(2)
            .into_iter()
            .map(|index| pipeline.stages[index].ref_id.as_str())
            .collect();
        assert_eq!(ancestors, vec!["2", "1"]);
    }

    #[test]
    fn test_add_stage_assigns_ref_id_and_execution() {
        let mut pipeline = PipelineExecution::new("app", Trigger::default());
        pipeline.add_stage(StageExecution::new("wait", Map::new()));

        assert_eq!(pipeline.stages[0].ref_id, "1");
        assert_eq!(pipeline.stages[0].application(), "app");
        assert_eq!(pipeline.stages[0].execution.id, pipeline.id);
    }
}
