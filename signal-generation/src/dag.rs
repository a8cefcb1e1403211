//! Stage graph - explicit dependency DAG of the pipeline stages

use common::{PipelineError, SourceId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Node of the stage graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageId {
    Ingest,
    Technical,
    Sentiment,
    Social,
    Risk,
    Fuse,
}

impl StageId {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::Ingest => "ingest",
            StageId::Technical => "technical",
            StageId::Sentiment => "sentiment",
            StageId::Social => "social",
            StageId::Risk => "risk",
            StageId::Fuse => "fuse",
        }
    }

    /// The analysis branch this stage fills, if it is one
    pub fn branch(&self) -> Option<SourceId> {
        match self {
            StageId::Technical => Some(SourceId::Technical),
            StageId::Sentiment => Some(SourceId::Sentiment),
            StageId::Social => Some(SourceId::Social),
            _ => None,
        }
    }
}

impl From<SourceId> for StageId {
    fn from(source: SourceId) -> Self {
        match source {
            SourceId::Technical => StageId::Technical,
            SourceId::Sentiment => StageId::Sentiment,
            SourceId::Social => StageId::Social,
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated, acyclic stage graph with its execution levels
#[derive(Debug, Clone, PartialEq)]
pub struct StageGraph {
    dependencies: BTreeMap<StageId, Vec<StageId>>,
    levels: Vec<Vec<StageId>>,
}

impl StageGraph {
    /// Build from `(node, dependencies)` pairs.
    ///
    /// Rejects duplicate nodes, dependencies on unknown nodes and cycles.
    pub fn new(nodes: Vec<(StageId, Vec<StageId>)>) -> Result<Self, PipelineError> {
        let mut dependencies = BTreeMap::new();
        for (node, deps) in nodes {
            if dependencies.insert(node, deps).is_some() {
                return Err(PipelineError::InvalidGraph(format!("stage '{}' declared twice", node)));
            }
        }

        for (node, deps) in &dependencies {
            for dep in deps {
                if !dependencies.contains_key(dep) {
                    return Err(PipelineError::InvalidGraph(format!(
                        "stage '{}' depends on unknown stage '{}'",
                        node, dep
                    )));
                }
            }
        }

        let levels = Self::kahn_levels(&dependencies)?;
        Ok(Self { dependencies, levels })
    }

    /// `ingest -> {technical, sentiment, social} -> risk -> fuse`
    pub fn standard() -> Result<Self, PipelineError> {
        let branches = vec![StageId::Technical, StageId::Sentiment, StageId::Social];
        Self::new(vec![
            (StageId::Ingest, vec![]),
            (StageId::Technical, vec![StageId::Ingest]),
            (StageId::Sentiment, vec![StageId::Ingest]),
            (StageId::Social, vec![StageId::Ingest]),
            (StageId::Risk, branches),
            (StageId::Fuse, vec![StageId::Risk]),
        ])
    }

    // Kahn's algorithm, peeling one level of zero in-degree nodes at a time.
    fn kahn_levels(
        dependencies: &BTreeMap<StageId, Vec<StageId>>,
    ) -> Result<Vec<Vec<StageId>>, PipelineError> {
        let mut in_degree: BTreeMap<StageId, usize> = dependencies
            .iter()
            .map(|(node, deps)| (*node, deps.iter().collect::<BTreeSet<_>>().len()))
            .collect();

        let mut dependents: BTreeMap<StageId, Vec<StageId>> = BTreeMap::new();
        for (node, deps) in dependencies {
            for dep in deps.iter().collect::<BTreeSet<_>>() {
                dependents.entry(*dep).or_default().push(*node);
            }
        }

        let mut levels = Vec::new();
        let mut ready: Vec<StageId> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(node, _)| *node)
            .collect();
        let mut visited = 0;

        while !ready.is_empty() {
            visited += ready.len();
            let mut next = Vec::new();
            for node in &ready {
                for dependent in dependents.get(node).into_iter().flatten() {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree -= 1;
                        if *degree == 0 {
                            next.push(*dependent);
                        }
                    }
                }
            }
            next.sort();
            levels.push(std::mem::replace(&mut ready, next));
        }

        if visited != dependencies.len() {
            let stuck: Vec<&str> = in_degree
                .iter()
                .filter(|(_, degree)| **degree > 0)
                .map(|(node, _)| node.as_str())
                .collect();
            return Err(PipelineError::InvalidGraph(format!(
                "cycle among stages: {}",
                stuck.join(", ")
            )));
        }

        Ok(levels)
    }

    /// Sets of stages whose dependencies all sit in earlier levels
    pub fn levels(&self) -> &[Vec<StageId>] {
        &self.levels
    }

    pub fn dependencies(&self, stage: StageId) -> &[StageId] {
        self.dependencies.get(&stage).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, stage: StageId) -> bool {
        self.dependencies.contains_key(&stage)
    }

    /// Analysis branches that run concurrently right after ingest
    pub fn fan_out(&self) -> Vec<SourceId> {
        self.levels
            .iter()
            .flatten()
            .filter(|stage| self.dependencies(**stage) == [StageId::Ingest])
            .filter_map(|stage| stage.branch())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_levels() {
        let graph = StageGraph::standard().unwrap();
        assert_eq!(
            graph.levels(),
            &[
                vec![StageId::Ingest],
                vec![StageId::Technical, StageId::Sentiment, StageId::Social],
                vec![StageId::Risk],
                vec![StageId::Fuse],
            ]
        );
        assert_eq!(graph.fan_out(), SourceId::ANALYSIS.to_vec());
        assert_eq!(graph.dependencies(StageId::Fuse), &[StageId::Risk]);
    }

    #[test]
    fn test_cycle_rejected() {
        let result = StageGraph::new(vec![
            (StageId::Ingest, vec![]),
            (StageId::Risk, vec![StageId::Fuse]),
            (StageId::Fuse, vec![StageId::Risk]),
        ]);
        match result {
            Err(PipelineError::InvalidGraph(msg)) => assert!(msg.contains("cycle")),
            other => panic!("expected cycle error, got {:?}", other),
        }
    }

    #[test]
    fn test_self_dependency_rejected() {
        assert!(StageGraph::new(vec![(StageId::Ingest, vec![StageId::Ingest])]).is_err());
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let result = StageGraph::new(vec![(StageId::Fuse, vec![StageId::Risk])]);
        match result {
            Err(PipelineError::InvalidGraph(msg)) => assert!(msg.contains("unknown stage 'risk'")),
            other => panic!("expected unknown-stage error, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let result = StageGraph::new(vec![(StageId::Ingest, vec![]), (StageId::Ingest, vec![])]);
        assert!(matches!(result, Err(PipelineError::InvalidGraph(_))));
    }
}
