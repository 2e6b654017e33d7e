//! key: health-graph
//! Dependency graph of monitored nodes and the KPI/status transitions that
//! drive the rest of the pipeline. Single writer, snapshot reads.

use std::collections::{HashMap, HashSet, VecDeque};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::{GraceError, GraceResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Healthy,
    Degraded,
    Critical,
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Direction {
    Dependencies,
    Dependents,
}

/// `{node_id, node_type, name, status, kpis, dependencies, dependents,
/// blast_radius, priority}`. `blast_radius` is cached and invalidated on
/// any edge change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthNode {
    pub node_id: String,
    pub node_type: String,
    pub name: String,
    pub status: NodeStatus,
    pub kpis: HashMap<String, f64>,
    pub dependencies: HashSet<String>,
    pub dependents: HashSet<String>,
    pub priority: i32,
    #[serde(skip)]
    cached_blast_radius: Option<u64>,
}

impl HealthNode {
    pub fn new(node_id: impl Into<String>, node_type: impl Into<String>, name: impl Into<String>, priority: i32) -> Self {
        Self {
            node_id: node_id.into(),
            node_type: node_type.into(),
            name: name.into(),
            status: NodeStatus::Unknown,
            kpis: HashMap::new(),
            dependencies: HashSet::new(),
            dependents: HashSet::new(),
            priority,
            cached_blast_radius: None,
        }
    }
}

#[derive(Default)]
pub struct HealthGraph {
    nodes: DashMap<String, HealthNode>,
}

impl HealthGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_node(&self, node: HealthNode) {
        self.nodes.insert(node.node_id.clone(), node);
    }

    /// Declares `node_id` depends on `depends_on`. Rejects self-loops per
    /// the data model invariant; maintains the `dependents` inverse edge.
    pub fn add_dependency(&self, node_id: &str, depends_on: &str) -> GraceResult<()> {
        if node_id == depends_on {
            return Err(GraceError::Validation("a node cannot depend on itself".into()));
        }
        {
            let mut node = self
                .nodes
                .get_mut(node_id)
                .ok_or_else(|| GraceError::NotFound(format!("node {node_id}")))?;
            node.dependencies.insert(depends_on.to_string());
            node.cached_blast_radius = None;
        }
        {
            let mut dep = self
                .nodes
                .get_mut(depends_on)
                .ok_or_else(|| GraceError::NotFound(format!("node {depends_on}")))?;
            dep.dependents.insert(node_id.to_string());
            dep.cached_blast_radius = None;
        }
        Ok(())
    }

    pub fn update_health(
        &self,
        node_id: &str,
        status: NodeStatus,
        kpi_deltas: HashMap<String, f64>,
    ) -> GraceResult<()> {
        let mut node = self
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| GraceError::NotFound(format!("node {node_id}")))?;
        node.status = status;
        for (kpi, delta) in kpi_deltas {
            *node.kpis.entry(kpi).or_insert(0.0) += delta;
        }
        Ok(())
    }

    pub fn get(&self, node_id: &str) -> Option<HealthNode> {
        self.nodes.get(node_id).map(|n| n.clone())
    }

    pub fn all_node_ids(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.node_id.clone()).collect()
    }

    pub fn neighbors(&self, node_id: &str, direction: Direction) -> Vec<String> {
        self.nodes
            .get(node_id)
            .map(|n| match direction {
                Direction::Dependencies => n.dependencies.iter().cloned().collect(),
                Direction::Dependents => n.dependents.iter().cloned().collect(),
            })
            .unwrap_or_default()
    }

    /// Upper bound on transitive dependents, cached on the node and
    /// recomputed via BFS when invalidated by an edge change.
    pub fn blast_radius(&self, node_id: &str) -> u64 {
        if let Some(node) = self.nodes.get(node_id) {
            if let Some(cached) = node.cached_blast_radius {
                return cached;
            }
        }

        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        queue.push_back(node_id.to_string());
        visited.insert(node_id.to_string());

        while let Some(current) = queue.pop_front() {
            let dependents = self
                .nodes
                .get(&current)
                .map(|n| n.dependents.iter().cloned().collect::<Vec<_>>())
                .unwrap_or_default();
            for dependent in dependents {
                if visited.insert(dependent.clone()) {
                    queue.push_back(dependent);
                }
            }
        }

        let radius = (visited.len().saturating_sub(1)) as u64;
        if let Some(mut node) = self.nodes.get_mut(node_id) {
            node.cached_blast_radius = Some(radius);
        }
        radius
    }

    /// Dependency chain up to `depth` hops, used by Enrichment for context.
    pub fn dependency_chain(&self, node_id: &str, depth: usize) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut frontier = vec![node_id.to_string()];
        let mut chain = Vec::new();
        for _ in 0..depth {
            let mut next = Vec::new();
            for id in &frontier {
                for dep in self.neighbors(id, Direction::Dependencies) {
                    if visited.insert(dep.clone()) {
                        chain.push(dep.clone());
                        next.push(dep);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_loop_rejected() {
        let graph = HealthGraph::new();
        graph.register_node(HealthNode::new("a", "service", "A", 1));
        assert!(graph.add_dependency("a", "a").is_err());
    }

    #[test]
    fn blast_radius_counts_transitive_dependents() {
        let graph = HealthGraph::new();
        graph.register_node(HealthNode::new("db", "database", "DB", 5));
        graph.register_node(HealthNode::new("api", "service", "API", 3));
        graph.register_node(HealthNode::new("web", "service", "Web", 1));
        graph.add_dependency("api", "db").unwrap();
        graph.add_dependency("web", "api").unwrap();

        assert_eq!(graph.blast_radius("db"), 2);
        assert_eq!(graph.blast_radius("api"), 1);
        assert_eq!(graph.blast_radius("web"), 0);
    }

    #[test]
    fn blast_radius_cache_invalidated_on_new_edge() {
        let graph = HealthGraph::new();
        graph.register_node(HealthNode::new("db", "database", "DB", 5));
        graph.register_node(HealthNode::new("api", "service", "API", 3));
        assert_eq!(graph.blast_radius("db"), 0);
        graph.add_dependency("api", "db").unwrap();
        assert_eq!(graph.blast_radius("db"), 1);
    }

    #[test]
    fn dependents_inverse_is_maintained() {
        let graph = HealthGraph::new();
        graph.register_node(HealthNode::new("db", "database", "DB", 5));
        graph.register_node(HealthNode::new("api", "service", "API", 3));
        graph.add_dependency("api", "db").unwrap();
        assert!(graph.neighbors("db", Direction::Dependents).contains(&"api".to_string()));
        assert!(graph.neighbors("api", Direction::Dependencies).contains(&"db".to_string()));
    }
}
