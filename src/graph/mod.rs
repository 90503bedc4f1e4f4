// Copyright (c) 2025 - Cowboy AI, LLC.

//! Parent/child agent graph (section 4.5.1)
//!
//! Each agent has at most one parent and arbitrarily many children.
//! `set_parent` walks the prospective parent's ancestors to reject
//! self-parenting and cycles before committing (design notes,
//! "cycle prevention in the agent graph").

use crate::error::{KernelError, KernelResult};
use crate::value_objects::AgentId;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

#[derive(Debug, Default)]
struct Edges {
    parent: Option<AgentId>,
    children: HashSet<AgentId>,
}

/// Concurrent parent/child graph shared by every actor in a process.
#[derive(Debug, Default)]
pub struct AgentGraph {
    edges: RwLock<HashMap<AgentId, Edges>>,
}

impl AgentGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `child`'s parent to `parent`, registering `child` in `parent`'s
    /// children set. Rejects self-parenting and any cycle.
    pub fn set_parent(&self, child: AgentId, parent: AgentId) -> KernelResult<()> {
        if child == parent {
            return Err(KernelError::InvalidGraph(format!(
                "agent {child} cannot be its own parent"
            )));
        }

        let mut edges = self.edges.write().unwrap();
        if Self::is_ancestor(&edges, parent, child) {
            return Err(KernelError::InvalidGraph(format!(
                "setting {parent} as parent of {child} would introduce a cycle"
            )));
        }

        if let Some(old_parent) = edges.entry(child).or_default().parent {
            edges.entry(old_parent).or_default().children.remove(&child);
        }
        edges.entry(child).or_default().parent = Some(parent);
        edges.entry(parent).or_default().children.insert(child);
        Ok(())
    }

    /// Walk `candidate`'s ancestors; true if `target` appears among them
    /// (or `candidate == target`).
    fn is_ancestor(edges: &HashMap<AgentId, Edges>, candidate: AgentId, target: AgentId) -> bool {
        let mut current = Some(candidate);
        while let Some(id) = current {
            if id == target {
                return true;
            }
            current = edges.get(&id).and_then(|e| e.parent);
        }
        false
    }

    pub fn get_parent(&self, agent_id: AgentId) -> Option<AgentId> {
        self.edges.read().unwrap().get(&agent_id).and_then(|e| e.parent)
    }

    pub fn get_children(&self, agent_id: AgentId) -> Vec<AgentId> {
        self.edges
            .read()
            .unwrap()
            .get(&agent_id)
            .map(|e| e.children.iter().copied().collect())
            .unwrap_or_default()
    }

    /// The parent's other children, excluding `agent_id` itself. Empty if
    /// `agent_id` has no parent.
    pub fn get_siblings(&self, agent_id: AgentId) -> Vec<AgentId> {
        let Some(parent) = self.get_parent(agent_id) else {
            return Vec::new();
        };
        self.get_children(parent)
            .into_iter()
            .filter(|&id| id != agent_id)
            .collect()
    }

    /// Drop all edges touching `agent_id` (used by the Manager on removal).
    pub fn remove(&self, agent_id: AgentId) {
        let mut edges = self.edges.write().unwrap();
        if let Some(removed) = edges.remove(&agent_id) {
            if let Some(parent) = removed.parent {
                edges.entry(parent).or_default().children.remove(&agent_id);
            }
            for child in removed.children {
                if let Some(child_edges) = edges.get_mut(&child) {
                    child_edges.parent = None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_parent_registers_child_in_parent_children() {
        let graph = AgentGraph::new();
        let parent = AgentId::new();
        let child = AgentId::new();
        graph.set_parent(child, parent).unwrap();
        assert_eq!(graph.get_parent(child), Some(parent));
        assert_eq!(graph.get_children(parent), vec![child]);
    }

    #[test]
    fn self_parenting_is_rejected() {
        let graph = AgentGraph::new();
        let a = AgentId::new();
        assert!(matches!(graph.set_parent(a, a), Err(KernelError::InvalidGraph(_))));
    }

    #[test]
    fn cycle_introduction_is_rejected() {
        let graph = AgentGraph::new();
        let a = AgentId::new();
        let b = AgentId::new();
        graph.set_parent(b, a).unwrap(); // a is parent of b
        let result = graph.set_parent(a, b); // b cannot become parent of a
        assert!(matches!(result, Err(KernelError::InvalidGraph(_))));
    }

    #[test]
    fn siblings_excludes_self_and_requires_shared_parent() {
        let graph = AgentGraph::new();
        let parent = AgentId::new();
        let c1 = AgentId::new();
        let c2 = AgentId::new();
        graph.set_parent(c1, parent).unwrap();
        graph.set_parent(c2, parent).unwrap();
        let siblings = graph.get_siblings(c1);
        assert_eq!(siblings, vec![c2]);
    }

    #[test]
    fn agent_without_parent_has_no_siblings() {
        let graph = AgentGraph::new();
        assert!(graph.get_siblings(AgentId::new()).is_empty());
    }

    #[test]
    fn remove_detaches_from_parent_and_orphans_children() {
        let graph = AgentGraph::new();
        let grandparent = AgentId::new();
        let parent = AgentId::new();
        let child = AgentId::new();
        graph.set_parent(parent, grandparent).unwrap();
        graph.set_parent(child, parent).unwrap();
        graph.remove(parent);
        assert!(graph.get_children(grandparent).is_empty());
        assert_eq!(graph.get_parent(child), None);
    }
}
