// Copyright (c) 2025 - Cowboy AI, LLC.

//! Propagation & Routing Engine (C5)
//!
//! Computes, for an envelope currently at `from_agent`, the set of
//! `(target, forwarded_envelope)` pairs to deliver next. The same function
//! is used whether `from_agent` is the original publisher or an
//! intermediate hop re-broadcasting further along the tree — each hop
//! applies the same direction rule relative to its own position
//! (section 4.5.2/4.5.3).

use crate::envelope::{Direction, Envelope};
use crate::graph::AgentGraph;
use crate::value_objects::AgentId;

/// Default bounded-mailbox capacity per target (section 4.5.4).
pub const DEFAULT_MAILBOX_CAPACITY: usize = 1000;

/// Compute the next-hop deliveries for `envelope`, as forwarded by
/// `from_agent`. Applies the hop bound per target; targets that would
/// exceed `max_hop` are dropped rather than delivered.
pub fn forward(envelope: &Envelope, from_agent: AgentId, graph: &AgentGraph) -> Vec<(AgentId, Envelope)> {
    let (targets, next_direction) = targets_for(envelope, from_agent, graph);

    targets
        .into_iter()
        .filter_map(|target| {
            let forwarded = envelope.forwarded(from_agent, next_direction);
            if forwarded.exceeds_hop_bound() {
                None
            } else {
                Some((target, forwarded))
            }
        })
        .collect()
}

fn targets_for(envelope: &Envelope, from_agent: AgentId, graph: &AgentGraph) -> (Vec<AgentId>, Direction) {
    match envelope.direction {
        Direction::Up => (up_targets(from_agent, graph), Direction::Up),
        Direction::Down => (graph.get_children(from_agent), Direction::Down),
        Direction::Both => {
            let mut targets = up_targets(from_agent, graph);
            targets.extend(graph.get_children(from_agent));
            (targets, Direction::Both)
        }
        Direction::UpThenDown => {
            if envelope.current_hop == 0 {
                // Still on the way up: exactly the parent, marker preserved.
                let targets = graph.get_parent(from_agent).into_iter().collect();
                (targets, Direction::UpThenDown)
            } else {
                // Already made the up hop; now fan out down from here.
                (graph.get_children(from_agent), Direction::Down)
            }
        }
    }
}

fn up_targets(from_agent: AgentId, graph: &AgentGraph) -> Vec<AgentId> {
    let mut targets: Vec<AgentId> = graph.get_parent(from_agent).into_iter().collect();
    targets.extend(graph.get_siblings(from_agent));
    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{build, BuildOptions};

    #[derive(Clone, PartialEq, prost::Message)]
    struct Ping {}
    impl crate::envelope::Payload for Ping {
        const TYPE_NAME: &'static str = "test.v1.Ping";
    }

    fn envelope(publisher: AgentId, direction: Direction, max_hop: Option<i32>) -> Envelope {
        build(
            publisher,
            &Ping {},
            direction,
            BuildOptions {
                max_hop,
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn down_broadcast_reaches_all_children_but_not_publisher() {
        let graph = AgentGraph::new();
        let parent = AgentId::new();
        let c1 = AgentId::new();
        let c2 = AgentId::new();
        graph.set_parent(c1, parent).unwrap();
        graph.set_parent(c2, parent).unwrap();

        let e = envelope(parent, Direction::Down, None);
        let deliveries = forward(&e, parent, &graph);
        let targets: Vec<_> = deliveries.iter().map(|(t, _)| *t).collect();
        assert_eq!(targets.len(), 2);
        assert!(targets.contains(&c1));
        assert!(targets.contains(&c2));
        assert!(!targets.contains(&parent));
        for (_, env) in &deliveries {
            assert_eq!(env.publishers, vec![parent]);
        }
    }

    #[test]
    fn up_then_down_reaches_sibling_but_self_suppresses_initiator() {
        let graph = AgentGraph::new();
        let parent = AgentId::new();
        let c1 = AgentId::new();
        let c2 = AgentId::new();
        graph.set_parent(c1, parent).unwrap();
        graph.set_parent(c2, parent).unwrap();

        let e = envelope(c1, Direction::UpThenDown, None);
        let up_hop = forward(&e, c1, &graph);
        assert_eq!(up_hop.len(), 1);
        assert_eq!(up_hop[0].0, parent);
        assert_eq!(up_hop[0].1.direction, Direction::UpThenDown);

        let (_, at_parent) = &up_hop[0];
        let down_hop = forward(at_parent, parent, &graph);
        let targets: Vec<_> = down_hop.iter().map(|(t, _)| *t).collect();
        assert!(targets.contains(&c1));
        assert!(targets.contains(&c2));
        for (target, env) in &down_hop {
            assert_eq!(env.direction, Direction::Down);
            if *target == c1 {
                assert!(env.is_self_suppressed(c1));
            }
        }
    }

    #[test]
    fn hop_bound_stops_broadcast_at_grandchildren() {
        let graph = AgentGraph::new();
        let p = AgentId::new();
        let c = AgentId::new();
        let gc = AgentId::new();
        graph.set_parent(c, p).unwrap();
        graph.set_parent(gc, c).unwrap();

        let e = envelope(p, Direction::Down, Some(1));
        let first_hop = forward(&e, p, &graph);
        assert_eq!(first_hop.len(), 1);
        assert_eq!(first_hop[0].0, c);

        let (_, at_c) = &first_hop[0];
        let second_hop = forward(at_c, c, &graph);
        assert!(second_hop.is_empty());
    }

    #[test]
    fn zero_max_hop_up_still_delivers_to_parent_once() {
        let graph = AgentGraph::new();
        let grandparent = AgentId::new();
        let parent = AgentId::new();
        let child = AgentId::new();
        graph.set_parent(parent, grandparent).unwrap();
        graph.set_parent(child, parent).unwrap();

        let e = envelope(child, Direction::Up, Some(0));
        let first_hop = forward(&e, child, &graph);
        assert_eq!(first_hop.len(), 1);
        assert_eq!(first_hop[0].0, parent);

        let (_, at_parent) = &first_hop[0];
        let second_hop = forward(at_parent, parent, &graph);
        assert!(second_hop.is_empty());
    }

    #[test]
    fn empty_children_set_forwards_nothing() {
        let graph = AgentGraph::new();
        let leaf = AgentId::new();
        let e = envelope(leaf, Direction::Down, None);
        assert!(forward(&e, leaf, &graph).is_empty());
    }
}
