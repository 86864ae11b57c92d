//! Chain scheduling: linearize a DAG into parallel chains.
//!
//! A chain is a run of nodes executed back to back on one queue. The walk
//! starts a new chain at every branch point and at every join, and records
//! for each chain head which cross-chain producers it must wait on. Chain 0
//! is special: the runtime places it on the launch queue instead of a
//! plan-owned queue.

use std::collections::{HashMap, HashSet};

use lattice_core::log_debug;
use lattice_core::types::NodeId;

use crate::graph::Graph;
use crate::node::NodeOp;

/// The schedule of one graph: chains plus cross-chain dependencies.
#[derive(Debug, Default)]
pub struct RunList {
    /// Chains in discovery order; nodes within a chain run back to back.
    pub chains: Vec<Vec<NodeId>>,
    /// For each chain head, the producers in other chains it waits on.
    /// Nodes that only follow their chain predecessor have no entry.
    pub waits: HashMap<NodeId, Vec<NodeId>>,
}

/// Walk the graph depth-first from its roots and group nodes into chains.
///
/// A node continues its parent's chain only if it has a single dependency
/// and the parent's chain has not already been extended; every other node
/// starts a new chain and waits on all of its dependencies. A node with
/// several dependencies is visited from its last-visited dependency, so
/// every producer always lands in an earlier chain than its consumer.
pub fn build_run_list(graph: &Graph) -> RunList {
    let mut list = RunList::default();
    let mut visited = HashSet::new();
    for root in graph.root_nodes() {
        if !visited.contains(&root) {
            let chain = list.chains.len();
            list.chains.push(Vec::new());
            visit(graph, root, chain, &mut list, &mut visited);
        }
    }
    log_debug!(
        "graph::sched",
        nodes = graph.node_count(),
        chains = list.chains.len(),
        "Built run list"
    );
    list
}

fn visit(
    graph: &Graph,
    id: NodeId,
    chain: usize,
    list: &mut RunList,
    visited: &mut HashSet<NodeId>,
) {
    visited.insert(id);
    list.chains[chain].push(id);

    let node = match graph.node(id) {
        Ok(node) => node,
        Err(_) => return,
    };
    let mut extended = false;
    for &child in node.dependents() {
        if visited.contains(&child) {
            continue;
        }
        let child_node = match graph.node(child) {
            Ok(node) => node,
            Err(_) => continue,
        };
        let ready = child_node
            .dependencies()
            .iter()
            .all(|dep| visited.contains(dep));
        if !ready {
            continue;
        }
        if child_node.in_degree() == 1 && !extended {
            extended = true;
            visit(graph, child, chain, list, visited);
        } else {
            let next = list.chains.len();
            list.chains.push(Vec::new());
            list.waits
                .insert(child, child_node.dependencies().to_vec());
            visit(graph, child, next, list, visited);
        }
    }
}

/// How many plan-owned queues a graph needs.
///
/// The first chain reuses the queue the plan is launched on (or the parent
/// node's queue for a nested graph), so a graph of `n` chains needs `n - 1`
/// of its own, plus whatever its nested graphs need.
pub fn queue_demand(graph: &Graph) -> usize {
    let list = build_run_list(graph);
    let mut demand = list.chains.len().saturating_sub(1);
    for &id in graph.node_ids() {
        if let Ok(node) = graph.node(id) {
            if let NodeOp::ChildGraph(sub) = node.op() {
                demand += queue_demand(sub);
            }
        }
    }
    demand
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;

    fn empty(graph: &mut Graph) -> NodeId {
        graph.add_node(NodeOp::Empty)
    }

    #[test]
    fn test_branch_splits_into_two_chains() {
        let mut g = Graph::new();
        let k1 = empty(&mut g);
        let k2 = empty(&mut g);
        let k3 = empty(&mut g);
        g.add_edge(k1, k2).expect("k1->k2");
        g.add_edge(k1, k3).expect("k1->k3");

        let list = build_run_list(&g);
        assert_eq!(list.chains, vec![vec![k1, k2], vec![k3]]);
        assert_eq!(list.waits.get(&k3), Some(&vec![k1]));
        assert!(!list.waits.contains_key(&k2));
        assert_eq!(queue_demand(&g), 1);
    }

    #[test]
    fn test_linear_chain_needs_no_extra_queue() {
        let mut g = Graph::new();
        let a = empty(&mut g);
        let b = empty(&mut g);
        let c = empty(&mut g);
        g.add_edge(a, b).expect("a->b");
        g.add_edge(b, c).expect("b->c");

        let list = build_run_list(&g);
        assert_eq!(list.chains, vec![vec![a, b, c]]);
        assert!(list.waits.is_empty());
        assert_eq!(queue_demand(&g), 0);
    }

    #[test]
    fn test_diamond_join_starts_a_new_chain() {
        let mut g = Graph::new();
        let a = empty(&mut g);
        let b = empty(&mut g);
        let c = empty(&mut g);
        let d = empty(&mut g);
        g.add_edge(a, b).expect("a->b");
        g.add_edge(a, c).expect("a->c");
        g.add_edge(b, d).expect("b->d");
        g.add_edge(c, d).expect("c->d");

        let list = build_run_list(&g);
        assert_eq!(list.chains, vec![vec![a, b], vec![c], vec![d]]);
        assert_eq!(list.waits.get(&c), Some(&vec![a]));
        assert_eq!(list.waits.get(&d), Some(&vec![b, c]));
    }

    #[test]
    fn test_independent_roots_get_separate_chains() {
        let mut g = Graph::new();
        let a = empty(&mut g);
        let b = empty(&mut g);
        let c = empty(&mut g);
        g.add_edge(a, c).expect("a->c");

        let list = build_run_list(&g);
        assert_eq!(list.chains, vec![vec![a, c], vec![b]]);
        // A root head has no cross-chain producers.
        assert!(!list.waits.contains_key(&b));
    }

    #[test]
    fn test_producers_precede_consumers_across_chains() {
        let mut g = Graph::new();
        let a = empty(&mut g);
        let b = empty(&mut g);
        let c = empty(&mut g);
        let d = empty(&mut g);
        let e = empty(&mut g);
        g.add_edge(a, b).expect("a->b");
        g.add_edge(a, c).expect("a->c");
        g.add_edge(b, d).expect("b->d");
        g.add_edge(c, d).expect("c->d");
        g.add_edge(c, e).expect("c->e");

        let list = build_run_list(&g);
        let position: HashMap<NodeId, usize> = list
            .chains
            .iter()
            .enumerate()
            .flat_map(|(i, chain)| chain.iter().map(move |&n| (n, i)))
            .collect();
        for (head, producers) in &list.waits {
            for producer in producers {
                assert!(
                    position[producer] < position[head],
                    "producer {producer} must be in an earlier chain than {head}"
                );
            }
        }
    }

    #[test]
    fn test_queue_demand_includes_nested_graphs() {
        let mut inner = Graph::new();
        let r = empty(&mut inner);
        let x = empty(&mut inner);
        let y = empty(&mut inner);
        inner.add_edge(r, x).expect("r->x");
        inner.add_edge(r, y).expect("r->y");
        assert_eq!(queue_demand(&inner), 1);

        let mut outer = Graph::new();
        let a = empty(&mut outer);
        let child = outer.add_node(NodeOp::ChildGraph(inner));
        let b = empty(&mut outer);
        outer.add_edge(a, child).expect("a->child");
        outer.add_edge(a, b).expect("a->b");
        // One extra chain in the outer graph plus one inside the child.
        assert_eq!(queue_demand(&outer), 2);
    }
}
