//! Wait-for graph
//!
//! An edge `a -> b` means the active task of resource `a` is suspended until
//! resource `b` drains. A cycle is a deadlock, so the edge that would close
//! one is refused.

use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

#[derive(Debug)]
pub(crate) struct WaitGraph<R> {
    graph: DiGraphMap<u32, ()>,
    ids: HashMap<R, u32>,
    names: Vec<R>,
}

impl<R: Clone + Eq + Hash> WaitGraph<R> {
    pub(crate) fn new() -> Self {
        Self {
            graph: DiGraphMap::new(),
            ids: HashMap::new(),
            names: Vec::new(),
        }
    }

    fn intern(&mut self, resource: &R) -> u32 {
        if let Some(id) = self.ids.get(resource) {
            return *id;
        }
        let id = u32::try_from(self.names.len()).unwrap_or(u32::MAX);
        self.ids.insert(resource.clone(), id);
        self.names.push(resource.clone());
        id
    }

    /// Record that `waiter` waits on `dep`
    ///
    /// On refusal returns the cycle the edge would close, starting and ending
    /// at `waiter`.
    pub(crate) fn add(&mut self, waiter: &R, dep: &R) -> Result<(), Vec<R>> {
        if waiter == dep {
            return Err(vec![waiter.clone(), dep.clone()]);
        }
        let from = self.intern(waiter);
        let to = self.intern(dep);
        if let Some(path) = self.path(to, from) {
            let mut cycle = vec![waiter.clone()];
            cycle.extend(path.into_iter().map(|id| self.names[id as usize].clone()));
            return Err(cycle);
        }
        self.graph.add_edge(from, to, ());
        Ok(())
    }

    /// Drop the edge `waiter -> dep`
    pub(crate) fn remove(&mut self, waiter: &R, dep: &R) {
        if let (Some(from), Some(to)) = (self.ids.get(waiter), self.ids.get(dep)) {
            self.graph.remove_edge(*from, *to);
        }
    }

    /// Drop every edge leaving `waiter`
    pub(crate) fn clear(&mut self, waiter: &R) {
        let Some(from) = self.ids.get(waiter).copied() else {
            return;
        };
        let targets: Vec<u32> = self
            .graph
            .neighbors_directed(from, Direction::Outgoing)
            .collect();
        for to in targets {
            self.graph.remove_edge(from, to);
        }
    }

    pub(crate) fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Shortest path `from ..= to` along existing edges
    fn path(&self, from: u32, to: u32) -> Option<Vec<u32>> {
        if !self.graph.contains_node(from) {
            return None;
        }
        let mut parent: HashMap<u32, u32> = HashMap::new();
        let mut queue = VecDeque::from([from]);
        while let Some(node) = queue.pop_front() {
            if node == to {
                let mut path = vec![to];
                let mut cur = to;
                while let Some(prev) = parent.get(&cur) {
                    path.push(*prev);
                    cur = *prev;
                }
                path.reverse();
                return Some(path);
            }
            for next in self.graph.neighbors_directed(node, Direction::Outgoing) {
                if next != from && !parent.contains_key(&next) {
                    parent.insert(next, node);
                    queue.push_back(next);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refuses_two_cycle() {
        let mut g = WaitGraph::new();
        g.add(&"a", &"b").unwrap();
        assert_eq!(g.add(&"b", &"a"), Err(vec!["b", "a", "b"]));
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn refuses_transitive_cycle() {
        let mut g = WaitGraph::new();
        g.add(&"a", &"b").unwrap();
        g.add(&"b", &"c").unwrap();
        assert_eq!(g.add(&"c", &"a"), Err(vec!["c", "a", "b", "c"]));
    }

    #[test]
    fn refuses_self_wait() {
        let mut g = WaitGraph::new();
        assert!(g.add(&"a", &"a").is_err());
    }

    #[test]
    fn removal_reopens_the_edge() {
        let mut g = WaitGraph::new();
        g.add(&"a", &"b").unwrap();
        g.remove(&"a", &"b");
        g.add(&"b", &"a").unwrap();
        g.clear(&"b");
        assert_eq!(g.edge_count(), 0);
    }
}
