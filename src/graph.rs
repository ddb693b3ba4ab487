//! Component dependency graph.
//!
//! Vertices are component names (the entry included), an edge `A → B` means
//! `A`'s template instantiates `B`. Edge insertion rejects only the direct
//! mutual case: `A → B → C → A` is accepted.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use crate::error::CompilerError;

#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    /// Vertices in insertion order.
    vertices: Vec<String>,
    links: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_vertex(&mut self, name: &str) {
        if !self.links.contains_key(name) {
            self.vertices.push(name.to_string());
            self.links.insert(name.to_string(), Vec::new());
        }
    }

    /// Record that `from` uses `to`. Fails without touching the graph when
    /// `to` already uses `from`.
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<(), CompilerError> {
        if self.successors(to).iter().any(|name| name == from) {
            log::error!("`{}` and `{}` depend on each other", from, to);
            return Err(CompilerError::circular_dependency(from, to));
        }

        self.add_vertex(from);
        self.add_vertex(to);
        if let Some(list) = self.links.get_mut(from) {
            if !list.iter().any(|name| name == to) {
                list.push(to.to_string());
            }
        }
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.links.contains_key(name)
    }

    pub fn vertices(&self) -> impl Iterator<Item = &str> {
        self.vertices.iter().map(String::as_str)
    }

    /// Direct dependencies of `name`, in insertion order.
    pub fn successors(&self, name: &str) -> &[String] {
        self.links.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Breadth-first walk from `start`, calling `visit` once per reachable
    /// vertex (`start` first) in discovery order.
    pub fn traverse<F: FnMut(&str)>(&self, start: &str, mut visit: F) {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        visited.insert(start);
        queue.push_back(start);

        while let Some(vertex) = queue.pop_front() {
            visit(vertex);
            for next in self.successors(vertex) {
                if visited.insert(next.as_str()) {
                    queue.push_back(next.as_str());
                }
            }
        }
    }

    /// Everything reachable from `name`, excluding `name` itself.
    pub fn dependencies_of(&self, name: &str) -> Vec<String> {
        let mut found = Vec::new();
        self.traverse(name, |vertex| {
            if vertex != name {
                found.push(vertex.to_string());
            }
        });
        found
    }

    /// Transitive dependency set of every vertex.
    pub fn dependency_closure(&self) -> BTreeMap<String, Vec<String>> {
        self.vertices
            .iter()
            .map(|vertex| (vertex.clone(), self.dependencies_of(vertex)))
            .collect()
    }

    /// `entry` plus its direct and indirect dependencies.
    pub fn reachable_from(&self, entry: &str) -> BTreeSet<String> {
        let mut reachable = BTreeSet::new();
        self.traverse(entry, |vertex| {
            reachable.insert(vertex.to_string());
        });
        reachable
    }

    /// Declared components the entry never reaches, in declaration order.
    pub fn unused<'a, I>(&self, declared: I, entry: &str) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let reachable = self.reachable_from(entry);
        declared
            .into_iter()
            .filter(|name| !reachable.contains(*name))
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ERR_CIRCULAR_DEPENDENCY;

    #[test]
    fn test_mutual_edge_is_rejected_without_mutation() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("A", "B").unwrap();
        let err = graph.add_edge("B", "A").unwrap_err();
        assert_eq!(err.code, ERR_CIRCULAR_DEPENDENCY);
        assert!(graph.successors("B").is_empty());
        assert_eq!(graph.successors("A"), ["B".to_string()]);
    }

    #[test]
    fn test_longer_cycle_is_not_detected() {
        // only direct two-node cycles are checked
        let mut graph = DependencyGraph::new();
        graph.add_edge("A", "B").unwrap();
        graph.add_edge("B", "C").unwrap();
        assert!(graph.add_edge("C", "A").is_ok());
        assert_eq!(graph.dependencies_of("A"), vec!["B", "C"]);
    }

    #[test]
    fn test_self_usage_is_accepted_once() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("Card", "Card").unwrap();
        assert_eq!(graph.successors("Card"), ["Card".to_string()]);
        assert!(graph.dependencies_of("Card").is_empty());

        // the recorded self edge now fails the mutual check
        let err = graph.add_edge("Card", "Card").unwrap_err();
        assert_eq!(err.code, ERR_CIRCULAR_DEPENDENCY);
        assert_eq!(graph.successors("Card").len(), 1);
    }

    #[test]
    fn test_traverse_is_breadth_first() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("$enter", "Header").unwrap();
        graph.add_edge("$enter", "List").unwrap();
        graph.add_edge("Header", "Icon").unwrap();
        graph.add_edge("List", "Row").unwrap();
        graph.add_edge("Row", "Icon").unwrap();

        let mut order = Vec::new();
        graph.traverse("$enter", |v| order.push(v.to_string()));
        assert_eq!(order, vec!["$enter", "Header", "List", "Icon", "Row"]);

        // visited state does not leak between calls
        let mut again = Vec::new();
        graph.traverse("List", |v| again.push(v.to_string()));
        assert_eq!(again, vec!["List", "Row", "Icon"]);
    }

    #[test]
    fn test_closure_and_unused() {
        let mut graph = DependencyGraph::new();
        graph.add_vertex("$enter");
        graph.add_vertex("Orphan");
        graph.add_vertex("Leaf");
        graph.add_edge("$enter", "Card").unwrap();
        graph.add_edge("Card", "Avatar").unwrap();
        graph.add_edge("Orphan", "Leaf").unwrap();

        let closure = graph.dependency_closure();
        assert_eq!(closure["$enter"], vec!["Card", "Avatar"]);
        assert_eq!(closure["Card"], vec!["Avatar"]);
        assert!(closure["Avatar"].is_empty());

        let reachable = graph.reachable_from("$enter");
        assert!(reachable.contains("$enter"));
        assert!(reachable.contains("Avatar"));

        let unused = graph.unused(["Card", "Avatar", "Orphan", "Leaf"], "$enter");
        assert_eq!(unused, vec!["Orphan", "Leaf"]);
    }

    #[test]
    fn test_duplicate_edges_collapse() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("A", "B").unwrap();
        graph.add_edge("A", "B").unwrap();
        assert_eq!(graph.successors("A").len(), 1);
        assert_eq!(graph.vertices().collect::<Vec<_>>(), vec!["A", "B"]);
    }
}
