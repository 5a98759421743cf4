//! The directed foreign-key dependency graph: an edge `A -> B` means "A has a
//! foreign key into B", i.e. B must exist before A. Built on `petgraph::graph::DiGraph`,
//! the same crate the teacher uses for its own object-dependency graphs, though here
//! it drives insertion order instead of migration ordering.

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, BTreeSet};

use crate::catalog::{Catalog, TableRef};

#[derive(Clone)]
pub struct DependencyGraph {
    graph: DiGraph<TableRef, String>,
    index_of: BTreeMap<TableRef, NodeIndex>,
}

impl DependencyGraph {
    /// Build the graph for `tables` (or every table in the catalog if `None`). FKs
    /// whose referent is outside the set, or whose referent lives in another schema,
    /// are silently dropped (spec §4.2/§3).
    pub fn build(catalog: &Catalog, tables: Option<&[TableRef]>) -> Self {
        let include: BTreeSet<&str> = match tables {
            Some(t) => t.iter().map(String::as_str).collect(),
            None => catalog.tables.iter().map(|t| t.name.as_str()).collect(),
        };

        let mut graph = DiGraph::new();
        let mut index_of = BTreeMap::new();
        for name in &include {
            let idx = graph.add_node((*name).to_string());
            index_of.insert((*name).to_string(), idx);
        }

        for table in &catalog.tables {
            if !include.contains(table.name.as_str()) {
                continue;
            }
            for fk in &table.foreign_keys {
                if fk.referred_schema != catalog.schema {
                    continue;
                }
                if !include.contains(fk.referred_table.as_str()) {
                    continue;
                }
                let a = index_of[&table.name];
                let b = index_of[&fk.referred_table];
                graph.add_edge(a, b, fk.name.clone());
            }
        }

        Self { graph, index_of }
    }

    pub fn tables(&self) -> Vec<TableRef> {
        self.index_of.keys().cloned().collect()
    }

    fn name(&self, idx: NodeIndex) -> TableRef {
        self.graph[idx].clone()
    }

    /// Every simple cycle in the graph, self-loops included as length-1 cycles.
    /// DFS-based enumeration; adequate for the table-count scale this tool operates at.
    pub fn simple_cycles(&self) -> Vec<Vec<TableRef>> {
        let mut cycles = Vec::new();
        let mut seen = BTreeSet::new();

        for idx in self.graph.node_indices() {
            for edge in self.graph.edges(idx) {
                if edge.target() == idx {
                    cycles.push(vec![self.name(idx)]);
                }
            }
        }

        for start in self.graph.node_indices() {
            let mut stack = vec![(start, vec![start], BTreeSet::from([start]))];
            while let Some((node, path, on_path)) = stack.pop() {
                for edge in self.graph.edges(node) {
                    let target = edge.target();
                    if target == start && path.len() > 1 {
                        let mut sorted_key: Vec<TableRef> =
                            path.iter().map(|&i| self.name(i)).collect();
                        sorted_key.sort();
                        if seen.insert(sorted_key) {
                            cycles.push(path.iter().map(|&i| self.name(i)).collect());
                        }
                    } else if !on_path.contains(&target) {
                        let mut new_path = path.clone();
                        new_path.push(target);
                        let mut new_on_path = on_path.clone();
                        new_on_path.insert(target);
                        stack.push((target, new_path, new_on_path));
                    }
                }
            }
        }

        cycles
    }

    /// A cycle-broken copy plus the edges removed to make it (best-effort: an acyclic
    /// copy is guaranteed only when cycles are simple and pairwise edge-disjoint after
    /// sorting, per spec §4.2/§9). Deterministic: cycles and their members are sorted,
    /// then `cycle[0] -> cycle[last]` is removed from each.
    pub fn break_cycles(&self) -> (DependencyGraph, Vec<(TableRef, TableRef)>) {
        let mut cycles = self.simple_cycles();
        for cycle in &mut cycles {
            cycle.sort();
        }
        cycles.sort();

        let mut graph = self.graph.clone();
        let mut removed = Vec::new();

        for cycle in &cycles {
            let first = &cycle[0];
            let last = cycle.last().unwrap();
            let first_idx = self.index_of[first];
            let last_idx = self.index_of[last];
            if let Some(edge) = graph.find_edge(first_idx, last_idx) {
                graph.remove_edge(edge);
                removed.push((first.clone(), last.clone()));
            }
        }

        (
            DependencyGraph {
                graph,
                index_of: self.index_of.clone(),
            },
            removed,
        )
    }

    /// Topological order of the cycle-broken graph, referents before referrers, ties
    /// broken lexicographically for determinism (spec §4.2).
    pub fn insertion_order(&self) -> Vec<TableRef> {
        let (broken, _) = self.break_cycles();
        broken.topological_referents_first()
    }

    fn topological_referents_first(&self) -> Vec<TableRef> {
        let mut out_degree: BTreeMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|i| (i, self.graph.edges(i).count()))
            .collect();

        let mut ready: BTreeSet<TableRef> = out_degree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(&i, _)| self.name(i))
            .collect();

        let mut emitted: BTreeSet<NodeIndex> = BTreeSet::new();
        let mut result = Vec::new();

        while let Some(name) = ready.iter().next().cloned() {
            ready.remove(&name);
            let idx = self.index_of[&name];
            emitted.insert(idx);
            result.push(name);

            for edge in self.graph.edges_directed(idx, Direction::Incoming) {
                let pred = edge.source();
                if emitted.contains(&pred) {
                    continue;
                }
                let d = out_degree.get_mut(&pred).unwrap();
                *d -= 1;
                if *d == 0 {
                    ready.insert(self.name(pred));
                }
            }
        }

        // Best-effort: a surviving cycle (break_cycles couldn't remove every offending
        // edge) leaves some nodes un-emitted. Append them in lexicographic order rather
        // than silently dropping tables from the order.
        let mut remaining: Vec<TableRef> = self
            .graph
            .node_indices()
            .filter(|i| !emitted.contains(i))
            .map(|i| self.name(i))
            .collect();
        remaining.sort();
        result.extend(remaining);

        result
    }

    /// DFS closure of referents reachable from `seeds`; seeds are included (spec §4.2
    /// "all_dependents").
    pub fn all_dependents(&self, seeds: &[TableRef]) -> BTreeSet<TableRef> {
        let mut result: BTreeSet<TableRef> = seeds.iter().cloned().collect();
        let mut stack: Vec<NodeIndex> = seeds
            .iter()
            .filter_map(|s| self.index_of.get(s).copied())
            .collect();

        while let Some(node) = stack.pop() {
            for edge in self.graph.edges(node) {
                let target = edge.target();
                let name = self.name(target);
                if result.insert(name) {
                    stack.push(target);
                }
            }
        }

        result
    }

    /// Every edge as `(referrer, referent, fk_name)`, for `inspect --export-graph`'s
    /// dot output.
    pub fn edges(&self) -> Vec<(TableRef, TableRef, String)> {
        self.graph
            .edge_indices()
            .filter_map(|e| {
                let (a, b) = self.graph.edge_endpoints(e)?;
                Some((self.name(a), self.name(b), self.graph[e].clone()))
            })
            .collect()
    }

    /// Connected components of the undirected projection (supplemented `inspect
    /// --partition` feature, grounded on `print_partition_info`).
    pub fn partitions(&self) -> Vec<BTreeSet<TableRef>> {
        let mut undirected_adjacency: BTreeMap<NodeIndex, BTreeSet<NodeIndex>> = BTreeMap::new();
        for idx in self.graph.node_indices() {
            undirected_adjacency.entry(idx).or_default();
        }
        for edge in self.graph.edge_indices() {
            if let Some((a, b)) = self.graph.edge_endpoints(edge) {
                undirected_adjacency.entry(a).or_default().insert(b);
                undirected_adjacency.entry(b).or_default().insert(a);
            }
        }

        let mut visited = BTreeSet::new();
        let mut components = Vec::new();
        for &start in undirected_adjacency.keys() {
            if visited.contains(&start) {
                continue;
            }
            let mut component = BTreeSet::new();
            let mut stack = vec![start];
            while let Some(node) = stack.pop() {
                if !visited.insert(node) {
                    continue;
                }
                component.insert(self.name(node));
                for &neighbor in &undirected_adjacency[&node] {
                    if !visited.contains(&neighbor) {
                        stack.push(neighbor);
                    }
                }
            }
            components.push(component);
        }

        components
    }
}
