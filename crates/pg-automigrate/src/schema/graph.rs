//! Table dependency graph and cycle-tolerant creation order.

use crate::core::schema::TableDefinition;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Directed graph of table -> referenced tables.
///
/// Nodes keep insertion order, so the creation order is deterministic for a
/// given model declaration order. Self edges and duplicate edges are ignored.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<String>,
    index: HashMap<String, usize>,
    edges: Vec<Vec<usize>>,
}

/// Result of sorting: the order plus the edges dropped to break cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationOrder {
    pub tables: Vec<String>,
    pub broken_edges: Vec<(String, String)>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from classified tables. References to tables outside the set
    /// are ignored since they are not created by this pass.
    pub fn from_tables(tables: &[TableDefinition]) -> Self {
        let mut graph = Self::new();
        for table in tables {
            graph.add_table(&table.name);
        }
        for table in tables {
            for target in table.referenced_tables() {
                if graph.index.contains_key(target) {
                    graph.add_dependency(&table.name, target);
                }
            }
        }
        graph
    }

    /// Add a node, returning its index.
    pub fn add_table(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(name.to_string());
        self.index.insert(name.to_string(), idx);
        self.edges.push(Vec::new());
        idx
    }

    /// Record that `table` references `target`. Missing nodes are added.
    pub fn add_dependency(&mut self, table: &str, target: &str) {
        if table == target {
            return;
        }
        let from = self.add_table(table);
        let to = self.add_table(target);
        if !self.edges[from].contains(&to) {
            self.edges[from].push(to);
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.iter().map(Vec::len).sum()
    }

    /// Tables `table` depends on.
    pub fn dependencies(&self, table: &str) -> Vec<&str> {
        match self.index.get(table) {
            Some(&idx) => self.edges[idx]
                .iter()
                .map(|&d| self.nodes[d].as_str())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Referenced tables first. Every node appears exactly once; an edge that
    /// closes a cycle is dropped and reported in `broken_edges`.
    ///
    /// Iterative DFS with an explicit stack of (node, next edge) frames.
    pub fn creation_order(&self) -> CreationOrder {
        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        let mut tables = Vec::with_capacity(self.nodes.len());
        let mut broken_edges = Vec::new();
        let mut stack: Vec<(usize, usize)> = Vec::new();

        for root in 0..self.nodes.len() {
            if marks[root] != Mark::Unvisited {
                continue;
            }
            marks[root] = Mark::InProgress;
            stack.push((root, 0));

            while let Some(frame) = stack.last_mut() {
                let (node, next) = *frame;
                if let Some(&dep) = self.edges[node].get(next) {
                    frame.1 += 1;
                    match marks[dep] {
                        Mark::Unvisited => {
                            marks[dep] = Mark::InProgress;
                            stack.push((dep, 0));
                        }
                        Mark::InProgress => {
                            debug!(
                                "Cycle: dropping edge {} -> {}",
                                self.nodes[node], self.nodes[dep]
                            );
                            broken_edges
                                .push((self.nodes[node].clone(), self.nodes[dep].clone()));
                        }
                        Mark::Done => {}
                    }
                } else {
                    marks[node] = Mark::Done;
                    tables.push(self.nodes[node].clone());
                    stack.pop();
                }
            }
        }

        CreationOrder {
            tables,
            broken_edges,
        }
    }
}
