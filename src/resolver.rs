//! Foreign-key dependency ordering.
//!
//! Produces the order tables are loaded in: every table comes after the
//! tables it references. Cycles cannot be ordered, so the edge that closes a
//! cycle is dropped and reported back in [`OrderResult::dropped_edges`].

use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::warn;

use crate::table::Table;

/// `dependent` has a column referencing `referenced`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ForeignKeyEdge {
    pub dependent: Table,
    pub referenced: Table,
}

impl ForeignKeyEdge {
    pub fn new(dependent: Table, referenced: Table) -> Self {
        Self {
            dependent,
            referenced,
        }
    }

    pub fn is_self_reference(&self) -> bool {
        self.dependent == self.referenced
    }
}

impl fmt::Display for ForeignKeyEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.dependent, self.referenced)
    }
}

/// Copy order plus any edges that had to be ignored to produce it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OrderResult {
    pub order: Vec<Table>,
    pub dropped_edges: Vec<ForeignKeyEdge>,
}

impl OrderResult {
    /// True when the order is a valid topological order of the input graph.
    pub fn is_fk_safe(&self) -> bool {
        self.dropped_edges.is_empty()
    }

    pub fn position(&self, table: &Table) -> Option<usize> {
        self.order.iter().position(|t| t == table)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Table -> tables it depends on. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Tables in first-seen order
    tables: Vec<Table>,
    /// Dependencies in first-seen order, deduplicated, self-references removed
    dependencies: HashMap<Table, Vec<Table>>,
}

impl DependencyGraph {
    /// Builds the graph. Edges touching tables outside `tables` are ignored,
    /// as are self-references and duplicate edges.
    pub fn build(tables: &[Table], edges: &[ForeignKeyEdge]) -> Self {
        let mut seen = HashSet::new();
        let tables: Vec<Table> = tables
            .iter()
            .filter(|t| seen.insert((*t).clone()))
            .cloned()
            .collect();

        let mut dependencies: HashMap<Table, Vec<Table>> =
            tables.iter().map(|t| (t.clone(), Vec::new())).collect();
        for edge in edges {
            if edge.is_self_reference() || !seen.contains(&edge.referenced) {
                continue;
            }
            if let Some(deps) = dependencies.get_mut(&edge.dependent) {
                if !deps.contains(&edge.referenced) {
                    deps.push(edge.referenced.clone());
                }
            }
        }

        Self {
            tables,
            dependencies,
        }
    }

    pub fn dependencies_of(&self, table: &Table) -> &[Table] {
        self.dependencies
            .get(table)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn edge_count(&self) -> usize {
        self.dependencies.values().map(Vec::len).sum()
    }

    /// Depth-first topological sort. Every table is emitted exactly once.
    pub fn resolve(&self) -> OrderResult {
        let mut marks: HashMap<&Table, Mark> = HashMap::new();
        let mut result = OrderResult::default();
        for table in &self.tables {
            self.visit(table, &mut marks, &mut result);
        }
        for edge in &result.dropped_edges {
            warn!(edge = %edge, "Dependency cycle: ignoring foreign key for ordering");
        }
        result
    }

    fn visit<'a>(
        &'a self,
        table: &'a Table,
        marks: &mut HashMap<&'a Table, Mark>,
        result: &mut OrderResult,
    ) {
        if marks.contains_key(table) {
            return;
        }
        marks.insert(table, Mark::InProgress);
        for dep in self.dependencies_of(table) {
            if marks.get(dep) == Some(&Mark::InProgress) {
                result
                    .dropped_edges
                    .push(ForeignKeyEdge::new(table.clone(), dep.clone()));
                continue;
            }
            self.visit(dep, marks, result);
        }
        marks.insert(table, Mark::Done);
        result.order.push(table.clone());
    }
}

/// Convenience wrapper over [`DependencyGraph::build`] + [`DependencyGraph::resolve`].
pub fn resolve(tables: &[Table], edges: &[ForeignKeyEdge]) -> OrderResult {
    DependencyGraph::build(tables, edges).resolve()
}
