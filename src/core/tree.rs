//! Dependency tree visualization
//!
//! Renders a crate graph as a text tree or in DOT format, annotating every
//! local crate with the layer it is built in.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use crate::core::graph::CrateGraph;
use crate::core::planner::{crate_depths, BuildLayer};

/// Kind of a dependency edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyType {
    /// Edge to a crate built by a layer
    Local,
    /// Edge to a crate resolved by the build tool
    External,
}

impl std::fmt::Display for DependencyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::External => write!(f, "external"),
        }
    }
}

/// A dependency edge in the tree
#[derive(Debug, Clone)]
pub struct DependencyEdge {
    /// Target crate name
    pub target: String,
    pub dep_type: DependencyType,
}

/// Dependency tree of a crate graph
#[derive(Debug, Default)]
pub struct DependencyTree {
    root: String,
    dependencies: BTreeMap<String, Vec<DependencyEdge>>,
    /// Layer index of each local crate
    layers: BTreeMap<String, usize>,
    crates: BTreeSet<String>,
}

impl DependencyTree {
    /// Build the tree of a graph
    pub fn from_graph(graph: &CrateGraph) -> Self {
        let mut tree = Self {
            root: graph.root_name().to_string(),
            layers: crate_depths(graph),
            ..Self::default()
        };

        for node in graph.nodes() {
            tree.crates.insert(node.name().to_string());
            let edges = graph
                .dependencies_of(node.name())
                .into_iter()
                .map(|dep| DependencyEdge {
                    target: dep.name.clone(),
                    dep_type: if dep.is_local() {
                        DependencyType::Local
                    } else {
                        DependencyType::External
                    },
                })
                .collect();
            tree.dependencies.insert(node.name().to_string(), edges);
        }

        tree
    }

    /// Use explicit layers instead of recomputing depths
    #[must_use]
    pub fn with_layers(mut self, layers: &[BuildLayer]) -> Self {
        self.layers = layers
            .iter()
            .flat_map(|l| l.crates.iter().map(move |k| (k.name.clone(), l.index)))
            .collect();
        self
    }

    /// Root crate name
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Dependencies of a crate
    pub fn dependencies(&self, krate: &str) -> Option<&Vec<DependencyEdge>> {
        self.dependencies.get(krate)
    }

    /// Layer a local crate is built in
    pub fn layer_of(&self, krate: &str) -> Option<usize> {
        self.layers.get(krate).copied()
    }

    fn label(&self, krate: &str) -> String {
        match self.layer_of(krate) {
            Some(layer) => format!("{krate} [layer {layer}]"),
            None => format!("{krate} [external]"),
        }
    }

    /// Format as tree string
    pub fn format_tree(&self) -> String {
        if self.crates.is_empty() {
            return "No crates in project".to_string();
        }

        let mut output = String::new();
        output.push_str("Dependency Tree:\n");
        self.format_node(&mut output, &self.root, "", true, &mut BTreeSet::new());
        output
    }

    fn format_node(
        &self,
        output: &mut String,
        node: &str,
        prefix: &str,
        is_last: bool,
        expanded: &mut BTreeSet<String>,
    ) {
        let connector = if is_last { "└── " } else { "├── " };
        let _ = writeln!(output, "{prefix}{connector}{}", self.label(node));

        // print shared subtrees once
        if !expanded.insert(node.to_string()) {
            return;
        }

        if let Some(deps) = self.dependencies.get(node) {
            let child_prefix = if is_last {
                format!("{prefix}    ")
            } else {
                format!("{prefix}│   ")
            };

            for (i, dep) in deps.iter().enumerate() {
                let is_last_dep = i == deps.len() - 1;
                self.format_node(output, &dep.target, &child_prefix, is_last_dep, expanded);
            }
        }
    }

    /// Format as DOT graph, local crates clustered by layer
    pub fn format_dot(&self) -> String {
        let mut output = String::new();
        output.push_str("digraph crates {\n");
        output.push_str("    rankdir=BT;\n");
        output.push_str("    node [shape=box];\n");
        output.push('\n');

        let mut by_layer: BTreeMap<usize, Vec<&str>> = BTreeMap::new();
        for (krate, layer) in &self.layers {
            by_layer.entry(*layer).or_default().push(krate);
        }
        for (layer, crates) in &by_layer {
            let _ = writeln!(output, "    subgraph cluster_layer_{layer} {{");
            let _ = writeln!(output, "        label=\"layer {layer}\";");
            for krate in crates {
                let _ = writeln!(output, "        \"{krate}\";");
            }
            output.push_str("    }\n");
        }

        for krate in self.crates.iter().filter(|k| !self.layers.contains_key(*k)) {
            let _ = writeln!(output, "    \"{krate}\" [style=dashed];");
        }
        output.push('\n');

        for (from, deps) in &self.dependencies {
            for dep in deps {
                let style = match dep.dep_type {
                    DependencyType::Local => "solid",
                    DependencyType::External => "dashed",
                };
                let _ = writeln!(output, "    \"{from}\" -> \"{}\" [style={style}];", dep.target);
            }
        }

        output.push_str("}\n");
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::graph::{CrateNode, CrateRef};

    fn graph() -> CrateGraph {
        CrateGraph::new(
            "a",
            vec![
                CrateNode::new(CrateRef::local("a", "0.1.0", "a")).with_dependencies(["b", "c"]),
                CrateNode::new(CrateRef::local("b", "0.1.0", "b")).with_dependencies(["d"]),
                CrateNode::new(CrateRef::local("c", "0.1.0", "c")).with_dependencies(["b"]),
                CrateNode::new(CrateRef::external("d", "1")),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_tree_shows_layers() {
        let tree = DependencyTree::from_graph(&graph());
        let text = tree.format_tree();

        assert!(text.contains("└── a [layer 2]"));
        assert!(text.contains("b [layer 0]"));
        assert!(text.contains("c [layer 1]"));
        assert!(text.contains("d [external]"));
    }

    #[test]
    fn test_shared_subtree_expanded_once() {
        let tree = DependencyTree::from_graph(&graph());
        let text = tree.format_tree();
        // b appears twice (under a and under c), d only under the first b
        assert_eq!(text.matches("b [layer 0]").count(), 2);
        assert_eq!(text.matches("d [external]").count(), 1);
    }

    #[test]
    fn test_dot_clusters_layers() {
        let dot = DependencyTree::from_graph(&graph()).format_dot();

        assert!(dot.starts_with("digraph crates {"));
        assert!(dot.contains("subgraph cluster_layer_0"));
        assert!(dot.contains("subgraph cluster_layer_2"));
        assert!(dot.contains("\"d\" [style=dashed];"));
        assert!(dot.contains("\"b\" -> \"d\" [style=dashed];"));
        assert!(dot.contains("\"a\" -> \"b\" [style=solid];"));
    }

    #[test]
    fn test_layer_lookup() {
        let tree = DependencyTree::from_graph(&graph());
        assert_eq!(tree.layer_of("c"), Some(1));
        assert_eq!(tree.layer_of("d"), None);
        assert_eq!(tree.root(), "a");
        assert_eq!(tree.dependencies("a").map(Vec::len), Some(2));
    }
}
