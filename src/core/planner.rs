//! Layer planning
//!
//! Partitions a [`CrateGraph`] into ordered layers. A crate's depth is 0 when
//! it has no local dependencies and otherwise one more than the deepest of
//! its local dependencies, so a crate reached along several paths waits for
//! the slowest one. Crates of equal depth share a layer. Layer `i` therefore
//! only needs the sysroot and the artifacts of layers `< i`.
//!
//! The root crate depends (transitively) on every other local crate, so it is
//! always alone in the last layer.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::core::graph::{CrateGraph, CrateRef};
use crate::error::GraphError;

/// A group of crates built together
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildLayer {
    /// Position in the build order
    pub index: usize,
    /// Local crates built in this layer, sorted by name
    pub crates: Vec<CrateRef>,
    /// External crates the layer's crates depend on directly
    pub externals: Vec<CrateRef>,
    /// Whether this layer holds the root crate
    pub is_last: bool,
}

impl BuildLayer {
    /// Names of the local crates in this layer
    pub fn crate_names(&self) -> Vec<String> {
        self.crates.iter().map(|k| k.name.clone()).collect()
    }

    /// Whether the layer builds `name`
    pub fn contains(&self, name: &str) -> bool {
        self.crates.iter().any(|k| k.name == name)
    }
}

/// Depth of every local crate in the graph
pub fn crate_depths(graph: &CrateGraph) -> BTreeMap<String, usize> {
    let mut depths: BTreeMap<String, usize> = BTreeMap::new();

    // local_crates() lists dependencies before dependents
    for name in graph.local_crates() {
        let depth = graph
            .local_dependencies_of(name)
            .iter()
            .filter_map(|dep| depths.get(*dep))
            .map(|d| d + 1)
            .max()
            .unwrap_or(0);
        depths.insert(name.clone(), depth);
    }

    depths
}

/// Partition the graph into ordered build layers
pub fn plan_layers(graph: &CrateGraph) -> Vec<BuildLayer> {
    let depths = crate_depths(graph);
    let layer_count = depths.values().max().map_or(0, |d| d + 1);

    let mut buckets: Vec<Vec<&str>> = vec![Vec::new(); layer_count];
    for (name, depth) in &depths {
        buckets[*depth].push(name);
    }

    let layers: Vec<BuildLayer> = buckets
        .into_iter()
        .enumerate()
        .map(|(index, names)| {
            let mut crates = Vec::new();
            let mut externals = Vec::new();
            for name in names {
                if let Some(node) = graph.get(name) {
                    crates.push(node.krate.clone());
                }
                for ext in graph.external_dependencies_of(name) {
                    if !externals.contains(ext) {
                        externals.push(ext.clone());
                    }
                }
            }
            crates.sort();
            externals.sort();
            BuildLayer {
                index,
                crates,
                externals,
                is_last: index + 1 == layer_count,
            }
        })
        .collect();

    for layer in &layers {
        tracing::debug!("Layer {}: {}", layer.index, layer.crate_names().join(", "));
    }

    layers
}

/// Check that every local dependency lives in a strictly earlier layer
pub fn validate_layers(graph: &CrateGraph, layers: &[BuildLayer]) -> Result<(), GraphError> {
    let mut layer_of = BTreeMap::new();
    for layer in layers {
        for krate in &layer.crates {
            layer_of.insert(krate.name.as_str(), layer.index);
        }
    }

    for layer in layers {
        for krate in &layer.crates {
            for dep in graph.local_dependencies_of(&krate.name) {
                let ok = layer_of.get(dep).is_some_and(|dep_layer| *dep_layer < layer.index);
                if !ok {
                    return Err(GraphError::LayerOrderViolation {
                        krate: krate.name.clone(),
                        dependency: dep.to_string(),
                        layer: layer.index,
                    });
                }
            }
        }
    }

    Ok(())
}
