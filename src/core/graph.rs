//! Crate graph model
//!
//! Holds a root crate and its transitive dependencies as a DAG. Only edges of
//! local crates are followed: external crates are leaves, their own
//! dependencies are resolved by the build primitive, not by us.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::PathBuf;

use crate::core::manifest::{DependencySpec, Manifest};
use crate::error::GraphError;

/// Where a crate's sources come from
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum CrateSource {
    /// Sources in the project tree
    Local { path: PathBuf },
    /// A crates registry (`None` is the default registry)
    Registry { registry: Option<String> },
    /// A git repository
    Git { url: String, rev: Option<String> },
}

/// Identifies a crate
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CrateRef {
    pub name: String,
    pub version: String,
    pub source: CrateSource,
}

impl CrateRef {
    /// A crate built from a local path
    pub fn local(name: &str, version: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            source: CrateSource::Local { path: path.into() },
        }
    }

    /// A crate from the default registry
    pub fn external(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            source: CrateSource::Registry { registry: None },
        }
    }

    /// Whether the crate is built from local sources
    pub fn is_local(&self) -> bool {
        matches!(self.source, CrateSource::Local { .. })
    }

    /// Manifest dependency declaration for this crate
    pub fn dependency_spec(&self, features: &[String]) -> DependencySpec {
        let spec = match &self.source {
            CrateSource::Local { path } => DependencySpec {
                path: Some(path.clone()),
                version: Some(self.version.clone()),
                ..DependencySpec::default()
            },
            CrateSource::Registry { registry } => DependencySpec {
                version: Some(self.version.clone()),
                registry: registry.clone(),
                ..DependencySpec::default()
            },
            CrateSource::Git { url, rev } => DependencySpec {
                git: Some(url.clone()),
                rev: rev.clone(),
                ..DependencySpec::default()
            },
        };
        spec.with_features(features.iter().cloned())
    }
}

impl std::fmt::Display for CrateRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}

/// A crate together with its declared dependencies
#[derive(Debug, Clone, PartialEq)]
pub struct CrateNode {
    pub krate: CrateRef,
    /// Dependency crate names
    pub dependencies: Vec<String>,
    /// Features enabled when this crate is built
    pub features: Vec<String>,
    /// Per-crate manifest overrides
    pub manifest: Manifest,
}

impl CrateNode {
    /// A node without dependencies
    pub fn new(krate: CrateRef) -> Self {
        Self {
            krate,
            dependencies: Vec::new(),
            features: Vec::new(),
            manifest: Manifest::new(),
        }
    }

    /// Set the dependency names
    #[must_use]
    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    /// Set the enabled features
    #[must_use]
    pub fn with_features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.features = features.into_iter().map(Into::into).collect();
        self
    }

    /// Set the per-crate manifest overrides
    #[must_use]
    pub fn with_manifest(mut self, manifest: Manifest) -> Self {
        self.manifest = manifest;
        self
    }

    /// Crate name
    pub fn name(&self) -> &str {
        &self.krate.name
    }
}

/// Dependency graph rooted at one local crate
#[derive(Debug, Clone)]
pub struct CrateGraph {
    root: String,
    nodes: BTreeMap<String, CrateNode>,
    /// Local crates, dependencies before dependents
    local_order: Vec<String>,
}

impl CrateGraph {
    /// Build the graph reachable from `root`.
    ///
    /// Fails on duplicate declarations, unknown or external roots, missing
    /// dependencies and cycles between local crates.
    pub fn new(root: &str, nodes: Vec<CrateNode>) -> Result<Self, GraphError> {
        let mut declared = BTreeMap::new();
        for node in nodes {
            let name = node.name().to_string();
            if declared.insert(name.clone(), node).is_some() {
                return Err(GraphError::DuplicateCrate { name });
            }
        }

        let root_node = declared.get(root).ok_or_else(|| GraphError::UnknownRoot {
            name: root.to_string(),
        })?;
        if !root_node.krate.is_local() {
            return Err(GraphError::ExternalRoot {
                name: root.to_string(),
            });
        }

        let mut visited = HashSet::new();
        let mut in_progress = HashSet::new();
        let mut path = Vec::new();
        let mut local_order = Vec::new();
        let mut reachable = BTreeSet::new();

        visit(
            root,
            &declared,
            &mut visited,
            &mut in_progress,
            &mut path,
            &mut local_order,
            &mut reachable,
        )?;

        let nodes: BTreeMap<String, CrateNode> = declared
            .into_iter()
            .filter(|(name, _)| {
                let keep = reachable.contains(name);
                if !keep {
                    tracing::warn!("Crate '{name}' is not reachable from '{root}', ignoring");
                }
                keep
            })
            .collect();

        Ok(Self {
            root: root.to_string(),
            nodes,
            local_order,
        })
    }

    /// The root crate
    pub fn root(&self) -> &CrateRef {
        &self.nodes[&self.root].krate
    }

    /// Name of the root crate
    pub fn root_name(&self) -> &str {
        &self.root
    }

    /// Look up a crate node
    pub fn get(&self, name: &str) -> Option<&CrateNode> {
        self.nodes.get(name)
    }

    /// Whether `name` is a local crate of this graph
    pub fn is_local(&self, name: &str) -> bool {
        self.nodes.get(name).is_some_and(|n| n.krate.is_local())
    }

    /// Direct dependencies of a crate, local and external
    pub fn dependencies_of(&self, name: &str) -> BTreeSet<&CrateRef> {
        self.nodes
            .get(name)
            .map(|node| {
                node.dependencies
                    .iter()
                    .filter_map(|dep| self.nodes.get(dep).map(|n| &n.krate))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Direct local dependencies of a crate
    pub fn local_dependencies_of(&self, name: &str) -> Vec<&str> {
        self.dependencies_of(name)
            .into_iter()
            .filter(|k| k.is_local())
            .map(|k| k.name.as_str())
            .collect()
    }

    /// Direct external dependencies of a crate
    pub fn external_dependencies_of(&self, name: &str) -> Vec<&CrateRef> {
        self.dependencies_of(name)
            .into_iter()
            .filter(|k| !k.is_local())
            .collect()
    }

    /// Local crates in build order (dependencies first)
    pub fn local_crates(&self) -> &[String] {
        &self.local_order
    }

    /// All reachable crate nodes, by name
    pub fn nodes(&self) -> impl Iterator<Item = &CrateNode> {
        self.nodes.values()
    }

    /// Number of reachable crates
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph is empty (never true for a constructed graph)
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

fn visit(
    name: &str,
    declared: &BTreeMap<String, CrateNode>,
    visited: &mut HashSet<String>,
    in_progress: &mut HashSet<String>,
    path: &mut Vec<String>,
    local_order: &mut Vec<String>,
    reachable: &mut BTreeSet<String>,
) -> Result<(), GraphError> {
    if in_progress.contains(name) {
        let start = path.iter().position(|n| n == name).unwrap_or(0);
        let mut cycle = path[start..].to_vec();
        cycle.push(name.to_string());
        return Err(GraphError::CycleDetected { cycle });
    }

    if visited.contains(name) {
        return Ok(());
    }

    reachable.insert(name.to_string());
    let node = &declared[name];

    // External crates are leaves
    if !node.krate.is_local() {
        visited.insert(name.to_string());
        return Ok(());
    }

    in_progress.insert(name.to_string());
    path.push(name.to_string());

    for dep in &node.dependencies {
        if !declared.contains_key(dep) {
            return Err(GraphError::MissingDependency {
                krate: name.to_string(),
                dependency: dep.clone(),
            });
        }
        visit(dep, declared, visited, in_progress, path, local_order, reachable)?;
    }

    path.pop();
    in_progress.remove(name);
    visited.insert(name.to_string());
    local_order.push(name.to_string());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(name: &str, deps: &[&str]) -> CrateNode {
        CrateNode::new(CrateRef::local(name, "0.1.0", format!("crates/{name}")))
            .with_dependencies(deps.iter().copied())
    }

    fn external(name: &str) -> CrateNode {
        CrateNode::new(CrateRef::external(name, "1"))
    }

    #[test]
    fn test_dependency_queries() {
        let graph = CrateGraph::new(
            "a",
            vec![local("a", &["b", "c"]), local("b", &["d"]), local("c", &["b"]), external("d")],
        )
        .unwrap();

        assert_eq!(graph.root().name, "a");
        assert!(graph.is_local("b"));
        assert!(!graph.is_local("d"));
        assert_eq!(graph.local_dependencies_of("a"), vec!["b", "c"]);
        assert_eq!(graph.external_dependencies_of("b")[0].name, "d");
        let names: Vec<_> = graph.dependencies_of("a").iter().map(|k| k.name.clone()).collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[test]
    fn test_local_order_puts_dependencies_first() {
        let graph = CrateGraph::new(
            "app",
            vec![local("app", &["lib"]), local("lib", &["util"]), local("util", &[])],
        )
        .unwrap();

        assert_eq!(graph.local_crates(), ["util", "lib", "app"]);
    }

    #[test]
    fn test_cycle_is_reported_with_path() {
        let err = CrateGraph::new(
            "a",
            vec![local("a", &["b"]), local("b", &["c"]), local("c", &["b"])],
        )
        .unwrap_err();

        assert_eq!(
            err,
            GraphError::CycleDetected {
                cycle: vec!["b".to_string(), "c".to_string(), "b".to_string()]
            }
        );
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let err = CrateGraph::new("a", vec![local("a", &["a"])]).unwrap_err();
        assert!(matches!(err, GraphError::CycleDetected { .. }));
    }

    #[test]
    fn test_missing_dependency() {
        let err = CrateGraph::new("a", vec![local("a", &["ghost"])]).unwrap_err();
        assert_eq!(
            err,
            GraphError::MissingDependency {
                krate: "a".to_string(),
                dependency: "ghost".to_string()
            }
        );
    }

    #[test]
    fn test_external_root_rejected() {
        let err = CrateGraph::new("d", vec![external("d")]).unwrap_err();
        assert!(matches!(err, GraphError::ExternalRoot { .. }));
    }

    #[test]
    fn test_unknown_root_and_duplicates() {
        assert!(matches!(
            CrateGraph::new("x", vec![local("a", &[])]),
            Err(GraphError::UnknownRoot { .. })
        ));
        assert!(matches!(
            CrateGraph::new("a", vec![local("a", &[]), local("a", &[])]),
            Err(GraphError::DuplicateCrate { .. })
        ));
    }

    #[test]
    fn test_unreachable_crates_are_dropped() {
        let graph =
            CrateGraph::new("a", vec![local("a", &[]), local("orphan", &[])]).unwrap();
        assert_eq!(graph.len(), 1);
        assert!(graph.get("orphan").is_none());
    }

    #[test]
    fn test_external_dependencies_are_not_followed() {
        // "d" is external and lists a dependency we never declared
        let d = external("d").with_dependencies(["undeclared"]);
        let graph = CrateGraph::new("a", vec![local("a", &["d"]), d]).unwrap();
        assert_eq!(graph.local_crates(), ["a"]);
    }

    #[test]
    fn test_dependency_spec_for_sources() {
        let local_ref = CrateRef::local("net", "0.2.0", "crates/net");
        let spec = local_ref.dependency_spec(&["tcp".to_string()]);
        assert_eq!(spec.path, Some(PathBuf::from("crates/net")));
        assert_eq!(spec.features, vec!["tcp"]);

        let git_ref = CrateRef {
            name: "sel4".to_string(),
            version: "0.1.0".to_string(),
            source: CrateSource::Git {
                url: "https://example.com/rust-sel4".to_string(),
                rev: Some("abc123".to_string()),
            },
        };
        let spec = git_ref.dependency_spec(&[]);
        assert_eq!(spec.rev.as_deref(), Some("abc123"));
        assert!(spec.version.is_none());
    }
}
