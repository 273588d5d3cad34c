use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};
use crate::module::ModuleRegistry;
use crate::utils::io;

/// Node id -> ids of the nodes it directly depends on.
pub type Dependencies = BTreeMap<String, BTreeSet<String>>;

#[derive(Debug, Clone, Deserialize)]
pub struct NodeSpec {
    #[serde(rename = "module-name")]
    pub module_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EdgeSpec {
    #[serde(rename = "source-node")]
    pub source_node: String,
    #[serde(rename = "target-node")]
    pub target_node: String,
    #[serde(rename = "source-cache", default)]
    pub source_cache: Option<String>,
    #[serde(rename = "target-cache", default)]
    pub target_cache: Option<String>,
    #[serde(default)]
    pub sample: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    nodes: Map<String, Value>,
    #[serde(default)]
    edges: Vec<EdgeSpec>,
}

/// A parsed `pipeline.json`, not yet checked against the module registry.
#[derive(Debug, Clone)]
pub struct PipelineManifest {
    /// In declaration order.
    pub nodes: Vec<(String, NodeSpec)>,
    pub edges: Vec<EdgeSpec>,
}

impl PipelineManifest {
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::manifest_invalid(
                format!("Manifest {} does not exist", path.display()),
                None,
            ));
        }
        let content = io::read_file(path, &format!("read {}", path.display()))?;
        Self::parse(&content, &path.display().to_string())
    }

    /// `origin` names the document in error messages.
    pub fn parse(content: &str, origin: &str) -> Result<Self> {
        let raw: RawManifest = serde_json::from_str(content).map_err(|e| {
            if e.is_data() {
                Error::manifest_invalid(format!("{}: {}", origin, e), None)
            } else {
                Error::manifest_invalid_json(origin, e)
            }
        })?;

        let nodes = raw
            .nodes
            .into_iter()
            .map(|(id, value)| {
                serde_json::from_value::<NodeSpec>(value)
                    .map(|spec| (id.clone(), spec))
                    .map_err(|e| {
                        Error::manifest_invalid(
                            format!("Node '{}' is malformed: {}", id, e),
                            Some(id),
                        )
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            nodes,
            edges: raw.edges,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: String,
    pub module: String,
}

/// Makes `source`'s exported cache visible as `target`'s imported cache for one sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLink {
    pub source_node: String,
    pub target_node: String,
    pub source_cache: String,
    pub target_cache: String,
    pub sample: String,
}

impl CacheLink {
    /// `<root>/<source-node>/exported/<sample>/<source-cache>`
    pub fn source_path(&self, root: &Path) -> PathBuf {
        root.join(&self.source_node)
            .join("exported")
            .join(&self.sample)
            .join(&self.source_cache)
    }

    /// `<root>/<target-node>/imported/<sample>/<target-cache>`
    pub fn target_path(&self, root: &Path) -> PathBuf {
        root.join(&self.target_node)
            .join("imported")
            .join(&self.sample)
            .join(&self.target_cache)
    }
}

/// A validated pipeline: every node's module is registered and every edge is well formed.
#[derive(Debug, Clone)]
pub struct Pipeline {
    nodes: Vec<Node>,
    dependencies: Dependencies,
    cache_links: HashMap<String, Vec<CacheLink>>,
}

impl Pipeline {
    /// Check a manifest against the registry. Touches nothing on disk.
    pub fn load(manifest: PipelineManifest, registry: &ModuleRegistry) -> Result<Self> {
        let mut nodes = Vec::with_capacity(manifest.nodes.len());
        for (id, spec) in manifest.nodes {
            check_path_segment(&id, "node id", Some(&id))?;
            if !registry.contains(&spec.module_name) {
                return Err(Error::manifest_module_not_found(
                    id,
                    spec.module_name,
                    registry.ids(),
                ));
            }
            nodes.push(Node {
                id,
                module: spec.module_name,
            });
        }

        let declared: BTreeSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        let mut dependencies = Dependencies::new();
        let mut cache_links: HashMap<String, Vec<CacheLink>> = HashMap::new();

        for (index, edge) in manifest.edges.into_iter().enumerate() {
            for endpoint in [&edge.source_node, &edge.target_node] {
                if !declared.contains(endpoint.as_str()) {
                    return Err(Error::manifest_invalid(
                        format!("Edge #{} references undeclared node '{}'", index, endpoint),
                        Some(endpoint.clone()),
                    ));
                }
            }

            dependencies
                .entry(edge.target_node.clone())
                .or_default()
                .insert(edge.source_node.clone());

            if let Some(link) = cache_link(index, &edge)? {
                cache_links
                    .entry(edge.target_node.clone())
                    .or_default()
                    .push(link);
            }
        }

        Ok(Self {
            nodes,
            dependencies,
            cache_links,
        })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn dependencies(&self) -> &Dependencies {
        &self.dependencies
    }

    /// Cache links targeting `node`, in edge declaration order.
    pub fn cache_links_for(&self, node: &str) -> &[CacheLink] {
        self.cache_links
            .get(node)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// A cache link needs all three cache fields. An edge with only some of them
/// is kept as a plain dependency.
fn cache_link(index: usize, edge: &EdgeSpec) -> Result<Option<CacheLink>> {
    match (&edge.source_cache, &edge.target_cache, &edge.sample) {
        (Some(source_cache), Some(target_cache), Some(sample)) => {
            let target = Some(edge.target_node.as_str());
            let source_cache = clean_relative(source_cache, "source-cache", target)?;
            let target_cache = clean_relative(target_cache, "target-cache", target)?;
            let sample = clean_relative(sample, "sample", target)?;
            Ok(Some(CacheLink {
                source_node: edge.source_node.clone(),
                target_node: edge.target_node.clone(),
                source_cache,
                target_cache,
                sample,
            }))
        }
        (None, None, None) => Ok(None),
        _ => {
            log_status!(
                "manifest",
                "Edge #{} ({} -> {}) has partial cache fields; no cache is linked",
                index,
                edge.source_node,
                edge.target_node
            );
            Ok(None)
        }
    }
}

/// Node ids become directory names, so they must be a single plain path segment.
fn check_path_segment(value: &str, field: &str, node: Option<&str>) -> Result<()> {
    let mut components = Path::new(value).components();
    let single_normal = matches!(components.next(), Some(Component::Normal(_)))
        && components.next().is_none()
        && !value.contains(['/', '\\']);
    if single_normal {
        Ok(())
    } else {
        Err(Error::manifest_invalid(
            format!("Invalid {} '{}': must be a plain directory name", field, value),
            node.map(str::to_string),
        ))
    }
}

/// Cache and sample names may be nested but must stay below their parent.
/// Trailing slashes are dropped.
fn clean_relative(value: &str, field: &str, node: Option<&str>) -> Result<String> {
    let trimmed = value.trim_end_matches(['/', '\\']);
    let valid = !trimmed.is_empty()
        && Path::new(trimmed)
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if valid {
        Ok(trimmed.to_string())
    } else {
        Err(Error::manifest_invalid(
            format!("Invalid {} '{}': must be a relative path without '..'", field, value),
            node.map(str::to_string),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::Module;

    fn registry() -> ModuleRegistry {
        ModuleRegistry::from_modules([
            Module::new("seg", "/opt/misa/seg"),
            Module::new("quant", "/opt/misa/quant"),
        ])
    }

    fn load(json: &str) -> Result<Pipeline> {
        let manifest = PipelineManifest::parse(json, "pipeline.json")?;
        Pipeline::load(manifest, &registry())
    }

    #[test]
    fn nodes_keep_declaration_order() {
        let pipeline = load(
            r#"{"nodes": {"zeta": {"module-name": "seg"}, "alpha": {"module-name": "quant"}, "mid": {"module-name": "seg"}}, "edges": []}"#,
        )
        .unwrap();
        let ids: Vec<_> = pipeline.nodes().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn edges_build_dependencies_and_cache_links() {
        let pipeline = load(
            r#"{
                "nodes": {"A": {"module-name": "seg"}, "B": {"module-name": "quant"}, "C": {"module-name": "seg"}},
                "edges": [
                    {"source-node": "A", "target-node": "B", "source-cache": "mask", "target-cache": "mask", "sample": "s1"},
                    {"source-node": "C", "target-node": "B"},
                    {"source-node": "A", "target-node": "B", "source-cache": "raw/", "target-cache": "input", "sample": "s2"}
                ]
            }"#,
        )
        .unwrap();

        let deps = &pipeline.dependencies()["B"];
        assert_eq!(
            deps.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["A", "C"]
        );
        assert!(!pipeline.dependencies().contains_key("A"));

        let links = pipeline.cache_links_for("B");
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].sample, "s1");
        assert_eq!(links[1].source_cache, "raw");
        assert!(pipeline.cache_links_for("A").is_empty());

        let root = Path::new("/work");
        assert_eq!(
            links[0].source_path(root),
            PathBuf::from("/work/A/exported/s1/mask")
        );
        assert_eq!(
            links[0].target_path(root),
            PathBuf::from("/work/B/imported/s1/mask")
        );
    }

    #[test]
    fn unregistered_module_is_rejected() {
        let err = load(r#"{"nodes": {"A": {"module-name": "deconvolve"}}}"#).unwrap_err();
        assert_eq!(err.code.as_str(), "manifest.module_not_found");
        assert_eq!(err.node(), Some("A"));
        assert_eq!(err.details["module"], "deconvolve");
        assert_eq!(err.details["available"], serde_json::json!(["quant", "seg"]));
    }

    #[test]
    fn partial_cache_fields_keep_the_dependency_without_a_link() {
        let pipeline = load(
            r#"{"nodes": {"A": {"module-name": "seg"}, "B": {"module-name": "quant"}},
                "edges": [
                    {"source-node": "A", "target-node": "B", "sample": "s1"},
                    {"source-node": "A", "target-node": "B", "source-cache": "mask", "target-cache": "mask"}
                ]}"#,
        )
        .unwrap();

        assert!(pipeline.dependencies()["B"].contains("A"));
        assert!(pipeline.cache_links_for("B").is_empty());
    }

    #[test]
    fn edge_to_undeclared_node_is_rejected() {
        let err = load(
            r#"{"nodes": {"A": {"module-name": "seg"}},
                "edges": [{"source-node": "ghost", "target-node": "A"}]}"#,
        )
        .unwrap_err();
        assert_eq!(err.code.as_str(), "manifest.invalid");
        assert_eq!(err.node(), Some("ghost"));
    }

    #[test]
    fn node_ids_must_be_plain_directory_names() {
        for id in ["../escape", "a/b", ".", ""] {
            let json = serde_json::json!({ "nodes": { id: { "module-name": "seg" } } }).to_string();
            let err = load(&json).unwrap_err();
            assert_eq!(err.code.as_str(), "manifest.invalid", "id {:?}", id);
        }
    }

    #[test]
    fn cache_names_cannot_escape() {
        let err = load(
            r#"{"nodes": {"A": {"module-name": "seg"}, "B": {"module-name": "quant"}},
                "edges": [{"source-node": "A", "target-node": "B", "source-cache": "../../etc", "target-cache": "x", "sample": "s1"}]}"#,
        )
        .unwrap_err();
        assert_eq!(err.code.as_str(), "manifest.invalid");
    }

    #[test]
    fn syntax_and_structure_errors_are_distinguished() {
        let syntax = PipelineManifest::parse("{ nodes", "pipeline.json").unwrap_err();
        assert_eq!(syntax.code.as_str(), "manifest.invalid_json");

        let structure = PipelineManifest::parse(r#"{"edges": []}"#, "pipeline.json").unwrap_err();
        assert_eq!(structure.code.as_str(), "manifest.invalid");

        let node = PipelineManifest::parse(r#"{"nodes": {"A": {}}}"#, "pipeline.json").unwrap_err();
        assert_eq!(node.code.as_str(), "manifest.invalid");
        assert_eq!(node.node(), Some("A"));
    }
}
