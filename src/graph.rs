//! A dependency graph of Mach-o binaries
//!
//! The graph is built breadth first from one or more roots with an explicit work queue. Each
//! binary is parsed once, keyed by its resolved absolute path with `..` folded away, so diamonds converge on one
//! node and cycles simply hit an already visited node. Nodes and edges live in flat vectors
//! owned by the graph and refer to each other by index.
//!
//! A reference that cannot be resolved, or that resolves to a file which does not parse, is
//! recorded as a failure on the graph instead of aborting the walk.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use crate::dyld::{self, DyldResolver, SearchContext};
use crate::error;
use crate::mach::MachFile;
use crate::mach::header::MH_EXECUTE;
use crate::options::ParseOptions;

/// Index of a node in [`DependencyGraph::nodes`]
pub type NodeId = usize;

/// One parsed binary
#[derive(Debug, Clone)]
pub struct DependencyNode {
    /// Resolved absolute path; the node's identity
    pub path: PathBuf,
    /// The file's bytes as read
    pub data: Vec<u8>,
    pub file: MachFile,
}

impl DependencyNode {
    fn load(path: PathBuf, options: &ParseOptions) -> error::Result<Self> {
        let data = fs::read(&path)?;
        let mut file = MachFile::parse(&data, options)?;
        file.path = Some(path.clone());
        Ok(DependencyNode { path, data, file })
    }

    /// The directory holding this binary, used as its `@loader_path`
    pub fn loader_path(&self) -> Option<&Path> {
        self.path.parent()
    }

    /// Whether the first image of this file is a main executable
    pub fn is_executable(&self) -> bool {
        self.file
            .headers
            .first()
            .is_some_and(|macho| macho.filetype() == MH_EXECUTE)
    }
}

/// `from` refers to `to` through the load command string `reference`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    pub from: NodeId,
    pub to: NodeId,
    /// The reference as stored in the load command
    pub reference: String,
    /// What the reference resolved to; the path of `to`
    pub resolved: PathBuf,
}

/// All binaries reachable from a set of roots
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: Vec<DependencyNode>,
    edges: Vec<DependencyEdge>,
    index: HashMap<PathBuf, NodeId>,
    roots: Vec<NodeId>,
    failures: Vec<error::Error>,
}

impl DependencyGraph {
    pub fn nodes(&self) -> &[DependencyNode] {
        &self.nodes
    }

    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Every reference that could not be followed, as [`error::Error::CyclicOrMissingDependency`]
    pub fn failures(&self) -> &[error::Error] {
        &self.failures
    }

    /// The id of the node at resolved path `path`
    pub fn node_id<P: AsRef<Path>>(&self, path: P) -> Option<NodeId> {
        self.index.get(path.as_ref()).copied()
    }

    /// The node at resolved path `path`
    pub fn node<P: AsRef<Path>>(&self, path: P) -> Option<&DependencyNode> {
        self.node_id(path).map(|id| &self.nodes[id])
    }

    pub fn get(&self, id: NodeId) -> Option<&DependencyNode> {
        self.nodes.get(id)
    }

    /// Edges leaving `id`, in discovery order
    pub fn edges_from(&self, id: NodeId) -> impl Iterator<Item = &DependencyEdge> + '_ {
        self.edges.iter().filter(move |edge| edge.from == id)
    }

    /// The nodes `id` depends on directly
    pub fn dependencies(&self, id: NodeId) -> impl Iterator<Item = &DependencyNode> + '_ {
        self.edges_from(id).map(move |edge| &self.nodes[edge.to])
    }

    /// The nodes depending directly on `id`
    pub fn dependents(&self, id: NodeId) -> impl Iterator<Item = &DependencyNode> + '_ {
        self.edges
            .iter()
            .filter(move |edge| edge.to == id)
            .map(move |edge| &self.nodes[edge.from])
    }
}

/// Builds [`DependencyGraph`]s. The default builder resolves with [`DyldResolver::default`],
/// which reads the process environment.
#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    resolver: DyldResolver,
    executable_path: Option<PathBuf>,
    options: ParseOptions,
}

struct Visit {
    path: PathBuf,
    /// Run paths of the binaries that led here, already expanded
    inherited_rpaths: Vec<String>,
}

struct PendingEdge {
    from: NodeId,
    reference: String,
    resolved: PathBuf,
}

impl GraphBuilder {
    pub fn new(resolver: DyldResolver) -> Self {
        GraphBuilder {
            resolver,
            executable_path: None,
            options: ParseOptions::default(),
        }
    }

    /// The directory `@executable_path/` refers to. When unset, the directory of the first
    /// root is used if that root is a main executable.
    pub fn executable_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.executable_path = Some(path.into());
        self
    }

    pub fn options(mut self, options: ParseOptions) -> Self {
        self.options = options;
        self
    }

    pub fn resolver(&self) -> &DyldResolver {
        &self.resolver
    }

    /// Walks everything reachable from `roots`. Fails only if a root itself cannot be read or parsed.
    pub fn build<I, P>(&self, roots: I) -> error::Result<DependencyGraph>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut graph = DependencyGraph::default();
        let mut queue = VecDeque::new();
        let mut pending = Vec::new();
        let mut failed: HashSet<PathBuf> = HashSet::new();
        let mut executable_path = self.executable_path.clone();

        for root in roots {
            let path = dyld::normalize_path(std::path::absolute(root.as_ref())?);
            if let Some(&id) = graph.index.get(&path) {
                if !graph.roots.contains(&id) {
                    graph.roots.push(id);
                }
                continue;
            }
            let node = DependencyNode::load(path.clone(), &self.options)?;
            if executable_path.is_none() && graph.roots.is_empty() && node.is_executable() {
                executable_path = node.loader_path().map(Path::to_path_buf);
            }
            let id = self.insert(&mut graph, node);
            graph.roots.push(id);
            queue.push_back((id, Vec::new()));
        }

        while let Some((id, inherited_rpaths)) = queue.pop_front() {
            let visits = self.follow(&mut graph, id, inherited_rpaths, executable_path.as_deref(), &mut pending);
            for visit in visits {
                if graph.index.contains_key(&visit.path) || failed.contains(&visit.path) {
                    continue;
                }
                // claimed by the shared cache, nothing to read
                if !visit.path.exists() {
                    log::debug!("not descending into {}", visit.path.display());
                    continue;
                }
                match DependencyNode::load(visit.path.clone(), &self.options) {
                    Ok(node) => {
                        let id = self.insert(&mut graph, node);
                        queue.push_back((id, visit.inherited_rpaths));
                    }
                    Err(cause) => {
                        let loader = graph.nodes[id].path.clone();
                        let reference = pending
                            .iter()
                            .rev()
                            .find(|edge: &&PendingEdge| edge.resolved == visit.path)
                            .map(|edge| edge.reference.clone())
                            .unwrap_or_else(|| visit.path.display().to_string());
                        log::warn!("{} depends on {}, which does not parse: {cause}", loader.display(), visit.path.display());
                        graph.failures.push(error::Error::CyclicOrMissingDependency {
                            loader,
                            reference,
                            cause: Box::new(cause),
                        });
                        failed.insert(visit.path);
                    }
                }
            }
        }

        for edge in pending {
            if let Some(&to) = graph.index.get(&edge.resolved) {
                graph.edges.push(DependencyEdge {
                    from: edge.from,
                    to,
                    reference: edge.reference,
                    resolved: edge.resolved,
                });
            }
        }
        log::debug!(
            "dependency graph: {} nodes, {} edges, {} failures",
            graph.nodes.len(),
            graph.edges.len(),
            graph.failures.len()
        );
        Ok(graph)
    }

    fn insert(&self, graph: &mut DependencyGraph, node: DependencyNode) -> NodeId {
        let id = graph.nodes.len();
        log::debug!("visiting {}", node.path.display());
        graph.index.insert(node.path.clone(), id);
        graph.nodes.push(node);
        id
    }

    /// Resolves every distinct reference of node `id`, recording an edge or a failure for each,
    /// and returns the binaries to visit next
    fn follow(
        &self,
        graph: &mut DependencyGraph,
        id: NodeId,
        inherited_rpaths: Vec<String>,
        executable_path: Option<&Path>,
        pending: &mut Vec<PendingEdge>,
    ) -> Vec<Visit> {
        let node = &graph.nodes[id];
        let mut context = SearchContext::new();
        context.executable_path = executable_path.map(Path::to_path_buf);
        context.loader_path = node.loader_path().map(Path::to_path_buf);
        let mut own_rpaths = Vec::new();
        for macho in &node.file.headers {
            for rpath in macho.rpaths() {
                if !own_rpaths.iter().any(|own: &String| own == rpath) {
                    own_rpaths.push(rpath.to_string());
                }
            }
        }
        context.rpaths = own_rpaths.clone();
        context.rpaths.extend(inherited_rpaths.iter().cloned());
        let mut next_rpaths: Vec<String> = own_rpaths
            .iter()
            .filter_map(|rpath| context.expand_rpath(rpath))
            .map(|path| path.to_string_lossy().into_owned())
            .collect();
        next_rpaths.extend(inherited_rpaths);

        let mut visits = Vec::new();
        let mut failures = Vec::new();
        for reference in node.file.dylib_references() {
            match self.resolver.find(reference, &context) {
                Ok(resolved) => {
                    log::trace!("{} -> {reference} -> {}", node.path.display(), resolved.display());
                    pending.push(PendingEdge {
                        from: id,
                        reference: reference.to_string(),
                        resolved: resolved.clone(),
                    });
                    visits.push(Visit {
                        path: resolved,
                        inherited_rpaths: next_rpaths.clone(),
                    });
                }
                Err(cause) => {
                    log::warn!("{}: cannot resolve {reference}: {cause}", node.path.display());
                    failures.push(error::Error::CyclicOrMissingDependency {
                        loader: node.path.clone(),
                        reference: reference.to_string(),
                        cause: Box::new(cause),
                    });
                }
            }
        }
        graph.failures.extend(failures);
        visits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(from: NodeId, to: NodeId) -> DependencyEdge {
        DependencyEdge {
            from,
            to,
            reference: String::new(),
            resolved: PathBuf::new(),
        }
    }

    #[test]
    fn queries_follow_edges() {
        let mut graph = DependencyGraph::default();
        for name in ["/a", "/b", "/c"] {
            let id = graph.nodes.len();
            graph.index.insert(PathBuf::from(name), id);
            graph.nodes.push(DependencyNode {
                path: PathBuf::from(name),
                data: vec![],
                file: MachFile {
                    path: None,
                    fat: None,
                    headers: vec![],
                },
            });
        }
        graph.roots.push(0);
        graph.edges = vec![edge(0, 1), edge(0, 2), edge(1, 2)];

        assert_eq!(graph.node_id("/b"), Some(1));
        assert!(graph.node("/nope").is_none());
        let deps: Vec<_> = graph.dependencies(0).map(|node| node.path.clone()).collect();
        assert_eq!(deps, [PathBuf::from("/b"), PathBuf::from("/c")]);
        let dependents: Vec<_> = graph.dependents(2).map(|node| node.path.clone()).collect();
        assert_eq!(dependents, [PathBuf::from("/a"), PathBuf::from("/b")]);
        assert_eq!(graph.edges_from(1).count(), 1);
        assert_eq!(graph.roots(), [0]);
        assert!(!graph.nodes()[0].is_executable());
    }

    #[test]
    fn unreadable_root_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let builder = GraphBuilder::new(DyldResolver::default().without_fallback_probe());
        assert!(builder.build([dir.path().join("missing")]).is_err());
    }
}
