//! Retargeting a dependency graph so it can be shipped inside an application bundle
//!
//! [`bundle_path_map`] decides where each non-system dependency will live relative to the
//! executable, and [`rewrite_for_standalone`] produces a binary's bytes with its install name
//! and dylib references pointing there. Nothing here touches the filesystem; copying the files
//! into the bundle is left to the caller.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::dyld::{self, names};
use crate::error;
use crate::graph::{DependencyGraph, NodeId};

/// Where bundled libraries go by default, relative to an executable in `Contents/MacOS`
pub const DEFAULT_BUNDLE_PREFIX: &str = "@executable_path/../Frameworks";

/// Resolved path of a dependency to the reference string it is rewritten to
pub type PathMap = HashMap<PathBuf, String>;

/// Whether `path` belongs to the operating system and is never bundled
pub fn is_system_path<P: AsRef<Path>>(path: P) -> bool {
    let path = dyld::normalize_path(path);
    if path.starts_with("/usr/local") {
        return false;
    }
    path.starts_with("/usr/lib") || path.starts_with("/System")
}

/// The bundle-relative location of `path`: the framework-relative name for framework
/// binaries, the file name otherwise
fn bundle_name(path: &Path) -> Option<String> {
    let path = path.to_str()?;
    if let Some(info) = names::framework_info(path) {
        return Some(info.name.to_string());
    }
    let name = names::basename(path);
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Maps every node of `graph` that is neither a root nor a system library to
/// `<prefix>/<name>`. When two libraries share a name the first one discovered keeps it.
pub fn bundle_path_map(graph: &DependencyGraph, prefix: &str) -> PathMap {
    let prefix = prefix.trim_end_matches('/');
    let mut map = PathMap::new();
    let mut taken: HashMap<String, &Path> = HashMap::new();
    for (id, node) in graph.nodes().iter().enumerate() {
        if graph.roots().contains(&id) || is_system_path(&node.path) {
            continue;
        }
        let Some(name) = bundle_name(&node.path) else {
            log::warn!("{} has no usable file name", node.path.display());
            continue;
        };
        if let Some(other) = taken.get(&name) {
            log::warn!(
                "{} and {} would both be bundled as {name}; keeping the first",
                other.display(),
                node.path.display()
            );
            continue;
        }
        map.insert(node.path.clone(), format!("{prefix}/{name}"));
        taken.insert(name, &node.path);
    }
    map
}

/// The bytes of node `id` with its install name and dylib references rewritten through
/// `path_map`. References to libraries absent from the map, and every other command, are
/// left byte for byte as they were.
pub fn rewrite_for_standalone(
    graph: &DependencyGraph,
    id: NodeId,
    path_map: &PathMap,
) -> error::Result<Vec<u8>> {
    let node = graph
        .get(id)
        .ok_or_else(|| error::Error::Malformed(format!("the graph has no node {id}")))?;
    let targets: HashMap<&str, &str> = graph
        .edges_from(id)
        .filter_map(|edge| {
            path_map
                .get(&edge.resolved)
                .map(|target| (edge.reference.as_str(), target.as_str()))
        })
        .collect();
    let install_name = path_map.get(&node.path);

    let mut file = node.file.clone();
    let mut changed = false;
    for macho in &mut file.headers {
        if let Some(name) = install_name {
            changed |= macho.rewrite_install_name(name)?;
        }
        let updates: Vec<(usize, String)> = macho
            .walk_relocatables()
            .filter_map(|(index, name, _)| targets.get(name).map(|target| (index, target.to_string())))
            .collect();
        for (index, name) in updates {
            changed |= macho.rewrite_data_for_command(index, &name)?;
        }
    }
    if changed {
        log::debug!("rewrote load commands of {}", node.path.display());
        file.to_image(&node.data)
    } else {
        Ok(node.data.clone())
    }
}

/// Rewritten bytes for every root and every node in `path_map`, ready to be written out
pub fn rewrite_graph(
    graph: &DependencyGraph,
    path_map: &PathMap,
) -> error::Result<Vec<(NodeId, Vec<u8>)>> {
    let mut images = Vec::new();
    for (id, node) in graph.nodes().iter().enumerate() {
        if graph.roots().contains(&id) || path_map.contains_key(&node.path) {
            images.push((id, rewrite_for_standalone(graph, id, path_map)?));
        }
    }
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_paths() {
        assert!(is_system_path("/usr/lib/libSystem.B.dylib"));
        assert!(is_system_path("/System/Library/Frameworks/Cocoa.framework/Cocoa"));
        assert!(!is_system_path("/usr/local/lib/libpng.dylib"));
        assert!(!is_system_path("/usr/libexec/foo"));
        assert!(!is_system_path("/opt/homebrew/lib/libz.dylib"));
        assert!(!is_system_path("/Library/Frameworks/Python.framework/Python"));
        assert!(!is_system_path("/usr/lib/../local/lib/libpng.dylib"));
        assert!(is_system_path("/usr/local/../lib/libz.dylib"));
    }

    #[test]
    fn bundle_names() {
        assert_eq!(
            bundle_name(Path::new("/opt/lib/libpng.16.dylib")).as_deref(),
            Some("libpng.16.dylib")
        );
        assert_eq!(
            bundle_name(Path::new("/Library/Frameworks/Foo.framework/Versions/A/Foo")).as_deref(),
            Some("Foo.framework/Versions/A/Foo")
        );
    }

    #[test]
    fn empty_graph() {
        let graph = DependencyGraph::default();
        assert!(bundle_path_map(&graph, DEFAULT_BUNDLE_PREFIX).is_empty());
        assert!(rewrite_for_standalone(&graph, 0, &PathMap::new()).is_err());
        assert!(rewrite_graph(&graph, &PathMap::new()).unwrap().is_empty());
    }
}
