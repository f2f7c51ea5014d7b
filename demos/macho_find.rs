//! Lists the dependency graph of a Mach-o binary
//!
//! usage: macho_find <binary> [-v...] [--bundle]
//!
//! With `--bundle`, also prints where each non-system library would go inside an app bundle.

use std::env;
use std::process;

use machwalk::GraphBuilder;
use machwalk::dyld::DyldResolver;
use machwalk::standalone::{DEFAULT_BUNDLE_PREFIX, bundle_path_map};

fn run(path: &str, bundle: bool) -> machwalk::error::Result<()> {
    let resolver = DyldResolver::from_env();
    #[cfg(target_os = "macos")]
    let resolver = resolver.with_system_shared_cache();
    let graph = GraphBuilder::new(resolver).build([path])?;
    for (id, node) in graph.nodes().iter().enumerate() {
        println!("{}", node.path.display());
        for edge in graph.edges_from(id) {
            println!("\t{} -> {}", edge.reference, edge.resolved.display());
        }
    }
    for failure in graph.failures() {
        eprintln!("unresolved: {failure}");
    }
    if bundle {
        let map = bundle_path_map(&graph, DEFAULT_BUNDLE_PREFIX);
        let mut entries: Vec<_> = map.iter().collect();
        entries.sort();
        for (path, target) in entries {
            println!("{} => {target}", path.display());
        }
    }
    Ok(())
}

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    let verbosity: usize = args.iter().filter(|arg| arg.starts_with("-v")).map(|arg| arg.len() - 1).sum();
    stderrlog::new().verbosity(verbosity).init().unwrap();
    let bundle = args.iter().any(|arg| arg == "--bundle");
    let Some(path) = args.iter().find(|arg| !arg.starts_with('-')) else {
        eprintln!("usage: macho_find <binary> [-v...] [--bundle]");
        process::exit(2);
    };
    if let Err(err) = run(path, bundle) {
        eprintln!("{path}: {err}");
        process::exit(1);
    }
}
