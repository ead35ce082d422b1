//! Dependency-ordered processor resolution.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use crate::error::ResolveError;
use crate::processor::SharedProcessor;

/// Processors available for automatic insertion when a requested processor depends on
/// something that was not requested.
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    processors: BTreeMap<String, SharedProcessor>,
}

impl ProcessorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `processor` under its name, replacing any previous entry.
    pub fn register(&mut self, processor: SharedProcessor) -> &mut Self {
        self.processors
            .insert(processor.name().to_string(), processor);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SharedProcessor> {
        self.processors.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.processors.keys().map(String::as_str)
    }
}

impl fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.processors.keys()).finish()
    }
}

pub struct Resolution {
    /// Dependency-first execution order.
    pub processors: Vec<SharedProcessor>,
    /// Names inserted from the registry, in insertion order.
    pub auto_added: Vec<String>,
}

impl Resolution {
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.processors.iter().map(|processor| processor.name()).collect()
    }
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolution")
            .field("processors", &self.names())
            .field("auto_added", &self.auto_added)
            .finish()
    }
}

/// Orders `requested` so every processor runs after its dependencies.
///
/// Dependencies missing from `requested` are pulled from `registry`, transitively.
/// Among processors whose dependencies are satisfied, the one listed (or inserted)
/// first runs first.
pub fn resolve(
    requested: Vec<SharedProcessor>,
    registry: &ProcessorRegistry,
) -> Result<Resolution, ResolveError> {
    let mut nodes = Vec::with_capacity(requested.len());
    let mut index: HashMap<String, usize> = HashMap::new();
    for processor in requested {
        let name = processor.name().to_string();
        if index.contains_key(&name) {
            return Err(ResolveError::DuplicateProcessor { name });
        }
        index.insert(name, nodes.len());
        nodes.push(processor);
    }

    let mut auto_added = Vec::new();
    let mut cursor = 0;
    while cursor < nodes.len() {
        let owner = nodes[cursor].name().to_string();
        let dependencies = nodes[cursor].dependencies().to_vec();
        for dependency in dependencies {
            if index.contains_key(dependency) {
                continue;
            }
            let Some(found) = registry.get(dependency) else {
                return Err(ResolveError::MissingDependency {
                    processor: owner,
                    dependency: dependency.to_string(),
                });
            };
            index.insert(dependency.to_string(), nodes.len());
            auto_added.push(dependency.to_string());
            nodes.push(SharedProcessor::clone(found));
        }
        cursor += 1;
    }

    let edges: Vec<Vec<usize>> = nodes
        .iter()
        .map(|processor| {
            processor
                .dependencies()
                .iter()
                .filter_map(|dependency| index.get(*dependency).copied())
                .collect()
        })
        .collect();

    let mut in_degree: Vec<usize> = edges.iter().map(Vec::len).collect();
    let mut dependents = vec![Vec::new(); nodes.len()];
    for (node, deps) in edges.iter().enumerate() {
        for &dep in deps {
            dependents[dep].push(node);
        }
    }

    let mut ready: BTreeSet<usize> = (0..nodes.len())
        .filter(|&node| in_degree[node] == 0)
        .collect();
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(node) = ready.pop_first() {
        order.push(node);
        for &dependent in &dependents[node] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    if order.len() < nodes.len() {
        let drained: BTreeSet<usize> = order.iter().copied().collect();
        let cycle = find_cycle(&edges, &drained)
            .into_iter()
            .map(|node| nodes[node].name().to_string())
            .collect();
        return Err(ResolveError::CircularDependency { cycle });
    }

    let mut slots: Vec<Option<SharedProcessor>> = nodes.into_iter().map(Some).collect();
    let processors = order
        .into_iter()
        .filter_map(|node| slots[node].take())
        .collect();

    Ok(Resolution {
        processors,
        auto_added,
    })
}

/// Depth-first search over the nodes Kahn's pass could not drain. Every such node
/// sits on or leads to a cycle, so the search always closes one. The returned path
/// starts and ends on the same node.
fn find_cycle(edges: &[Vec<usize>], drained: &BTreeSet<usize>) -> Vec<usize> {
    let Some(start) = (0..edges.len()).find(|node| !drained.contains(node)) else {
        return Vec::new();
    };

    let mut path = vec![start];
    let mut on_path = vec![false; edges.len()];
    let mut visited = vec![false; edges.len()];
    let mut next_edge = vec![0usize; edges.len()];
    on_path[start] = true;
    visited[start] = true;

    while let Some(&node) = path.last() {
        let candidates = &edges[node];
        let Some(&dep) = candidates.get(next_edge[node]) else {
            on_path[node] = false;
            path.pop();
            continue;
        };
        next_edge[node] += 1;

        if drained.contains(&dep) {
            continue;
        }
        if on_path[dep] {
            let begin = path.iter().position(|&entry| entry == dep).unwrap_or(0);
            let mut cycle = path[begin..].to_vec();
            cycle.push(dep);
            return cycle;
        }
        if !visited[dep] {
            visited[dep] = true;
            on_path[dep] = true;
            path.push(dep);
        }
    }

    Vec::new()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::frame::Frame;
    use crate::processor::{ProcessContext, Processor};

    struct Stub {
        name: &'static str,
        deps: Vec<&'static str>,
    }

    impl Processor for Stub {
        fn name(&self) -> &str {
            self.name
        }

        fn dependencies(&self) -> &[&'static str] {
            &self.deps
        }

        fn process(&self, frame: &Arc<Frame>, _ctx: &ProcessContext) -> Arc<Frame> {
            Arc::clone(frame)
        }
    }

    fn stub(name: &'static str, deps: &[&'static str]) -> SharedProcessor {
        Arc::new(Stub {
            name,
            deps: deps.to_vec(),
        })
    }

    #[test]
    fn orders_dependencies_first() {
        let resolution = resolve(
            vec![stub("math", &["markdown"]), stub("markdown", &[])],
            &ProcessorRegistry::new(),
        )
        .unwrap();
        assert_eq!(resolution.names(), vec!["markdown", "math"]);
        assert!(resolution.auto_added.is_empty());
    }

    #[test]
    fn keeps_input_order_among_independent_processors() {
        let resolution = resolve(
            vec![
                stub("markdown", &[]),
                stub("highlight", &["markdown"]),
                stub("mermaid", &["markdown"]),
                stub("math", &["markdown"]),
            ],
            &ProcessorRegistry::new(),
        )
        .unwrap();
        assert_eq!(
            resolution.names(),
            vec!["markdown", "highlight", "mermaid", "math"]
        );
    }

    #[test]
    fn auto_inserts_transitive_dependencies_from_registry() {
        let mut registry = ProcessorRegistry::new();
        registry
            .register(stub("markdown", &["normalize"]))
            .register(stub("normalize", &[]));

        let resolution = resolve(vec![stub("highlight", &["markdown"])], &registry).unwrap();
        assert_eq!(resolution.names(), vec!["normalize", "markdown", "highlight"]);
        assert_eq!(resolution.auto_added, vec!["markdown", "normalize"]);
    }

    #[test]
    fn rejects_duplicates() {
        let err = resolve(
            vec![stub("markdown", &[]), stub("markdown", &[])],
            &ProcessorRegistry::new(),
        )
        .err();
        assert_matches!(err, Some(ResolveError::DuplicateProcessor { name }) if name == "markdown");
    }

    #[test]
    fn reports_missing_dependency_with_owner() {
        let err = resolve(vec![stub("math", &["katex"])], &ProcessorRegistry::new()).err();
        assert_matches!(
            err,
            Some(ResolveError::MissingDependency { processor, dependency })
                if processor == "math" && dependency == "katex"
        );
    }

    #[test]
    fn reports_real_cycle_path() {
        let err = resolve(
            vec![
                stub("root", &[]),
                stub("a", &["root", "b"]),
                stub("b", &["c"]),
                stub("c", &["a"]),
            ],
            &ProcessorRegistry::new(),
        )
        .err();
        assert_matches!(
            err,
            Some(ResolveError::CircularDependency { cycle }) if cycle == ["a", "b", "c", "a"]
        );
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let err = resolve(vec![stub("loop", &["loop"])], &ProcessorRegistry::new()).err();
        assert_matches!(
            err,
            Some(ResolveError::CircularDependency { cycle }) if cycle == ["loop", "loop"]
        );
    }

    #[test]
    fn nodes_downstream_of_cycle_start_search_elsewhere() {
        // "tail" is undrained only because it depends on the cycle.
        let err = resolve(
            vec![stub("tail", &["x"]), stub("x", &["y"]), stub("y", &["x"])],
            &ProcessorRegistry::new(),
        )
        .err();
        assert_matches!(
            err,
            Some(ResolveError::CircularDependency { cycle }) if cycle == ["x", "y", "x"]
        );
    }
}
