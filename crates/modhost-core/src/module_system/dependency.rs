use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::module_system::descriptor::ModuleDescriptor;

/// Structural problems in a module descriptor set.
///
/// These are configuration errors: never retried, and every offending entry is
/// reported, not just the first.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DependencyError {
    #[error("Module descriptor has an empty name")]
    EmptyModuleName,

    #[error("Duplicate module name(s): {}", .0.join(", "))]
    DuplicateModule(Vec<String>),

    /// module -> names it depends on that are not in the set
    #[error("Missing dependencies: {}", format_missing(.0))]
    MissingDependencies(BTreeMap<String, Vec<String>>),

    /// Each cycle starts and ends with the same name
    #[error("Circular dependency detected: {}", format_cycles(.0))]
    CyclicDependencies(Vec<Vec<String>>),
}

fn format_missing(missing: &BTreeMap<String, Vec<String>>) -> String {
    missing
        .iter()
        .map(|(module, deps)| format!("{}: [{}]", module, deps.join(", ")))
        .collect::<Vec<_>>()
        .join("; ")
}

fn format_cycles(cycles: &[Vec<String>]) -> String {
    cycles
        .iter()
        .map(|cycle| cycle.join(" -> "))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Computes a deterministic load order for a set of module descriptors.
///
/// Resolution is pure: the same input always yields the same order. Checks run
/// in a fixed sequence (names, missing dependencies, cycles) and the first
/// failing check is reported in full.
pub struct DependencyResolver;

impl DependencyResolver {
    /// Resolve descriptors into load order (dependencies first, ties by ascending name).
    pub fn resolve<'a, I>(descriptors: I) -> Result<Vec<String>, DependencyError>
    where
        I: IntoIterator<Item = &'a ModuleDescriptor>,
    {
        let graph = build_graph(descriptors)?;
        check_missing(&graph)?;

        let cycles = find_cycles(&graph);
        if !cycles.is_empty() {
            return Err(DependencyError::CyclicDependencies(cycles));
        }

        Ok(topological_order(&graph))
    }
}

type Graph<'a> = BTreeMap<&'a str, &'a BTreeSet<String>>;

fn build_graph<'a, I>(descriptors: I) -> Result<Graph<'a>, DependencyError>
where
    I: IntoIterator<Item = &'a ModuleDescriptor>,
{
    let mut graph = Graph::new();
    let mut duplicates = BTreeSet::new();
    for descriptor in descriptors {
        if descriptor.name.is_empty() {
            return Err(DependencyError::EmptyModuleName);
        }
        if graph
            .insert(descriptor.name.as_str(), &descriptor.dependencies)
            .is_some()
        {
            duplicates.insert(descriptor.name.clone());
        }
    }
    if !duplicates.is_empty() {
        return Err(DependencyError::DuplicateModule(duplicates.into_iter().collect()));
    }
    Ok(graph)
}

fn check_missing(graph: &Graph<'_>) -> Result<(), DependencyError> {
    let missing: BTreeMap<String, Vec<String>> = graph
        .iter()
        .filter_map(|(name, deps)| {
            let absent: Vec<String> = deps
                .iter()
                .filter(|dep| !graph.contains_key(dep.as_str()))
                .cloned()
                .collect();
            (!absent.is_empty()).then(|| (name.to_string(), absent))
        })
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(DependencyError::MissingDependencies(missing))
    }
}

/// Depth-first walk over every component, recording the path slice each time
/// an edge leads back into the node stack.
struct CycleFinder<'g, 'a> {
    graph: &'g Graph<'a>,
    path: Vec<&'a str>,
    done: BTreeSet<&'a str>,
    cycles: Vec<Vec<String>>,
}

impl<'g, 'a> CycleFinder<'g, 'a> {
    fn visit(&mut self, node: &'a str) {
        let graph = self.graph;
        self.path.push(node);
        if let Some(deps) = graph.get(node) {
            let deps: &'a BTreeSet<String> = *deps;
            for dep in deps {
                let dep = dep.as_str();
                if let Some(start) = self.path.iter().position(|n| *n == dep) {
                    let mut cycle: Vec<String> =
                        self.path[start..].iter().map(|n| n.to_string()).collect();
                    cycle.push(dep.to_string());
                    self.cycles.push(cycle);
                } else if !self.done.contains(dep) && graph.contains_key(dep) {
                    self.visit(dep);
                }
            }
        }
        self.path.pop();
        self.done.insert(node);
    }
}

fn find_cycles(graph: &Graph<'_>) -> Vec<Vec<String>> {
    let mut finder = CycleFinder {
        graph,
        path: Vec::new(),
        done: BTreeSet::new(),
        cycles: Vec::new(),
    };
    for name in graph.keys() {
        if !finder.done.contains(name) {
            finder.visit(*name);
        }
    }
    finder.cycles
}

/// Kahn's algorithm with a sorted ready set.
fn topological_order(graph: &Graph<'_>) -> Vec<String> {
    let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (name, deps) in graph {
        in_degree.insert(*name, deps.len());
        for dep in deps.iter() {
            dependents.entry(dep.as_str()).or_default().push(*name);
        }
    }

    let mut ready: BTreeSet<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(name, _)| *name)
        .collect();
    let mut order = Vec::with_capacity(graph.len());

    while let Some(name) = ready.pop_first() {
        order.push(name.to_string());
        for dependent in dependents.get(name).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(*dependent);
                }
            }
        }
    }
    order
}
