//! Project dependency graph management using petgraph.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::project::Project;

/// Directed acyclic graph of project dependencies.
///
/// Edges point from a dependency to its dependant. Projects are stored in
/// build order: building them front to back never builds a project before
/// something it depends on.
#[derive(Debug)]
pub struct ProjectGraph {
    graph: DiGraph<String, ()>,
    projects: IndexMap<String, Project>,
    order: Vec<String>,
}

impl ProjectGraph {
    /// Creates a graph from projects given in discovery order.
    ///
    /// Dependency names that do not match a project are dropped with a
    /// warning. Projects without dependencies come first, in discovery order.
    ///
    /// # Errors
    ///
    /// Returns `CyclicDependency` naming the projects on a cycle, or
    /// `DuplicateProject` if two projects share a name.
    pub fn new(mut projects: Vec<Project>) -> Result<Self> {
        let mut known = HashSet::new();
        for project in &projects {
            if !known.insert(project.name.clone()) {
                return Err(Error::DuplicateProject(project.name.clone()));
            }
        }

        for project in &mut projects {
            project.dependencies =
                Self::resolve_declared(&project.name, &project.config.dependencies, &known);
            project.bundled_dependencies = Self::resolve_declared(
                &project.name,
                &project.config.bundled_dependencies,
                &known,
            );
        }

        let dependants: Vec<Vec<String>> = projects
            .iter()
            .map(|project| {
                projects
                    .iter()
                    .filter(|other| other.depends_on(&project.name))
                    .map(|other| other.name.clone())
                    .collect()
            })
            .collect();
        for (project, dependants) in projects.iter_mut().zip(dependants) {
            project.dependants = dependants;
        }

        let mut graph = DiGraph::new();
        let mut node_map: HashMap<String, NodeIndex> = HashMap::new();
        for project in &projects {
            let node = graph.add_node(project.name.clone());
            node_map.insert(project.name.clone(), node);
        }
        for project in &projects {
            let to_node = node_map[&project.name];
            for dep_name in project.all_dependencies() {
                let from_node = node_map[dep_name];
                graph.update_edge(from_node, to_node, ());
            }
        }

        let sorted = toposort(&graph, None).map_err(|_| Self::cycle_error(&graph))?;

        let roots: Vec<String> = projects
            .iter()
            .filter(|p| p.all_dependencies().next().is_none())
            .map(|p| p.name.clone())
            .collect();
        let root_set: HashSet<&str> = roots.iter().map(|s| s.as_str()).collect();
        let mut order = roots.clone();
        order.extend(
            sorted
                .into_iter()
                .map(|idx| graph[idx].clone())
                .filter(|name| !root_set.contains(name.as_str())),
        );

        let mut by_name: HashMap<String, Project> =
            projects.into_iter().map(|p| (p.name.clone(), p)).collect();

        let all_dependants: HashMap<String, Vec<String>> = order
            .iter()
            .map(|name| {
                let closure = Self::transitive_dependants(name, &by_name);
                let ordered = order
                    .iter()
                    .filter(|candidate| closure.contains(candidate.as_str()))
                    .cloned()
                    .collect();
                (name.clone(), ordered)
            })
            .collect();

        let mut ordered_projects = IndexMap::with_capacity(order.len());
        for name in &order {
            if let Some(mut project) = by_name.remove(name) {
                project.all_dependants = all_dependants.get(name).cloned().unwrap_or_default();
                ordered_projects.insert(name.clone(), project);
            }
        }

        debug!("Project build order:\n\t- {}", order.join("\n\t- "));

        Ok(Self {
            graph,
            projects: ordered_projects,
            order,
        })
    }

    fn resolve_declared(owner: &str, declared: &[String], known: &HashSet<String>) -> Vec<String> {
        declared
            .iter()
            .filter(|name| {
                let found = known.contains(name.as_str());
                if !found {
                    warn!(
                        "Could not find {} referenced as dependency for {}",
                        name, owner
                    );
                }
                found
            })
            .cloned()
            .collect()
    }

    fn cycle_error(graph: &DiGraph<String, ()>) -> Error {
        let mut participants: Vec<String> = tarjan_scc(graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || component
                        .first()
                        .map(|&idx| graph.contains_edge(idx, idx))
                        .unwrap_or(false)
            })
            .flatten()
            .map(|idx| graph[idx].clone())
            .collect();
        participants.sort();
        Error::CyclicDependency(participants.join(", "))
    }

    /// Walks `dependants` edges with a visited set, so it terminates even if
    /// handed cyclic data.
    fn transitive_dependants(name: &str, projects: &HashMap<String, Project>) -> HashSet<String> {
        let mut result = HashSet::new();
        let mut stack: Vec<&str> = projects
            .get(name)
            .map(|p| p.dependants.iter().map(|s| s.as_str()).collect())
            .unwrap_or_default();

        while let Some(current) = stack.pop() {
            if !result.insert(current.to_string()) {
                continue;
            }
            if let Some(project) = projects.get(current) {
                stack.extend(
                    project
                        .dependants
                        .iter()
                        .map(|s| s.as_str())
                        .filter(|d| !result.contains(*d)),
                );
            }
        }

        result.remove(name);
        result
    }

    fn not_found(&self, name: &str) -> Error {
        Error::ProjectNotFound {
            name: name.to_string(),
            available: self.order.join(", "),
        }
    }

    /// Retrieves a project by name.
    #[inline]
    pub fn get(&self, name: &str) -> Option<&Project> {
        self.projects.get(name)
    }

    /// Retrieves a project by name, failing with the list of known projects.
    pub fn project(&self, name: &str) -> Result<&Project> {
        self.get(name).ok_or_else(|| self.not_found(name))
    }

    /// Project names in build order.
    #[inline]
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Projects in build order.
    pub fn iter(&self) -> impl Iterator<Item = &Project> {
        self.projects.values()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.projects.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    /// Direct dependencies (including bundled ones) of a project.
    pub fn dependencies(&self, name: &str) -> Result<Vec<&str>> {
        Ok(self.project(name)?.all_dependencies().collect())
    }

    /// Projects that depend directly on `name`.
    pub fn dependants(&self, name: &str) -> Result<&[String]> {
        Ok(&self.project(name)?.dependants)
    }

    /// Every project depending on `name`, directly or not, in build order.
    pub fn all_dependants(&self, name: &str) -> Result<Vec<&Project>> {
        let project = self.project(name)?;
        Ok(project
            .all_dependants
            .iter()
            .filter_map(|n| self.get(n))
            .collect())
    }

    /// The changed projects plus all of their dependants, in build order.
    pub fn affected(&self, changed: &[String]) -> Result<Vec<&Project>> {
        let mut affected = HashSet::new();
        for name in changed {
            let project = self.project(name)?;
            affected.insert(project.name.as_str());
            affected.extend(project.all_dependants.iter().map(|s| s.as_str()));
        }
        Ok(self
            .iter()
            .filter(|p| affected.contains(p.name.as_str()))
            .collect())
    }

    /// The named projects in build order; every project when `names` is empty.
    pub fn select(&self, names: &[String]) -> Result<Vec<&Project>> {
        if names.is_empty() {
            return Ok(self.iter().collect());
        }
        for name in names {
            self.project(name)?;
        }
        Ok(self
            .iter()
            .filter(|p| names.iter().any(|n| n == &p.name))
            .collect())
    }

    /// `(dependency, dependant)` pairs.
    pub fn edges(&self) -> Vec<(String, String)> {
        self.graph
            .raw_edges()
            .iter()
            .map(|edge| {
                (
                    self.graph[edge.source()].clone(),
                    self.graph[edge.target()].clone(),
                )
            })
            .collect()
    }

    /// Width of the longest project name, used to align output prefixes.
    pub fn label_width(&self) -> usize {
        self.order.iter().map(|n| n.len()).max().unwrap_or(0)
    }
}
