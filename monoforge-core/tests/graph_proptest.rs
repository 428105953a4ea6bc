use std::collections::HashMap;
use std::path::Path;

use monoforge_core::error::Error;
use monoforge_core::graph::ProjectGraph;
use monoforge_core::project::Project;
use proptest::prelude::*;

const NAMES: [&str; 6] = ["a", "b", "c", "d", "e", "f"];

/// Projects whose dependencies only point at earlier names, so the graph is
/// acyclic. The vector is shuffled to vary discovery order.
fn gen_acyclic_projects() -> impl Strategy<Value = Vec<Project>> {
    proptest::collection::vec(proptest::collection::vec(any::<bool>(), NAMES.len()), NAMES.len())
        .prop_map(|matrix| {
            NAMES
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    let deps: Vec<&str> = (0..i).filter(|&j| matrix[i][j]).map(|j| NAMES[j]).collect();
                    Project::new(*name, Path::new("/workspace")).with_dependencies(deps)
                })
                .collect::<Vec<_>>()
        })
        .prop_shuffle()
}

fn gen_any_projects() -> impl Strategy<Value = Vec<Project>> {
    proptest::collection::vec(proptest::collection::vec(any::<bool>(), NAMES.len()), NAMES.len())
        .prop_map(|matrix| {
            NAMES
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    let deps: Vec<&str> = (0..NAMES.len())
                        .filter(|&j| matrix[i][j])
                        .map(|j| NAMES[j])
                        .collect();
                    Project::new(*name, Path::new("/workspace")).with_dependencies(deps)
                })
                .collect::<Vec<_>>()
        })
}

proptest! {
    #[test]
    fn test_order_places_dependencies_first(projects in gen_acyclic_projects()) {
        let graph = ProjectGraph::new(projects).unwrap();
        let position: HashMap<&str, usize> = graph
            .order()
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.as_str(), idx))
            .collect();

        prop_assert_eq!(graph.order().len(), NAMES.len());
        for project in graph.iter() {
            for dep in project.all_dependencies() {
                prop_assert!(position[dep] < position[project.name.as_str()]);
            }
            for dependant in &project.all_dependants {
                prop_assert!(position[dependant.as_str()] > position[project.name.as_str()]);
            }
        }
    }

    #[test]
    fn test_all_dependants_follow_build_order(projects in gen_acyclic_projects()) {
        let graph = ProjectGraph::new(projects).unwrap();
        let order = graph.order();

        for project in graph.iter() {
            let positions: Vec<usize> = project
                .all_dependants
                .iter()
                .map(|d| order.iter().position(|n| n == d).unwrap())
                .collect();
            prop_assert!(positions.windows(2).all(|w| w[0] < w[1]));
            prop_assert!(!project.all_dependants.contains(&project.name));
        }
    }

    #[test]
    fn test_graph_is_either_ordered_or_cyclic(projects in gen_any_projects()) {
        match ProjectGraph::new(projects) {
            Ok(graph) => {
                let mut seen = std::collections::HashSet::new();
                for name in graph.order() {
                    prop_assert!(seen.insert(name.clone()), "Duplicate project in order: {}", name);
                }
                prop_assert_eq!(seen.len(), NAMES.len());
            }
            Err(Error::CyclicDependency(participants)) => {
                prop_assert!(!participants.is_empty());
            }
            Err(other) => prop_assert!(false, "unexpected error: {}", other),
        }
    }
}
