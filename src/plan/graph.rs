//! Dependency graph checks over service descriptors.

use std::collections::{BTreeSet, HashMap, HashSet};

use super::{PlanError, ServiceDescriptor};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Name, command, readiness, dependency and cycle checks. Runs before any
/// ordering decision so a cyclic graph is always reported as a cycle.
pub(super) fn validate(descriptors: &[ServiceDescriptor]) -> Result<(), PlanError> {
    let index = index_by_name(descriptors)?;

    for d in descriptors {
        if d.start.command.trim().is_empty() {
            return Err(PlanError::EmptyCommand(d.name.clone()));
        }
        d.readiness
            .validate()
            .map_err(|source| PlanError::InvalidReadiness {
                service: d.name.clone(),
                source,
            })?;
        for dep in &d.depends_on {
            if !index.contains_key(dep.as_str()) {
                return Err(PlanError::UnknownDependency {
                    service: d.name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    if let Some(cycle) = find_cycle(descriptors, &index) {
        return Err(PlanError::Cycle(cycle));
    }
    Ok(())
}

/// Every predecessor must appear earlier than its dependent.
pub(super) fn check_order(descriptors: &[ServiceDescriptor]) -> Result<(), PlanError> {
    let mut seen: HashSet<&str> = HashSet::new();
    for d in descriptors {
        if let Some(dep) = d.depends_on.iter().find(|dep| !seen.contains(dep.as_str())) {
            return Err(PlanError::OutOfOrder {
                service: d.name.clone(),
                dependency: dep.clone(),
            });
        }
        seen.insert(d.name.as_str());
    }
    Ok(())
}

/// Kahn's algorithm, always taking the lowest input index that is ready.
/// Assumes `validate` passed.
pub(super) fn stable_topological_order(descriptors: &[ServiceDescriptor]) -> Vec<usize> {
    let index: HashMap<&str, usize> = descriptors
        .iter()
        .enumerate()
        .map(|(i, d)| (d.name.as_str(), i))
        .collect();

    let mut pending: Vec<usize> = descriptors.iter().map(|d| d.depends_on.len()).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); descriptors.len()];
    for (i, d) in descriptors.iter().enumerate() {
        for dep in &d.depends_on {
            dependents[index[dep.as_str()]].push(i);
        }
    }

    let mut ready: BTreeSet<usize> = (0..descriptors.len()).filter(|&i| pending[i] == 0).collect();
    let mut order = Vec::with_capacity(descriptors.len());
    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &dependent in &dependents[next] {
            pending[dependent] -= 1;
            if pending[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }
    order
}

fn index_by_name(descriptors: &[ServiceDescriptor]) -> Result<HashMap<&str, usize>, PlanError> {
    let mut index = HashMap::with_capacity(descriptors.len());
    for (i, d) in descriptors.iter().enumerate() {
        if d.name.trim().is_empty() {
            return Err(PlanError::EmptyName);
        }
        if index.insert(d.name.as_str(), i).is_some() {
            return Err(PlanError::DuplicateName(d.name.clone()));
        }
    }
    Ok(index)
}

/// Depth-first search; returns the first cycle found as a closed path
/// (first and last element equal).
fn find_cycle(descriptors: &[ServiceDescriptor], index: &HashMap<&str, usize>) -> Option<Vec<String>> {
    let mut marks = vec![Mark::Unvisited; descriptors.len()];
    let mut path = Vec::new();
    for start in 0..descriptors.len() {
        if marks[start] == Mark::Unvisited {
            if let Some(cycle) = visit(start, descriptors, index, &mut marks, &mut path) {
                return Some(cycle);
            }
        }
    }
    None
}

fn visit(
    node: usize,
    descriptors: &[ServiceDescriptor],
    index: &HashMap<&str, usize>,
    marks: &mut [Mark],
    path: &mut Vec<usize>,
) -> Option<Vec<String>> {
    marks[node] = Mark::InProgress;
    path.push(node);

    for dep in &descriptors[node].depends_on {
        let next = index[dep.as_str()];
        match marks[next] {
            Mark::InProgress => {
                let from = path.iter().position(|&n| n == next).unwrap_or(0);
                let mut cycle: Vec<String> = path[from..]
                    .iter()
                    .map(|&n| descriptors[n].name.clone())
                    .collect();
                cycle.push(descriptors[next].name.clone());
                return Some(cycle);
            }
            Mark::Unvisited => {
                if let Some(cycle) = visit(next, descriptors, index, marks, path) {
                    return Some(cycle);
                }
            }
            Mark::Done => {}
        }
    }

    path.pop();
    marks[node] = Mark::Done;
    None
}
