use std::collections::HashSet;

use super::manifest::{Dependencies, Node};
use crate::error::{Error, Result};

/// Execution order for `nodes`.
///
/// Each round places the earliest-declared node whose dependencies are all
/// placed, then rescans from the start. A round that places nothing ends the
/// scan: the remaining nodes depend on a cycle or on a node that does not
/// exist, and are reported in declaration order.
pub fn order(nodes: &[Node], dependencies: &Dependencies) -> Result<Vec<String>> {
    let total = nodes
        .iter()
        .map(|n| n.id.as_str())
        .collect::<HashSet<_>>()
        .len();
    let mut placed: HashSet<&str> = HashSet::with_capacity(total);
    let mut ordered = Vec::with_capacity(total);

    while ordered.len() < total {
        let ready = nodes.iter().find(|node| {
            !placed.contains(node.id.as_str())
                && dependencies
                    .get(&node.id)
                    .is_none_or(|deps| deps.iter().all(|dep| placed.contains(dep.as_str())))
        });

        match ready {
            Some(node) => {
                placed.insert(node.id.as_str());
                ordered.push(node.id.clone());
            }
            None => {
                let mut seen = HashSet::new();
                let unresolved = nodes
                    .iter()
                    .filter(|n| !placed.contains(n.id.as_str()) && seen.insert(n.id.as_str()))
                    .map(|n| n.id.clone())
                    .collect();
                return Err(Error::graph_cycle(unresolved));
            }
        }
    }

    Ok(ordered)
}
