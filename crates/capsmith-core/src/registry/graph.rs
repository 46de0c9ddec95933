//! Depth-first cycle detection over `depends_on` edges.
//!
//! Edges to ids missing from the map are ignored: partial registries load,
//! and unresolved references surface at resolution time instead.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use capsmith_types::descriptor::Descriptor;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Find a dependency cycle, returning the ids along it with the first id
/// repeated at the end (`a -> b -> a`). Returns `None` for a DAG.
///
/// Roots are visited in id order and edges in declaration order, so the
/// reported cycle is stable for a given registry.
pub fn find_cycle(descriptors: &BTreeMap<String, Arc<Descriptor>>) -> Option<Vec<String>> {
    let mut marks: HashMap<&str, Mark> = HashMap::with_capacity(descriptors.len());

    for root in descriptors.keys() {
        if marks.contains_key(root.as_str()) {
            continue;
        }

        // Explicit stack of (node, next edge index) keeps deep chains off the
        // call stack. `path` mirrors the nodes currently marked Visiting.
        let mut stack: Vec<(&str, usize)> = vec![(root.as_str(), 0)];
        let mut path: Vec<&str> = vec![root.as_str()];
        marks.insert(root.as_str(), Mark::Visiting);

        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            let deps = &descriptors[node].depends_on;
            if frame.1 >= deps.len() {
                marks.insert(node, Mark::Done);
                stack.pop();
                path.pop();
                continue;
            }

            let dep = deps[frame.1].as_str();
            frame.1 += 1;

            let Some((dep_key, _)) = descriptors.get_key_value(dep) else {
                continue;
            };

            match marks.get(dep_key.as_str()) {
                Some(Mark::Visiting) => {
                    // Back-edge: the cycle is the path suffix starting at dep.
                    let start = path.iter().position(|p| *p == dep).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        path[start..].iter().map(|s| (*s).to_owned()).collect();
                    cycle.push(dep.to_owned());
                    return Some(cycle);
                }
                Some(Mark::Done) => {}
                None => {
                    marks.insert(dep_key.as_str(), Mark::Visiting);
                    stack.push((dep_key.as_str(), 0));
                    path.push(dep_key.as_str());
                }
            }
        }
    }

    None
}
