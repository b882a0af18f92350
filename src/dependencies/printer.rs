use std::collections::HashSet;
use std::fmt::Write;

use crate::dependencies::graph::{DependenciesGraph, DependencyEdge, DependencyNode};

const BACK_REFERENCE: &str = " (*)";

/// Renders the graph as a tree rooted at the verified plugin.
///
/// A node is expanded only the first time it is printed; later occurrences carry a `(*)`
/// marker. Missing dependencies are listed after the resolved ones.
pub fn pretty_print(graph: &DependenciesGraph) -> String {
    let mut out = String::new();
    let Some(root) = graph.root() else {
        return out;
    };
    let mut printed = HashSet::new();
    printed.insert(root.id.as_str());
    let _ = writeln!(out, "{}", root.label());
    print_children(graph, root, "", &mut printed, &mut out);
    out
}

enum Child<'a> {
    Resolved(&'a DependencyEdge, &'a DependencyNode),
    Missing(String),
}

fn sorted_children<'a>(graph: &'a DependenciesGraph, node: &'a DependencyNode) -> Vec<Child<'a>> {
    let mut edges: Vec<(&DependencyEdge, &DependencyNode)> = graph
        .edges_from(&node.id)
        .filter_map(|edge| graph.vertex(&edge.to).map(|target| (edge, target)))
        .collect();
    edges.sort_by(|(left_edge, left), (right_edge, right)| {
        edge_key(left_edge, left).cmp(&edge_key(right_edge, right))
    });
    let missing = node.missing.iter().map(|missing| {
        let optional = if missing.dependency.is_optional {
            " [optional]"
        } else {
            ""
        };
        Child::Missing(format!(
            "{}{optional} (missing: {})",
            missing.dependency.id, missing.reason
        ))
    });
    edges
        .into_iter()
        .map(|(edge, target)| Child::Resolved(edge, target))
        .chain(missing)
        .collect()
}

/// Mandatory first, module dependencies before plain ones, then target id, target version
/// and declared id.
fn edge_key<'a>(
    edge: &'a DependencyEdge,
    target: &'a DependencyNode,
) -> (bool, bool, &'a str, &'a str, &'a str) {
    (
        edge.dependency.is_optional,
        !edge.dependency.is_module,
        target.id.as_str(),
        target.version.as_str(),
        edge.dependency.id.as_str(),
    )
}

fn print_children<'a>(
    graph: &'a DependenciesGraph,
    node: &'a DependencyNode,
    prefix: &str,
    printed: &mut HashSet<&'a str>,
    out: &mut String,
) {
    let children = sorted_children(graph, node);
    let count = children.len();
    for (position, child) in children.into_iter().enumerate() {
        let last = position + 1 == count;
        let branch = if last { "\\--- " } else { "+--- " };
        match child {
            Child::Missing(text) => {
                let _ = writeln!(out, "{prefix}{branch}{text}");
            }
            Child::Resolved(edge, target) => {
                let mut line = target.label();
                if edge.dependency.is_optional {
                    line.push_str(" [optional]");
                }
                if edge.dependency.is_module {
                    let _ = write!(line, " [module {}]", edge.dependency.id);
                }
                if !printed.insert(target.id.as_str()) {
                    let _ = writeln!(out, "{prefix}{branch}{line}{BACK_REFERENCE}");
                    continue;
                }
                let _ = writeln!(out, "{prefix}{branch}{line}");
                let child_prefix = format!("{prefix}{}", if last { "     " } else { "|    " });
                print_children(graph, target, &child_prefix, printed, out);
            }
        }
    }
}
