//! Graphviz DOT. Render with `dot -Tpng infrastructure.dot -o infrastructure.png`.

use infralink_core::{EdgeSet, Host};
use std::fmt::Write;

use crate::{by_group, connections, ident, NodeIds};

fn quote(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

pub fn render(hosts: &[&Host], edges: &EdgeSet) -> String {
    let mut out = String::from(
        "digraph Infrastructure {\n    rankdir=LR;\n    node [shape=box, style=filled, fillcolor=lightblue];\n    edge [fontsize=10];\n\n",
    );
    let nodes = NodeIds::new(hosts);

    for (group, members) in by_group(hosts) {
        let _ = writeln!(out, "    subgraph cluster_{} {{", ident(group));
        let _ = writeln!(out, "        label=\"{}\";", quote(group));
        out.push_str("        style=dashed;\n        color=gray;\n\n");
        for h in members {
            let fill = if h.is_active() { "lightblue" } else { "lightgray" };
            let _ = writeln!(
                out,
                "        n_{} [label=\"{}\", fillcolor={}];",
                nodes.get(h.id().as_str()),
                quote(h.canonical_name()),
                fill
            );
        }
        out.push_str("    }\n\n");
    }

    out.push_str("    // Connections\n");
    for c in connections(hosts, edges) {
        let style = if c.edge.is_critical() { "color=red, penwidth=2" } else { "color=black" };
        let _ = writeln!(
            out,
            "    n_{} -> n_{} [label=\"{}:{}\", {}];",
            nodes.get(c.source),
            nodes.get(c.target),
            quote(c.edge.target_service()),
            c.edge.target_port(),
            style
        );
    }
    out.push_str("}\n");
    out
}
