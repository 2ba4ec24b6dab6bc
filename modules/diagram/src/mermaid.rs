//! Markdown document with an embedded Mermaid `flowchart LR`.

use infralink_core::{EdgeSet, Host};
use std::fmt::Write;

use crate::{by_group, connections, ident, NodeIds};

fn label(s: &str) -> String {
    s.replace('"', "#quot;")
}

pub fn render(hosts: &[&Host], edges: &EdgeSet) -> String {
    let mut out = String::from("# Infrastructure Topology\n\n```mermaid\nflowchart LR\n");
    let nodes = NodeIds::new(hosts);

    for (group, members) in by_group(hosts) {
        let _ = writeln!(out, "    subgraph {}[\"{}\"]", ident(group), label(group));
        for h in members {
            let _ = writeln!(out, "        {}[\"{}\"]", nodes.get(h.id().as_str()), label(h.canonical_name()));
        }
        out.push_str("    end\n");
    }

    out.push_str("\n    %% Connections\n");
    for c in connections(hosts, edges) {
        let arrow = if c.edge.is_critical() { "==>" } else { "-->" };
        let _ = writeln!(
            out,
            "    {} {}|{}| {}",
            nodes.get(c.source),
            arrow,
            label(c.edge.target_service()),
            nodes.get(c.target)
        );
    }

    out.push_str("```\n\n## Legend\n\n");
    out.push_str("- `==>` Critical connection\n");
    out.push_str("- `-->` Standard connection\n");
    out
}
