//! Pure-text projections of extraction results. None of these affect
//! comparison; callers decide where the rendered text goes.

use std::collections::BTreeSet;

use crate::hier::HierarchyNode;
use crate::netlist::Netlist;

/// Indented tree listing of a built hierarchy.
///
/// ```text
/// top
/// ├── u1(mod_a)
/// │   └── u2(mod_b)
/// └── u3(mod_a)
/// ```
pub fn hierarchy_text(tree: &HierarchyNode) -> String {
    let mut out = String::new();
    out.push_str(&tree.module_name);
    out.push('\n');
    render_children(tree, "", &mut out);
    out
}

fn render_children(node: &HierarchyNode, indent: &str, out: &mut String) {
    let last = node.instances.len().saturating_sub(1);
    for (i, child) in node.instances.iter().enumerate() {
        let (branch, next_indent) = if i == last {
            ("└── ", format!("{indent}    "))
        } else {
            ("├── ", format!("{indent}│   "))
        };
        out.push_str(indent);
        out.push_str(branch);
        out.push_str(&format!("{}({})\n", child.instance_name, child.module_name));
        render_children(child, &next_indent, out);
    }
}

/// Per-module port and connection listing over the whole netlist.
pub fn ports_text(netlist: &Netlist) -> String {
    let mut out = String::new();
    for module in netlist.modules.values() {
        out.push_str(&format!("Module: {}\n", module.name));
        out.push_str(&"=".repeat(50));
        out.push('\n');

        if !module.ports.is_empty() {
            out.push_str("Ports:\n");
            for port in &module.ports {
                out.push_str(&format!(
                    "  {}: {} ({})\n",
                    port.direction.as_str(),
                    port.name,
                    port.var_type
                ));
            }
        }

        if !module.instances.is_empty() {
            out.push_str("\nConnections:\n");
            for instance in &module.instances {
                out.push_str(&format!("  Submodule: {}\n", instance.name));
                for conn in &instance.connections {
                    out.push_str(&format!(
                        "    {} -> {}\n",
                        conn.port,
                        conn.signals.join(", ")
                    ));
                }
            }
        }

        out.push_str("\n\n");
    }
    out
}

/// Graphviz export of the module/instance graph reachable from `top`.
/// Module types are boxes, instantiation sites are ellipses. The visited set
/// keeps self-instantiating designs from recursing forever.
pub fn dot_text(netlist: &Netlist, top: &str) -> String {
    let mut out = String::new();
    out.push_str("digraph ModuleHierarchy {\n");
    out.push_str("  rankdir=LR;\n");
    out.push_str("  node [shape=box, style=filled, fillcolor=lightblue];\n\n");

    let mut visited = BTreeSet::new();
    add_module(netlist, top, &mut visited, &mut out);

    out.push_str("}\n");
    out
}

fn add_module(
    netlist: &Netlist,
    module_name: &str,
    visited: &mut BTreeSet<String>,
    out: &mut String,
) {
    if !visited.insert(module_name.to_string()) {
        return;
    }
    out.push_str(&format!("  \"{module_name}\";\n"));

    let Some(module) = netlist.modules.get(module_name) else {
        return;
    };
    for instance in &module.instances {
        let site = format!("{}.{}", module_name, instance.name);
        out.push_str(&format!(
            "  \"{site}\" [label=\"{}\\n({})\", shape=ellipse, fillcolor=lightgreen];\n",
            instance.name, instance.module
        ));
        out.push_str(&format!("  \"{module_name}\" -> \"{site}\" [style=dashed];\n"));
        out.push_str(&format!("  \"{site}\" -> \"{}\";\n", instance.module));
        add_module(netlist, &instance.module, visited, out);
    }
}
