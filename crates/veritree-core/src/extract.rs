//! Hierarchy extraction: top-module detection and tree building over an
//! elaborated netlist.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::hier::HierarchyNode;
use crate::netlist::{Connection, ExtractError, Netlist};

/// How the top module was chosen. Everything below `SoleRoot` is
/// best-effort and should be surfaced, not silently trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TopDetection {
    /// The elaboration tool flagged it.
    Flagged,
    /// Exactly one module is never instantiated.
    SoleRoot,
    /// Several never-instantiated roots; picked the lexicographically first.
    MultiRoot,
    /// Name-similarity fallback against the input's base identifier.
    NameHint,
    /// Degraded outcome: first known module.
    Fallback,
}

impl TopDetection {
    pub fn best_effort(&self) -> bool {
        matches!(
            self,
            TopDetection::MultiRoot | TopDetection::NameHint | TopDetection::Fallback
        )
    }
}

/// The extractor's output: the tree plus how much to trust its root.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub tree: HierarchyNode,
    pub top_module: String,
    pub detection: TopDetection,
}

/// Picks the top module. `base_hint` is the input's base identifier (the XML
/// file stem), used only by the name-similarity fallback.
pub fn detect_top(netlist: &Netlist, base_hint: &str) -> Result<(String, TopDetection), ExtractError> {
    if netlist.modules.is_empty() {
        return Err(ExtractError::no_top_module("netlist has no modules"));
    }

    // 1. Explicit flag. BTreeMap iteration makes ties deterministic.
    if let Some(name) = netlist
        .modules
        .values()
        .find(|m| m.is_top)
        .map(|m| m.name.clone())
    {
        return Ok((name, TopDetection::Flagged));
    }

    // 2. Roots of the instantiation forest.
    let instantiated = netlist.instantiated_types();
    let roots: Vec<&String> = netlist
        .modules
        .keys()
        .filter(|name| !instantiated.contains(*name))
        .collect();
    match roots.as_slice() {
        [] => {}
        [sole] => return Ok(((*sole).clone(), TopDetection::SoleRoot)),
        [first, ..] => return Ok(((*first).clone(), TopDetection::MultiRoot)),
    }

    // 3. Name similarity: cyclic or incomplete input has no roots. The hint
    //    drops one leading elaborator `V` prefix before matching.
    let hint = base_hint.strip_prefix('V').unwrap_or(base_hint).to_lowercase();
    if !hint.is_empty() {
        if let Some(name) = netlist
            .modules
            .keys()
            .find(|name| name.to_lowercase().contains(&hint))
        {
            return Ok((name.clone(), TopDetection::NameHint));
        }
    }

    // 4. First known module.
    let first = netlist.modules.keys().next().cloned();
    match first {
        Some(name) => Ok((name, TopDetection::Fallback)),
        None => Err(ExtractError::no_top_module("netlist has no modules")),
    }
}

/// Builds the Tree Model rooted at the detected top module.
pub fn extract(netlist: &Netlist, base_hint: &str) -> Result<Extraction, ExtractError> {
    let (top_module, detection) = detect_top(netlist, base_hint)?;
    let mut path = Vec::new();
    let tree = build_node(netlist, &top_module, "Top", None, &mut path);
    Ok(Extraction {
        tree,
        top_module,
        detection,
    })
}

/// `path` is the module-name ancestor chain; re-entering a module already on
/// it truncates the subtree (the node is emitted, its children are not).
fn build_node(
    netlist: &Netlist,
    module_name: &str,
    instance_name: &str,
    connections: Option<&[Connection]>,
    path: &mut Vec<String>,
) -> HierarchyNode {
    let mut node = HierarchyNode::new(module_name, instance_name);

    let module = netlist.modules.get(module_name);
    if let Some(module) = module {
        node.file_path = module.file_path.clone();
    }

    node.ports = match connections {
        // Instantiated submodule: the connection list.
        Some(conns) => conns.iter().map(Connection::render).collect(),
        // Root/standalone module: its bare declared port names.
        None => module
            .map(|m| m.ports.iter().map(|p| p.name.clone()).collect())
            .unwrap_or_default(),
    };

    let Some(module) = module else {
        // Unknown module type: leaf with whatever connections were given.
        return node;
    };
    if path.iter().any(|m| m == module_name) {
        // Self-instantiation, direct or transitive.
        return node;
    }

    path.push(module_name.to_string());
    for instance in &module.instances {
        node.instances.push(build_node(
            netlist,
            &instance.module,
            &instance.name,
            Some(&instance.connections),
            path,
        ));
    }
    path.pop();
    node
}

/// Sibling instance-name collisions in a built tree. Collisions are not
/// defined behavior; the comparator folds them last-writer-wins, and this
/// surfaces them as anomalies.
pub fn sibling_collisions(node: &HierarchyNode) -> Vec<String> {
    let mut out = Vec::new();
    collect_collisions(node, &mut out);
    out
}

fn collect_collisions(node: &HierarchyNode, out: &mut Vec<String>) {
    let mut seen = BTreeSet::new();
    for child in &node.instances {
        if !seen.insert(child.instance_name.as_str()) {
            out.push(format!(
                "duplicate instance name {:?} under {} ({})",
                child.instance_name, node.instance_name, node.module_name
            ));
        }
    }
    for child in &node.instances {
        collect_collisions(child, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlist::parse_netlist_xml;

    fn netlist(xml: &str) -> Netlist {
        parse_netlist_xml(xml).expect("parse fixture")
    }

    const FLAGGED: &str = r#"<netlist>
      <module name="zz_top" topModule="1" loc="a,1,1,1,1">
        <var name="clk" dir="input" vartype="logic"/>
        <instance name="u1" defName="leaf">
          <port name="clk"><varref name="clk"/></port>
        </instance>
      </module>
      <module name="leaf">
        <var name="clk" dir="input" vartype="logic"/>
      </module>
    </netlist>"#;

    #[test]
    fn explicit_flag_wins() {
        let (top, det) = detect_top(&netlist(FLAGGED), "Vwhatever").expect("top");
        assert_eq!(top, "zz_top");
        assert_eq!(det, TopDetection::Flagged);
        assert!(!det.best_effort());
    }

    #[test]
    fn sole_root_is_detected_regardless_of_listing_order() {
        for xml in [
            r#"<netlist>
                 <module name="alpha"><instance name="u" defName="beta"/></module>
                 <module name="beta"/>
               </netlist>"#,
            r#"<netlist>
                 <module name="beta"/>
                 <module name="alpha"><instance name="u" defName="beta"/></module>
               </netlist>"#,
        ] {
            let (top, det) = detect_top(&netlist(xml), "Vx").expect("top");
            assert_eq!(top, "alpha");
            assert_eq!(det, TopDetection::SoleRoot);
        }
    }

    #[test]
    fn several_roots_pick_first_and_flag_best_effort() {
        let xml = r#"<netlist><module name="b"/><module name="a"/></netlist>"#;
        let (top, det) = detect_top(&netlist(xml), "Vx").expect("top");
        assert_eq!(top, "a");
        assert_eq!(det, TopDetection::MultiRoot);
        assert!(det.best_effort());
    }

    #[test]
    fn name_hint_kicks_in_when_roots_are_empty() {
        // a and b instantiate each other, so the root set is empty.
        let xml = r#"<netlist>
          <module name="chip_core"><instance name="u" defName="other"/></module>
          <module name="other"><instance name="u" defName="chip_core"/></module>
        </netlist>"#;
        let (top, det) = detect_top(&netlist(xml), "Vchip_core").expect("top");
        assert_eq!(top, "chip_core");
        assert_eq!(det, TopDetection::NameHint);
        assert!(det.best_effort());
    }

    #[test]
    fn fallback_is_first_module_lexicographically() {
        let xml = r#"<netlist>
          <module name="m2"><instance name="u" defName="m1"/></module>
          <module name="m1"><instance name="u" defName="m2"/></module>
        </netlist>"#;
        let (top, det) = detect_top(&netlist(xml), "Vunrelated").expect("top");
        assert_eq!(top, "m1");
        assert_eq!(det, TopDetection::Fallback);
    }

    #[test]
    fn empty_netlist_has_no_top() {
        let err = detect_top(&Netlist::default(), "Vx").expect_err("must fail");
        assert_eq!(err.kind, crate::netlist::ExtractErrorKind::NoTopModule);
    }

    #[test]
    fn builds_tree_with_connection_ports() {
        let ex = extract(&netlist(FLAGGED), "Vzz_top").expect("extract");
        assert_eq!(ex.tree.module_name, "zz_top");
        assert_eq!(ex.tree.instance_name, "Top");
        assert_eq!(ex.tree.ports, vec!["clk".to_string()]);
        let u1 = &ex.tree.instances[0];
        assert_eq!(u1.module_name, "leaf");
        assert_eq!(u1.instance_name, "u1");
        assert_eq!(u1.ports, vec!["clk : clk".to_string()]);
    }

    #[test]
    fn unknown_module_type_yields_empty_leaf() {
        let xml = r#"<netlist>
          <module name="top" topModule="1">
            <instance name="u1" defName="ghost"/>
          </module>
        </netlist>"#;
        let ex = extract(&netlist(xml), "Vtop").expect("extract");
        let u1 = &ex.tree.instances[0];
        assert_eq!(u1.module_name, "ghost");
        assert!(u1.ports.is_empty());
        assert!(u1.instances.is_empty());
    }

    #[test]
    fn self_instantiation_terminates() {
        let xml = r#"<netlist>
          <module name="rec" topModule="1">
            <instance name="inner" defName="rec"/>
          </module>
        </netlist>"#;
        let ex = extract(&netlist(xml), "Vrec").expect("extract");
        assert_eq!(ex.tree.instances.len(), 1);
        // The repeated occurrence is emitted but not descended into.
        assert!(ex.tree.instances[0].instances.is_empty());
    }

    #[test]
    fn transitive_self_instantiation_terminates() {
        let xml = r#"<netlist>
          <module name="a" topModule="1"><instance name="ub" defName="b"/></module>
          <module name="b"><instance name="ua" defName="a"/></module>
        </netlist>"#;
        let ex = extract(&netlist(xml), "Va").expect("extract");
        let b = &ex.tree.instances[0];
        assert_eq!(b.module_name, "b");
        let a_again = &b.instances[0];
        assert_eq!(a_again.module_name, "a");
        assert!(a_again.instances.is_empty());
    }

    #[test]
    fn repeated_type_at_distinct_sites_is_not_a_cycle() {
        let xml = r#"<netlist>
          <module name="top" topModule="1">
            <instance name="u1" defName="leaf"/>
            <instance name="u2" defName="leaf"/>
          </module>
          <module name="leaf"/>
        </netlist>"#;
        let ex = extract(&netlist(xml), "Vtop").expect("extract");
        assert_eq!(ex.tree.instances.len(), 2);
        assert_eq!(ex.tree.instances[0].module_name, "leaf");
        assert_eq!(ex.tree.instances[1].module_name, "leaf");
    }

    #[test]
    fn duplicate_sibling_instance_names_are_flagged() {
        let mut root = HierarchyNode::new("top", "Top");
        root.instances.push(HierarchyNode::new("a", "u"));
        root.instances.push(HierarchyNode::new("b", "u"));
        let anomalies = sibling_collisions(&root);
        assert_eq!(anomalies.len(), 1);
        assert!(anomalies[0].contains("\"u\""));
    }
}
