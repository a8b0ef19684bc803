//! Elaborated-netlist model and its XML reader.
//!
//! The input is the elaboration tool's XML dump: a `<files>` id→filename map
//! and a flat list of `<module>` elements carrying declared ports (`<var>`),
//! the top-module flag, and `<instance>` children with per-port
//! `<varref>` connection lists.

use std::collections::BTreeMap;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractErrorKind {
    /// Input could not be read or parsed at all.
    Malformed,
    /// No top module was determinable even after every fallback.
    NoTopModule,
}

#[derive(Debug)]
pub struct ExtractError {
    pub kind: ExtractErrorKind,
    pub message: String,
}

impl ExtractError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        ExtractError {
            kind: ExtractErrorKind::Malformed,
            message: msg.into(),
        }
    }

    pub fn no_top_module(msg: impl Into<String>) -> Self {
        ExtractError {
            kind: ExtractErrorKind::NoTopModule,
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ExtractErrorKind::Malformed => write!(f, "malformed netlist: {}", self.message),
            ExtractErrorKind::NoTopModule => write!(f, "no top module: {}", self.message),
        }
    }
}

impl std::error::Error for ExtractError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDir {
    Input,
    Output,
    Inout,
}

impl PortDir {
    fn from_attr(s: &str) -> Option<PortDir> {
        match s {
            "input" => Some(PortDir::Input),
            "output" => Some(PortDir::Output),
            "inout" => Some(PortDir::Inout),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PortDir::Input => "input",
            PortDir::Output => "output",
            PortDir::Inout => "inout",
        }
    }
}

/// A declared port of a module (directional `<var>` entries only).
#[derive(Debug, Clone)]
pub struct PortDecl {
    pub name: String,
    pub direction: PortDir,
    pub var_type: String,
}

/// One port-to-signal connection of an instance. A port may fan out to
/// several signals.
#[derive(Debug, Clone)]
pub struct Connection {
    pub port: String,
    pub signals: Vec<String>,
}

impl Connection {
    /// `"port : sig"` / `"port : sig_a, sig_b"` wire form used in tree ports.
    pub fn render(&self) -> String {
        format!("{} : {}", self.port, self.signals.join(", "))
    }
}

/// A submodule instantiation inside a module body.
#[derive(Debug, Clone)]
pub struct InstanceDesc {
    pub name: String,
    /// Instantiated module-type name.
    pub module: String,
    pub connections: Vec<Connection>,
}

#[derive(Debug, Clone, Default)]
pub struct ModuleDesc {
    pub name: String,
    pub is_top: bool,
    /// Declaring file, resolved through the file-id map; empty when unknown.
    pub file_path: String,
    pub ports: Vec<PortDecl>,
    pub instances: Vec<InstanceDesc>,
}

/// The flat elaborated design: every module by name. Keyed by `BTreeMap` so
/// every table walk is deterministic. Duplicate module names fold
/// last-writer-wins.
#[derive(Debug, Clone, Default)]
pub struct Netlist {
    pub modules: BTreeMap<String, ModuleDesc>,
}

impl Netlist {
    pub fn from_file(path: &Path) -> Result<Netlist, ExtractError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ExtractError::malformed(format!("read {}: {e}", path.display())))?;
        parse_netlist_xml(&text)
    }

    /// Module-type names instantiated anywhere in the design.
    pub fn instantiated_types(&self) -> std::collections::BTreeSet<String> {
        self.modules
            .values()
            .flat_map(|m| m.instances.iter().map(|i| i.module.clone()))
            .collect()
    }
}

/// Parses the elaboration tool's XML dump into a [`Netlist`].
pub fn parse_netlist_xml(xml: &str) -> Result<Netlist, ExtractError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut files: BTreeMap<String, String> = BTreeMap::new();
    // loc file-ids are resolved after the walk; <files> may follow <module>s.
    let mut module_locs: BTreeMap<String, String> = BTreeMap::new();
    let mut modules: BTreeMap<String, ModuleDesc> = BTreeMap::new();

    let mut in_files = false;
    let mut cur_module: Option<ModuleDesc> = None;
    let mut cur_instance: Option<InstanceDesc> = None;
    let mut cur_conn: Option<Connection> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| ExtractError::malformed(format!("XML error at byte {}: {e}", reader.buffer_position())))?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let empty = matches!(event, Event::Empty(_));
                match e.name().as_ref() {
                    b"files" => in_files = !empty,
                    b"file" if in_files => {
                        if let (Some(id), Some(filename)) =
                            (attr(e, "id")?, attr(e, "filename")?)
                        {
                            files.insert(id, filename);
                        }
                    }
                    b"module" if cur_module.is_none() => {
                        let name = attr(e, "name")?.unwrap_or_default();
                        let is_top = attr(e, "topModule")?.as_deref() == Some("1");
                        if let Some(loc) = attr(e, "loc")? {
                            if let Some(file_id) = loc.split(',').next() {
                                module_locs.insert(name.clone(), file_id.to_string());
                            }
                        }
                        let module = ModuleDesc {
                            name,
                            is_top,
                            ..ModuleDesc::default()
                        };
                        if empty {
                            modules.insert(module.name.clone(), module);
                        } else {
                            cur_module = Some(module);
                        }
                    }
                    b"var" => {
                        if let (Some(module), None) = (cur_module.as_mut(), cur_instance.as_ref())
                        {
                            let dir = attr(e, "dir")?
                                .as_deref()
                                .and_then(PortDir::from_attr);
                            if let (Some(direction), Some(name)) = (dir, attr(e, "name")?) {
                                module.ports.push(PortDecl {
                                    name,
                                    direction,
                                    var_type: attr(e, "vartype")?.unwrap_or_default(),
                                });
                            }
                        }
                    }
                    b"instance" if cur_module.is_some() && cur_instance.is_none() => {
                        let instance = InstanceDesc {
                            name: attr(e, "name")?.unwrap_or_default(),
                            module: attr(e, "defName")?.unwrap_or_default(),
                            connections: Vec::new(),
                        };
                        if empty {
                            if let Some(module) = cur_module.as_mut() {
                                module.instances.push(instance);
                            }
                        } else {
                            cur_instance = Some(instance);
                        }
                    }
                    b"port" if cur_instance.is_some() && cur_conn.is_none() => {
                        let conn = Connection {
                            port: attr(e, "name")?.unwrap_or_default(),
                            signals: Vec::new(),
                        };
                        if empty {
                            if let Some(instance) = cur_instance.as_mut() {
                                instance.connections.push(conn);
                            }
                        } else {
                            cur_conn = Some(conn);
                        }
                    }
                    b"varref" => {
                        if let Some(conn) = cur_conn.as_mut() {
                            if let Some(name) = attr(e, "name")? {
                                conn.signals.push(name);
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::End(ref e) => match e.name().as_ref() {
                b"files" => in_files = false,
                b"port" => {
                    if let (Some(conn), Some(instance)) = (cur_conn.take(), cur_instance.as_mut())
                    {
                        instance.connections.push(conn);
                    }
                }
                b"instance" => {
                    if let (Some(instance), Some(module)) =
                        (cur_instance.take(), cur_module.as_mut())
                    {
                        module.instances.push(instance);
                    }
                }
                b"module" => {
                    if let Some(module) = cur_module.take() {
                        modules.insert(module.name.clone(), module);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    for (name, file_id) in &module_locs {
        if let (Some(module), Some(filename)) = (modules.get_mut(name), files.get(file_id)) {
            module.file_path = filename.clone();
        }
    }

    Ok(Netlist { modules })
}

fn attr(e: &BytesStart<'_>, name: &str) -> Result<Option<String>, ExtractError> {
    let Some(a) = e
        .try_get_attribute(name)
        .map_err(|err| ExtractError::malformed(format!("bad attribute {name}: {err}")))?
    else {
        return Ok(None);
    };
    let value = a
        .unescape_value()
        .map_err(|err| ExtractError::malformed(format!("bad attribute value {name}: {err}")))?;
    Ok(Some(value.into_owned()))
}
