//! Parser for doxygen XML output.
//!
//! Reads `index.xml` to discover compounds, then each compound file for
//! classes, structs, namespaces, functions, enums, typedefs and variables.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use roxmltree::{Document, Node};

use super::model::{Symbol, SymbolKind};

/// Parse every symbol found under `xml_dir`.
pub fn parse_symbol_dir(xml_dir: &Path) -> Result<Vec<Symbol>> {
    let index_path = xml_dir.join("index.xml");
    let index_text = std::fs::read_to_string(&index_path)
        .with_context(|| format!("failed to read {}", index_path.display()))?;
    let index = Document::parse(&index_text)
        .with_context(|| format!("failed to parse {}", index_path.display()))?;

    let mut symbols = Vec::new();
    for compound in index
        .descendants()
        .filter(|n| n.has_tag_name("compound"))
    {
        let Some(refid) = compound.attribute("refid") else {
            continue;
        };
        let Some(kind) = compound.attribute("kind") else {
            continue;
        };
        if !matches!(kind, "file" | "class" | "struct" | "namespace") {
            continue;
        }
        let compound_path = xml_dir.join(format!("{refid}.xml"));
        if !compound_path.exists() {
            continue;
        }
        match parse_compound_file(&compound_path) {
            Ok(mut parsed) => symbols.append(&mut parsed),
            Err(e) => tracing::warn!("skipping {}: {e}", compound_path.display()),
        }
    }
    Ok(symbols)
}

/// Parse one compound XML file.
pub fn parse_compound_file(path: &Path) -> Result<Vec<Symbol>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_compound_text(&text)
}

pub fn parse_compound_text(text: &str) -> Result<Vec<Symbol>> {
    let doc = Document::parse(text).context("malformed compound XML")?;
    let Some(compounddef) = doc
        .descendants()
        .find(|n| n.has_tag_name("compounddef"))
    else {
        return Ok(Vec::new());
    };

    let compound_kind = compounddef.attribute("kind").unwrap_or("");
    let compound_name = child_text(compounddef, "compoundname");
    let compound_file = compounddef
        .children()
        .find(|n| n.has_tag_name("location"))
        .and_then(|loc| loc.attribute("file"))
        .unwrap_or("")
        .to_string();

    let mut symbols = Vec::new();

    if let Some(kind) = match compound_kind {
        "class" => Some(SymbolKind::Class),
        "struct" => Some(SymbolKind::Struct),
        "namespace" => Some(SymbolKind::Namespace),
        _ => None,
    } {
        if !compound_name.is_empty() {
            let (line_start, line_end) = compound_lines(compounddef);
            symbols.push(Symbol {
                kind,
                name: compound_name
                    .rsplit("::")
                    .next()
                    .unwrap_or(&compound_name)
                    .to_string(),
                qualified_name: compound_name.clone(),
                file_path: PathBuf::from(&compound_file),
                line_start,
                line_end,
                prototype: format!("{compound_kind} {compound_name}"),
                is_member: false,
                class_name: None,
                extractor_id: compounddef.attribute("id").unwrap_or("").to_string(),
                calls: BTreeSet::new(),
                called_by: BTreeSet::new(),
            });
        }
    }

    let member_of_class = matches!(compound_kind, "class" | "struct");
    for memberdef in compounddef
        .descendants()
        .filter(|n| n.has_tag_name("memberdef"))
    {
        let symbol = match memberdef.attribute("kind") {
            Some("function") => parse_function(
                memberdef,
                &compound_name,
                &compound_file,
                member_of_class,
            ),
            Some("enum") => parse_plain_member(memberdef, SymbolKind::Enum, &compound_name, &compound_file),
            Some("typedef") => {
                parse_plain_member(memberdef, SymbolKind::Typedef, &compound_name, &compound_file)
            }
            Some("variable") => {
                parse_plain_member(memberdef, SymbolKind::Variable, &compound_name, &compound_file)
            }
            _ => None,
        };
        if let Some(symbol) = symbol {
            symbols.push(symbol);
        }
    }

    Ok(symbols)
}

fn parse_function(
    memberdef: Node,
    compound_name: &str,
    compound_file: &str,
    member_of_class: bool,
) -> Option<Symbol> {
    let name = child_text(memberdef, "name");
    if name.is_empty() {
        return None;
    }
    let qualified_name = qualified_name(memberdef, compound_name, &name);

    let return_type = child_text(memberdef, "type");
    let args = child_text(memberdef, "argsstring");

    // Reconstruct the as-written declaration: doxygen records storage and
    // virtuality as attributes, the trailing qualifiers live in argsstring.
    let mut prototype = String::new();
    if memberdef
        .attribute("virt")
        .is_some_and(|v| v.contains("virtual"))
    {
        prototype.push_str("virtual ");
    }
    if memberdef.attribute("static") == Some("yes") {
        prototype.push_str("static ");
    }
    if memberdef.attribute("inline") == Some("yes") {
        prototype.push_str("inline ");
    }
    if !return_type.is_empty() {
        prototype.push_str(&return_type);
        prototype.push(' ');
    }
    prototype.push_str(&name);
    prototype.push_str(&args);

    let (file_path, line_start, line_end) = member_location(memberdef, compound_file);

    // Cross-reference data for the call graph.
    let calls: BTreeSet<String> = memberdef
        .children()
        .filter(|n| n.has_tag_name("references"))
        .filter_map(|n| n.attribute("refid"))
        .map(str::to_string)
        .collect();
    let called_by: BTreeSet<String> = memberdef
        .children()
        .filter(|n| n.has_tag_name("referencedby"))
        .filter_map(|n| n.attribute("refid"))
        .map(str::to_string)
        .collect();

    Some(Symbol {
        kind: SymbolKind::Function,
        name,
        qualified_name,
        file_path,
        line_start,
        line_end,
        prototype: prototype.trim().to_string(),
        is_member: member_of_class,
        class_name: if member_of_class {
            Some(compound_name.to_string())
        } else {
            None
        },
        extractor_id: memberdef.attribute("id").unwrap_or("").to_string(),
        calls,
        called_by,
    })
}

fn parse_plain_member(
    memberdef: Node,
    kind: SymbolKind,
    compound_name: &str,
    compound_file: &str,
) -> Option<Symbol> {
    let name = child_text(memberdef, "name");
    if name.is_empty() {
        return None;
    }
    let qualified_name = qualified_name(memberdef, compound_name, &name);
    let (file_path, line_start, line_end) = member_location(memberdef, compound_file);
    let definition = child_text(memberdef, "definition");

    Some(Symbol {
        kind,
        name,
        qualified_name,
        file_path,
        line_start,
        line_end,
        prototype: definition,
        is_member: matches!(kind, SymbolKind::Variable) && !compound_name.is_empty(),
        class_name: None,
        extractor_id: memberdef.attribute("id").unwrap_or("").to_string(),
        calls: BTreeSet::new(),
        called_by: BTreeSet::new(),
    })
}

fn qualified_name(memberdef: Node, compound_name: &str, name: &str) -> String {
    let qualified = child_text(memberdef, "qualifiedname");
    if !qualified.is_empty() {
        return qualified;
    }
    if compound_name.is_empty() {
        name.to_string()
    } else {
        format!("{compound_name}::{name}")
    }
}

fn member_location(memberdef: Node, default_file: &str) -> (PathBuf, u32, u32) {
    let Some(location) = memberdef.children().find(|n| n.has_tag_name("location")) else {
        return (PathBuf::from(default_file), 0, 0);
    };
    let file = location.attribute("file").unwrap_or(default_file);
    let line = attr_u32(location, "line");
    let bodystart = attr_u32(location, "bodystart");
    let line_start = if bodystart > 0 { bodystart } else { line };
    let line_end = attr_u32(location, "bodyend");
    let line_end = if line_end > 0 { line_end } else { line_start };
    (PathBuf::from(file), line_start, line_end)
}

fn attr_u32(node: Node, name: &str) -> u32 {
    node.attribute(name)
        .and_then(|v| v.parse::<i64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(0) as u32
}

fn compound_lines(compounddef: Node) -> (u32, u32) {
    let Some(location) = compounddef
        .children()
        .find(|n| n.has_tag_name("location"))
    else {
        return (0, 0);
    };
    let line = attr_u32(location, "line");
    let end = attr_u32(location, "bodyend");
    (line, if end > 0 { end } else { line })
}

/// All text under the first child element named `name`, refs included.
fn child_text(node: Node, name: &str) -> String {
    let Some(elem) = node.children().find(|n| n.has_tag_name(name)) else {
        return String::new();
    };
    elem.descendants()
        .filter_map(|n| n.text())
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLASS_XML: &str = r#"<?xml version='1.0' encoding='UTF-8'?>
<doxygen>
  <compounddef id="class_base" kind="class">
    <compoundname>Base</compoundname>
    <sectiondef kind="public-func">
      <memberdef kind="function" virt="virtual" static="no" const="no" inline="no">
        <type>void</type>
        <definition>virtual void Base::render</definition>
        <argsstring>()</argsstring>
        <name>render</name>
        <qualifiedname>Base::render</qualifiedname>
        <location file="src/shape.h" line="12" column="5"/>
      </memberdef>
      <memberdef kind="function" virt="non-virtual" static="no" inline="yes">
        <type>int</type>
        <definition>int Base::area</definition>
        <argsstring>() const</argsstring>
        <name>area</name>
        <qualifiedname>Base::area</qualifiedname>
        <location file="src/shape.h" line="14" bodystart="14" bodyend="16"/>
      </memberdef>
    </sectiondef>
    <location file="src/shape.h" line="10" bodystart="10" bodyend="20"/>
  </compounddef>
</doxygen>"#;

    #[test]
    fn parses_class_and_member_functions() {
        let symbols = parse_compound_text(CLASS_XML).unwrap();
        assert_eq!(symbols.len(), 3);

        let class = &symbols[0];
        assert_eq!(class.kind, SymbolKind::Class);
        assert_eq!(class.qualified_name, "Base");
        assert_eq!(class.line_start, 10);

        let render = symbols
            .iter()
            .find(|s| s.qualified_name == "Base::render")
            .unwrap();
        assert_eq!(render.kind, SymbolKind::Function);
        assert!(render.is_member);
        assert_eq!(render.class_name.as_deref(), Some("Base"));
        assert_eq!(render.prototype, "virtual void render()");
        assert_eq!(render.line_start, 12);

        let area = symbols
            .iter()
            .find(|s| s.qualified_name == "Base::area")
            .unwrap();
        assert!(area.has_qualifier("inline"));
        assert!(area.has_qualifier("const"));
        assert_eq!(area.line_start, 14);
        assert_eq!(area.line_end, 16);
    }

    #[test]
    fn free_function_in_file_compound() {
        let xml = r#"<?xml version='1.0'?>
<doxygen>
  <compounddef id="util_8cpp" kind="file">
    <compoundname>util.cpp</compoundname>
    <sectiondef kind="func">
      <memberdef kind="function" static="no" inline="yes">
        <type>int</type>
        <definition>int scale</definition>
        <argsstring>(int v)</argsstring>
        <name>scale</name>
        <location file="src/util.cpp" line="3" bodystart="3" bodyend="5"/>
      </memberdef>
    </sectiondef>
    <location file="src/util.cpp"/>
  </compounddef>
</doxygen>"#;
        let symbols = parse_compound_text(xml).unwrap();
        assert_eq!(symbols.len(), 1);
        let scale = &symbols[0];
        assert_eq!(scale.qualified_name, "scale");
        assert!(!scale.is_member);
        assert_eq!(scale.prototype, "inline int scale(int v)");
        assert_eq!(scale.file_path, PathBuf::from("src/util.cpp"));
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(parse_compound_text("<not-closed").is_err());
    }
}
