//! Symbol records extracted from doxygen XML.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Class,
    Struct,
    Enum,
    Typedef,
    Variable,
    Namespace,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Class => "class",
            SymbolKind::Struct => "struct",
            SymbolKind::Enum => "enum",
            SymbolKind::Typedef => "typedef",
            SymbolKind::Variable => "variable",
            SymbolKind::Namespace => "namespace",
        }
    }
}

/// One symbol in a repository snapshot. Qualified names are unique within a
/// snapshot; the file path is as recorded by the extractor.
#[derive(Debug, Clone, Serialize)]
pub struct Symbol {
    pub kind: SymbolKind,
    pub name: String,
    pub qualified_name: String,
    pub file_path: PathBuf,
    pub line_start: u32,
    pub line_end: u32,
    /// Declaration text as written in the source, including qualifiers.
    pub prototype: String,
    pub is_member: bool,
    pub class_name: Option<String>,
    /// Extractor-assigned id; stable within one snapshot, used to resolve
    /// call references.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub extractor_id: String,
    /// Extractor ids of functions this one calls.
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub calls: BTreeSet<String>,
    /// Extractor ids of functions calling this one.
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub called_by: BTreeSet<String>,
}

impl Symbol {
    /// Whether the prototype carries `qualifier` as a whole word.
    /// Attribute-style qualifiers (`[[nodiscard]]`) match verbatim.
    pub fn has_qualifier(&self, qualifier: &str) -> bool {
        if qualifier.starts_with("[[") {
            return self.prototype.contains(qualifier);
        }
        self.prototype
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .any(|word| word == qualifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol_with_prototype(prototype: &str) -> Symbol {
        Symbol {
            kind: SymbolKind::Function,
            name: "f".into(),
            qualified_name: "f".into(),
            file_path: PathBuf::from("a.h"),
            line_start: 1,
            line_end: 1,
            prototype: prototype.into(),
            is_member: false,
            class_name: None,
            extractor_id: String::new(),
            calls: BTreeSet::new(),
            called_by: BTreeSet::new(),
        }
    }

    #[test]
    fn qualifier_matches_whole_words_only() {
        let s = symbol_with_prototype("inline int inlined_name()");
        assert!(s.has_qualifier("inline"));
        assert!(!s.has_qualifier("inl"));

        let s = symbol_with_prototype("virtual void f() const");
        assert!(s.has_qualifier("virtual"));
        assert!(s.has_qualifier("const"));
        assert!(!s.has_qualifier("override"));
    }

    #[test]
    fn attribute_qualifiers_match_verbatim() {
        let s = symbol_with_prototype("[[nodiscard]] int f()");
        assert!(s.has_qualifier("[[nodiscard]]"));
        assert!(!s.has_qualifier("[[maybe_unused]]"));
    }
}
