//! Function prototype parsing, reconstruction, and prototype-level
//! refactorings.
//!
//! A prototype is taken apart into components (leading qualifiers, return
//! type, name, parameters, trailing qualifiers, terminator) so a change to
//! one component can be rebuilt without disturbing the rest.

use std::path::Path;

use anyhow::{Context, Result};

use crate::repo::Worktree;
use crate::symbols::{Symbol, SymbolTable};
use crate::validate::ASM_O0;

use super::{resolve_in_repo, GitCommit, Refactoring};

const LEADING_QUALIFIERS: [&str; 6] = ["inline", "static", "virtual", "explicit", "constexpr", "extern"];
const TRAILING_QUALIFIERS: [&str; 4] = ["const", "noexcept", "override", "final"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub ty: String,
    pub name: String,
    pub default_value: String,
}

impl Parameter {
    pub fn to_source(&self) -> String {
        let mut out = self.ty.clone();
        if !self.name.is_empty() {
            out.push(' ');
            out.push_str(&self.name);
        }
        if !self.default_value.is_empty() {
            out.push_str(" = ");
            out.push_str(&self.default_value);
        }
        out
    }
}

/// Structured form of one prototype, complete enough to rebuild it.
#[derive(Debug, Clone, Default)]
pub struct PrototypeComponents {
    pub leading_qualifiers: Vec<String>,
    pub return_type: String,
    pub function_name: String,
    pub parameters: Vec<Parameter>,
    pub trailing_qualifiers: Vec<String>,
    /// `;`, `{`, or empty.
    pub terminator: String,
    pub indent: String,
}

/// Where a prototype lives in a file: inclusive 1-based line range plus the
/// raw text, newlines included.
#[derive(Debug, Clone)]
pub struct PrototypeLocation {
    pub line_start: usize,
    pub line_end: usize,
    pub text: String,
}

/// Scan forward from the symbol's declaration line until a `;` or `{`
/// terminates the prototype.
pub fn find_prototype_location(content: &str, line_start: u32) -> Option<PrototypeLocation> {
    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    let start = line_start as usize;
    if start < 1 || start > lines.len() {
        return None;
    }

    let mut text = String::new();
    let mut end = start;
    for (offset, line) in lines[start - 1..].iter().enumerate() {
        text.push_str(line);
        end = start + offset;
        if line.contains(';') || line.contains('{') {
            break;
        }
    }
    Some(PrototypeLocation {
        line_start: start,
        line_end: end,
        text,
    })
}

fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    // Block comments can span the whole prototype; line comments end at
    // the newline.
    while let Some(open) = rest.find("/*") {
        out.push_str(&rest[..open]);
        out.push(' ');
        match rest[open + 2..].find("*/") {
            Some(close) => rest = &rest[open + 2 + close + 2..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out.lines()
        .map(|l| l.split("//").next().unwrap_or(""))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a prototype into components. Returns `None` when the text does
/// not look like a function prototype.
pub fn parse_prototype(prototype: &str) -> Option<PrototypeComponents> {
    if prototype.trim().is_empty() {
        return None;
    }

    let mut components = PrototypeComponents::default();

    let first_line = prototype.lines().next().unwrap_or("");
    components.indent = first_line[..first_line.len() - first_line.trim_start().len()].to_string();

    let mut clean = strip_comments(prototype);
    clean = clean.split_whitespace().collect::<Vec<_>>().join(" ");

    if let Some(idx) = clean.find('{') {
        components.terminator = "{".into();
        clean.truncate(idx);
        clean = clean.trim().to_string();
    } else if clean.ends_with(';') {
        components.terminator = ";".into();
        clean.pop();
        clean = clean.trim().to_string();
    }

    let paren_start = clean.find('(')?;
    let paren_end = clean.rfind(')')?;
    if paren_end <= paren_start {
        return None;
    }

    let after_params = clean[paren_end + 1..].trim();
    for qualifier in TRAILING_QUALIFIERS {
        if after_params
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .any(|w| w == qualifier)
        {
            components.trailing_qualifiers.push(qualifier.to_string());
        }
    }

    let params_str = clean[paren_start + 1..paren_end].trim();
    if !params_str.is_empty() && params_str != "void" {
        components.parameters = split_parameters(params_str)
            .into_iter()
            .map(|p| parse_parameter(&p))
            .collect();
    }

    let before_params = clean[..paren_start].trim();
    let tokens: Vec<&str> = before_params.split_whitespace().collect();
    let (&name, rest) = tokens.split_last()?;
    components.function_name = name.to_string();

    let mut return_tokens = Vec::new();
    for token in rest {
        if LEADING_QUALIFIERS.contains(token) {
            components.leading_qualifiers.push(token.to_string());
        } else {
            return_tokens.push(*token);
        }
    }
    components.return_type = return_tokens.join(" ");

    Some(components)
}

/// Split a parameter list on top-level commas; template arguments keep
/// their commas.
fn split_parameters(params: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    for c in params.chars() {
        match c {
            '<' | '(' => depth += 1,
            '>' | ')' => depth -= 1,
            ',' if depth == 0 => {
                if !current.trim().is_empty() {
                    out.push(current.trim().to_string());
                }
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    if !current.trim().is_empty() {
        out.push(current.trim().to_string());
    }
    out
}

fn parse_parameter(param: &str) -> Parameter {
    let mut param = param.trim().to_string();

    let mut default_value = String::new();
    if let Some(eq) = param.find('=') {
        default_value = param[eq + 1..].trim().to_string();
        param.truncate(eq);
    }

    let tokens: Vec<&str> = param.split_whitespace().collect();
    match tokens.as_slice() {
        [] => Parameter {
            ty: String::new(),
            name: String::new(),
            default_value,
        },
        [ty] => Parameter {
            ty: ty.to_string(),
            name: String::new(),
            default_value,
        },
        [head @ .., last] => {
            let name = last.trim_start_matches(['*', '&']);
            // An array declarator means the "name" token was part of the
            // type all along.
            if name.starts_with('[') {
                Parameter {
                    ty: tokens.join(" "),
                    name: String::new(),
                    default_value,
                }
            } else {
                let mut ty = head.join(" ");
                let pointer_part = &last[..last.len() - name.len()];
                if !pointer_part.is_empty() {
                    ty.push_str(pointer_part);
                }
                Parameter {
                    ty,
                    name: name.to_string(),
                    default_value,
                }
            }
        }
    }
}

/// Rebuild the prototype text from components.
pub fn build_prototype(components: &PrototypeComponents) -> String {
    let mut out = components.indent.clone();

    for qualifier in &components.leading_qualifiers {
        out.push_str(qualifier);
        out.push(' ');
    }
    if !components.return_type.is_empty() {
        out.push_str(&components.return_type);
        out.push(' ');
    }
    out.push_str(&components.function_name);
    out.push('(');
    let params: Vec<String> = components.parameters.iter().map(Parameter::to_source).collect();
    out.push_str(&params.join(", "));
    out.push(')');
    if !components.trailing_qualifiers.is_empty() {
        out.push(' ');
        out.push_str(&components.trailing_qualifiers.join(" "));
    }
    out.push_str(&components.terminator);
    out
}

// ============================================================================
// Rename parameter
// ============================================================================

/// Rename one parameter on a function prototype. Touches the declaration
/// only; a parameter rename never reaches generated code, so the O0 check
/// suffices.
pub struct RenameParameter {
    pub symbol: Symbol,
    pub param_index: usize,
    pub new_name: String,
}

impl Refactoring for RenameParameter {
    fn describe(&self) -> String {
        format!(
            "Rename parameter {} of {} to {}",
            self.param_index, self.symbol.qualified_name, self.new_name
        )
    }

    fn target_file(&self) -> &Path {
        &self.symbol.file_path
    }

    fn validator_id(&self) -> &'static str {
        ASM_O0
    }

    fn probability(&self) -> f64 {
        0.85
    }

    fn apply(&self, worktree: &Worktree, symbols: &mut SymbolTable) -> Result<Option<GitCommit>> {
        let path = resolve_in_repo(worktree, &self.symbol.file_path);
        if !path.exists() {
            return Ok(None);
        }
        let bytes =
            std::fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
        let content = String::from_utf8_lossy(&bytes).into_owned();

        let Some(location) = find_prototype_location(&content, self.symbol.line_start) else {
            return Ok(None);
        };
        let Some(mut components) = parse_prototype(&location.text) else {
            return Ok(None);
        };
        let Some(parameter) = components.parameters.get_mut(self.param_index) else {
            return Ok(None);
        };
        if parameter.name == self.new_name {
            return Ok(None);
        }
        let old_name = std::mem::replace(&mut parameter.name, self.new_name.clone());

        let mut rebuilt = build_prototype(&components);
        if location.text.ends_with('\n') && !rebuilt.ends_with('\n') {
            rebuilt.push('\n');
        }

        let mut lines: Vec<String> = content
            .split_inclusive('\n')
            .map(str::to_string)
            .collect();
        lines.splice(location.line_start - 1..location.line_end, [rebuilt]);
        let new_content: String = lines.concat();
        if new_content == content {
            return Ok(None);
        }

        std::fs::write(&path, &new_content)
            .with_context(|| format!("failed to write {}", path.display()))?;
        symbols.invalidate_file(&self.symbol.file_path);

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let message = format!(
            "Rename parameter {old_name} to {} for {} in {file_name}",
            self.new_name, self.symbol.qualified_name
        );
        let commit = GitCommit::create(
            worktree,
            &message,
            self.validator_id(),
            vec![self.symbol.qualified_name.clone()],
            self.probability(),
        )?;
        Ok(Some(commit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_simple_declaration() {
        let components = parse_prototype("    virtual int scale(int factor) const;").unwrap();
        assert_eq!(components.indent, "    ");
        assert_eq!(components.leading_qualifiers, vec!["virtual"]);
        assert_eq!(components.return_type, "int");
        assert_eq!(components.function_name, "scale");
        assert_eq!(components.parameters.len(), 1);
        assert_eq!(components.parameters[0].ty, "int");
        assert_eq!(components.parameters[0].name, "factor");
        assert_eq!(components.trailing_qualifiers, vec!["const"]);
        assert_eq!(components.terminator, ";");
    }

    #[test]
    fn parses_defaults_pointers_and_templates() {
        let components =
            parse_prototype("std::map<int, bool> lookup(const char* key, int limit = 10);")
                .unwrap();
        assert_eq!(components.return_type, "std::map<int, bool>");
        assert_eq!(components.parameters.len(), 2);
        assert_eq!(components.parameters[0].ty, "const char*");
        assert_eq!(components.parameters[0].name, "key");
        assert_eq!(components.parameters[1].default_value, "10");
    }

    #[test]
    fn parses_a_definition_header() {
        let components = parse_prototype("inline int twice(int v) {").unwrap();
        assert_eq!(components.leading_qualifiers, vec!["inline"]);
        assert_eq!(components.terminator, "{");
    }

    #[test]
    fn void_parameter_list_is_empty() {
        let components = parse_prototype("int f(void);").unwrap();
        assert!(components.parameters.is_empty());
    }

    #[test]
    fn rejects_non_prototypes() {
        assert!(parse_prototype("").is_none());
        assert!(parse_prototype("int x = 3;").is_none());
    }

    #[test]
    fn build_round_trips_canonical_form() {
        let text = "virtual int scale(int factor) const;";
        let components = parse_prototype(text).unwrap();
        assert_eq!(build_prototype(&components), text);
    }

    #[test]
    fn build_reflects_component_edits() {
        let mut components = parse_prototype("int scale(int factor, bool clamp = true);").unwrap();
        components.parameters[0].name = "multiplier".into();
        assert_eq!(
            build_prototype(&components),
            "int scale(int multiplier, bool clamp = true);"
        );
    }

    #[test]
    fn location_spans_until_the_terminator() {
        let content = "int a;\nvoid multi(\n    int x,\n    int y);\nint b;\n";
        let location = find_prototype_location(content, 2).unwrap();
        assert_eq!(location.line_start, 2);
        assert_eq!(location.line_end, 4);
        assert!(location.text.contains("int y);"));
    }

    #[test]
    fn comments_inside_prototypes_are_ignored() {
        let components =
            parse_prototype("int f(/* count */ int n); // trailing\n").unwrap();
        assert_eq!(components.parameters.len(), 1);
        assert_eq!(components.parameters[0].name, "n");
    }
}
