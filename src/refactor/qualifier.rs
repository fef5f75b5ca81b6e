//! Add/remove a qualifier on a function declaration line.

use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;

use crate::repo::Worktree;
use crate::symbols::{Symbol, SymbolTable};
use crate::validate::{ASM_O0, ASM_O3};

use super::{resolve_in_repo, GitCommit, Refactoring};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qualifier {
    Const,
    Noexcept,
    Constexpr,
    Inline,
    Override,
    Final,
    Static,
    Virtual,
    Nodiscard,
    MaybeUnused,
}

impl Qualifier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Qualifier::Const => "const",
            Qualifier::Noexcept => "noexcept",
            Qualifier::Constexpr => "constexpr",
            Qualifier::Inline => "inline",
            Qualifier::Override => "override",
            Qualifier::Final => "final",
            Qualifier::Static => "static",
            Qualifier::Virtual => "virtual",
            Qualifier::Nodiscard => "[[nodiscard]]",
            Qualifier::MaybeUnused => "[[maybe_unused]]",
        }
    }

    /// Validator required when this qualifier is added. Qualifiers the
    /// optimizer can act on must survive O3; the rest are cosmetic.
    pub fn validator_for_add(&self) -> &'static str {
        match self {
            Qualifier::Const | Qualifier::Noexcept | Qualifier::Constexpr | Qualifier::Inline => {
                ASM_O3
            }
            _ => ASM_O0,
        }
    }

    /// Validator required when this qualifier is removed. Dropping `inline`
    /// from a definition is cosmetic at the source level, so it only needs
    /// the O0 check; dropping the semantic qualifiers still must hold under
    /// optimization.
    pub fn validator_for_remove(&self) -> &'static str {
        match self {
            Qualifier::Const | Qualifier::Noexcept | Qualifier::Constexpr => ASM_O3,
            _ => ASM_O0,
        }
    }
}

/// Add `qualifier` before the declaration terminator of `symbol`.
pub struct AddFunctionQualifier {
    pub symbol: Symbol,
    pub qualifier: Qualifier,
}

impl Refactoring for AddFunctionQualifier {
    fn describe(&self) -> String {
        format!("Add {} to {}", self.qualifier.as_str(), self.symbol.qualified_name)
    }

    fn target_file(&self) -> &Path {
        &self.symbol.file_path
    }

    fn validator_id(&self) -> &'static str {
        self.qualifier.validator_for_add()
    }

    fn probability(&self) -> f64 {
        0.8
    }

    fn apply(&self, worktree: &Worktree, symbols: &mut SymbolTable) -> Result<Option<GitCommit>> {
        let path = resolve_in_repo(worktree, &self.symbol.file_path);
        if !path.exists() {
            return Ok(None);
        }
        let content = read_lossy(&path)?;
        let mut lines: Vec<String> = content
            .split_inclusive('\n')
            .map(str::to_string)
            .collect();

        let line_number = self.symbol.line_start as usize;
        if line_number < 1 || line_number > lines.len() {
            return Ok(None);
        }
        let line = &lines[line_number - 1];

        let qualifier = self.qualifier.as_str();
        if contains_qualifier(line, qualifier) {
            return Ok(None);
        }
        // A declaration terminator must exist on the line to anchor the edit.
        if !line.contains(';') {
            return Ok(None);
        }

        let modified_line = line.replacen(';', &format!(" {qualifier};"), 1);
        lines[line_number - 1] = modified_line;
        let new_content: String = lines.concat();

        std::fs::write(&path, &new_content)
            .with_context(|| format!("failed to write {}", path.display()))?;
        symbols.invalidate_file(&self.symbol.file_path);

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let message = format!(
            "Add {qualifier} to {} in {file_name}",
            self.symbol.qualified_name
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

/// Remove the first whole-word occurrence of `qualifier` on the symbol's
/// declaration line.
pub struct RemoveFunctionQualifier {
    pub symbol: Symbol,
    pub qualifier: Qualifier,
}

impl Refactoring for RemoveFunctionQualifier {
    fn describe(&self) -> String {
        format!(
            "Remove {} from {}",
            self.qualifier.as_str(),
            self.symbol.qualified_name
        )
    }

    fn target_file(&self) -> &Path {
        &self.symbol.file_path
    }

    fn validator_id(&self) -> &'static str {
        self.qualifier.validator_for_remove()
    }

    fn probability(&self) -> f64 {
        0.9
    }

    fn apply(&self, worktree: &Worktree, symbols: &mut SymbolTable) -> Result<Option<GitCommit>> {
        let path = resolve_in_repo(worktree, &self.symbol.file_path);
        if !path.exists() {
            return Ok(None);
        }
        let content = read_lossy(&path)?;
        let mut lines: Vec<String> = content
            .split_inclusive('\n')
            .map(str::to_string)
            .collect();

        let line_number = self.symbol.line_start as usize;
        if line_number < 1 || line_number > lines.len() {
            return Ok(None);
        }
        let line = &lines[line_number - 1];

        let qualifier = self.qualifier.as_str();
        if !contains_qualifier(line, qualifier) {
            return Ok(None);
        }

        let modified_line = remove_qualifier_once(line, qualifier);
        if modified_line == *line {
            return Ok(None);
        }
        lines[line_number - 1] = modified_line;
        let new_content: String = lines.concat();

        std::fs::write(&path, &new_content)
            .with_context(|| format!("failed to write {}", path.display()))?;
        symbols.invalidate_file(&self.symbol.file_path);

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let message = format!(
            "Remove {qualifier} from {} in {file_name}",
            self.symbol.qualified_name
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

fn read_lossy(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn contains_qualifier(line: &str, qualifier: &str) -> bool {
    if qualifier.starts_with("[[") {
        return line.contains(qualifier);
    }
    line.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .any(|word| word == qualifier)
}

fn remove_qualifier_once(line: &str, qualifier: &str) -> String {
    if qualifier.starts_with("[[") {
        // Attribute qualifiers are not word-delimited; strip verbatim with
        // one trailing space if present.
        let with_space = format!("{qualifier} ");
        if line.contains(&with_space) {
            return line.replacen(&with_space, "", 1);
        }
        return line.replacen(qualifier, "", 1);
    }
    let pattern = format!(r"\b{}\b\s*", regex::escape(qualifier));
    let re = Regex::new(&pattern).expect("qualifier pattern is valid");
    re.replacen(line, 1, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_validator_choice_follows_semantics() {
        assert_eq!(Qualifier::Const.validator_for_add(), ASM_O3);
        assert_eq!(Qualifier::Noexcept.validator_for_add(), ASM_O3);
        assert_eq!(Qualifier::Inline.validator_for_add(), ASM_O3);
        assert_eq!(Qualifier::Override.validator_for_add(), ASM_O0);
        assert_eq!(Qualifier::Nodiscard.validator_for_add(), ASM_O0);
    }

    #[test]
    fn remove_inline_only_needs_the_o0_check() {
        assert_eq!(Qualifier::Inline.validator_for_remove(), ASM_O0);
        assert_eq!(Qualifier::Const.validator_for_remove(), ASM_O3);
        assert_eq!(Qualifier::Override.validator_for_remove(), ASM_O0);
    }

    #[test]
    fn remove_strips_whole_words_only() {
        assert_eq!(
            remove_qualifier_once("inline int inlined_value();", "inline"),
            "int inlined_value();"
        );
        assert_eq!(
            remove_qualifier_once("virtual void f() override;", "override"),
            "virtual void f() ;"
        );
    }

    #[test]
    fn remove_handles_attribute_qualifiers() {
        assert_eq!(
            remove_qualifier_once("[[nodiscard]] int f();", "[[nodiscard]]"),
            "int f();"
        );
    }

    #[test]
    fn qualifier_detection_ignores_substrings() {
        assert!(!contains_qualifier("int inlined();", "inline"));
        assert!(contains_qualifier("inline int f();", "inline"));
        assert!(contains_qualifier("[[nodiscard]] int f();", "[[nodiscard]]"));
    }
}
