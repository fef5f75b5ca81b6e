//! Runs doxygen over a repository to produce XML symbol data.
//!
//! Macro expansion is disabled so the extractor reads source as-written;
//! the refactorings edit declaration lines and need line numbers that match
//! the unexpanded text.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::process::run_command;

const DOXYGEN_TIMEOUT: Duration = Duration::from_secs(1800);

/// Relative location of the XML output inside a repository clone.
pub const XML_SUBDIR: &str = "doxygen_output/xml_unexpanded";

/// Seam between the symbol table and the external extractor tool.
pub trait SymbolExtractor: Send {
    /// Probe whether the tool can run at all.
    fn is_available(&self) -> bool;
    /// Produce XML symbol data for `repo_path`, returning the XML directory.
    fn generate(&self, repo_path: &Path) -> Result<PathBuf>;
}

#[derive(Debug, Clone)]
pub struct DoxygenRunner {
    doxygen_path: String,
}

impl DoxygenRunner {
    pub fn new(doxygen_path: &str) -> Self {
        Self {
            doxygen_path: doxygen_path.to_string(),
        }
    }
}

impl SymbolExtractor for DoxygenRunner {
    /// Probe `doxygen --version`.
    fn is_available(&self) -> bool {
        run_command(
            &self.doxygen_path,
            ["--version"],
            None,
            &[],
            Duration::from_secs(10),
        )
        .map(|out| out.success())
        .unwrap_or(false)
    }

    /// Generate XML for `repo_path`, returning the XML directory.
    fn generate(&self, repo_path: &Path) -> Result<PathBuf> {
        let output_dir = repo_path.join("doxygen_output");
        std::fs::create_dir_all(&output_dir)
            .with_context(|| format!("failed to create {}", output_dir.display()))?;

        let project_name = repo_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "repo".to_string());
        let doxyfile = output_dir.join("Doxyfile");
        std::fs::write(&doxyfile, doxyfile_contents(&project_name, repo_path, &output_dir))
            .with_context(|| format!("failed to write {}", doxyfile.display()))?;

        tracing::info!(repo = %repo_path.display(), "running doxygen");
        let doxyfile_arg = doxyfile.to_string_lossy().into_owned();
        let out = run_command(
            &self.doxygen_path,
            [doxyfile_arg.as_str()],
            Some(repo_path),
            &[],
            DOXYGEN_TIMEOUT,
        )
        .context("failed to run doxygen")?;

        if out.timed_out {
            bail!("doxygen timed out");
        }
        if !out.success() {
            tracing::warn!(
                status = ?out.status_code,
                "doxygen exited non-zero: {}",
                out.stderr.lines().take(5).collect::<Vec<_>>().join(" | ")
            );
        }

        let xml_dir = repo_path.join(XML_SUBDIR);
        if !xml_dir.join("index.xml").exists() {
            bail!("doxygen did not produce {}", xml_dir.display());
        }

        // Generated data must never be staged by the worktree's stage-all
        // commit path.
        exclude_from_git(repo_path);

        Ok(xml_dir)
    }
}

fn exclude_from_git(repo_path: &Path) {
    let git_dir = repo_path.join(".git");
    if !git_dir.is_dir() {
        return;
    }
    let exclude = git_dir.join("info").join("exclude");
    let current = std::fs::read_to_string(&exclude).unwrap_or_default();
    if current.lines().any(|l| l.trim() == "doxygen_output/") {
        return;
    }
    let _ = std::fs::create_dir_all(exclude.parent().expect("exclude has a parent"));
    let mut updated = current;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str("doxygen_output/\n");
    if let Err(e) = std::fs::write(&exclude, updated) {
        tracing::warn!("failed to update git exclude file: {e}");
    }
}

fn doxyfile_contents(project_name: &str, input_dir: &Path, output_dir: &Path) -> String {
    format!(
        r#"# Generated configuration; XML-only output for symbol extraction.
PROJECT_NAME           = "{project_name}"
OUTPUT_DIRECTORY       = "{output}"
INPUT                  = "{input}"

RECURSIVE              = YES
FILE_PATTERNS          = *.cpp *.cxx *.cc *.c *.hpp *.hxx *.h *.hh

EXTRACT_ALL            = YES
EXTRACT_PRIVATE        = YES
EXTRACT_STATIC         = YES
EXTRACT_LOCAL_CLASSES  = YES
EXTRACT_LOCAL_METHODS  = YES

MACRO_EXPANSION        = NO
EXPAND_ONLY_PREDEF     = NO
SKIP_FUNCTION_MACROS   = NO

HAVE_DOT               = NO
REFERENCES_RELATION    = YES
REFERENCED_BY_RELATION = YES

GENERATE_HTML          = NO
GENERATE_LATEX         = NO
GENERATE_XML           = YES
XML_OUTPUT             = xml_unexpanded
XML_PROGRAMLISTING     = YES

QUIET                  = YES
WARNINGS               = NO
WARN_IF_UNDOCUMENTED   = NO
WARN_IF_DOC_ERROR      = NO
"#,
        project_name = project_name,
        input = input_dir.display().to_string().replace('\\', "/"),
        output = output_dir.display().to_string().replace('\\', "/"),
    )
}
