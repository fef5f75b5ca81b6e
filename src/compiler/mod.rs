//! Compiler drivers.
//!
//! Each variant compiles a single translation unit to Intel-syntax assembly
//! text. The project prelude header is force-included into every
//! invocation so refactorings can rely on its neutral wrappers.

pub mod clang;
pub mod msvc;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Result};

use crate::registry::RegistryEntry;

pub use clang::ClangCompiler;
pub use msvc::MsvcCompiler;

/// Prelude header force-included by every compile invocation. Provides
/// `LevelUp::unique_ptr` (aliasing `std::unique_ptr` when
/// `LEVELUP_USE_STD_UNIQUE_PTR` is defined, a minimal unique-owner type
/// otherwise).
pub const PRELUDE_HEADER_NAME: &str = "LevelUp.h";
pub const PRELUDE_HEADER: &str = include_str!("../../demos/LevelUp.h");

/// Result of compiling one translation unit. A failed compile carries an
/// empty `asm_text` and the captured diagnostics; callers treat that as a
/// refactoring rejection, not an engine error.
#[derive(Debug)]
pub struct CompiledFile {
    pub source_path: PathBuf,
    pub asm_text: String,
    pub diagnostics: String,
}

impl CompiledFile {
    pub fn succeeded(&self) -> bool {
        !self.asm_text.is_empty()
    }
}

pub trait Compiler: Send + Sync {
    /// Stable identifier used in APIs. Do not change once set.
    fn id(&self) -> &'static str;
    fn name(&self) -> &'static str;
    /// Flag string for an optimization level in 0..=3. Levels without a
    /// direct analog map to the variant's level-2 flag.
    fn optimization_flags(&self, level: u8) -> &'static str;
    fn compile_file(&self, source: &Path, optimization_level: u8) -> Result<CompiledFile>;
}

pub fn compiler_from_id(
    id: &str,
    msvc_path: &str,
    clang_path: &str,
) -> Result<Arc<dyn Compiler>> {
    match id {
        msvc::ID => Ok(Arc::new(MsvcCompiler::new(msvc_path))),
        clang::ID => Ok(Arc::new(ClangCompiler::new(clang_path))),
        other => bail!("unsupported compiler: {other}"),
    }
}

pub fn available_compilers() -> Vec<RegistryEntry> {
    vec![
        RegistryEntry {
            id: msvc::ID,
            name: msvc::NAME,
        },
        RegistryEntry {
            id: clang::ID,
            name: clang::NAME,
        },
    ]
}

/// Write the prelude header into `dir` so it can be force-included.
pub(crate) fn materialize_prelude(dir: &Path) -> Result<PathBuf> {
    let path = dir.join(PRELUDE_HEADER_NAME);
    std::fs::write(&path, PRELUDE_HEADER)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_exposes_stable_ids() {
        let entries = available_compilers();
        let ids: Vec<_> = entries.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["msvc", "clang"]);
    }

    #[test]
    fn unknown_compiler_id_is_rejected() {
        assert!(compiler_from_id("tcc", "cl", "clang++").is_err());
    }

    #[test]
    fn prelude_provides_the_unique_ptr_wrapper() {
        assert!(PRELUDE_HEADER.contains("namespace LevelUp"));
        assert!(PRELUDE_HEADER.contains("unique_ptr"));
    }
}
