//! Clang driver. Emits Intel-syntax assembly so both compiler variants
//! feed the validators the same dialect.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::process::run_command;

use super::{materialize_prelude, CompiledFile, Compiler};

pub const ID: &str = "clang";
pub const NAME: &str = "Clang/LLVM";

const COMPILE_TIMEOUT: Duration = Duration::from_secs(300);

pub struct ClangCompiler {
    clang_path: String,
}

impl ClangCompiler {
    pub fn new(clang_path: &str) -> Self {
        Self {
            clang_path: clang_path.to_string(),
        }
    }
}

impl Compiler for ClangCompiler {
    fn id(&self) -> &'static str {
        ID
    }

    fn name(&self) -> &'static str {
        NAME
    }

    fn optimization_flags(&self, level: u8) -> &'static str {
        match level {
            0 => "-O0",
            1 => "-O1",
            3 => "-O3",
            _ => "-O2",
        }
    }

    fn compile_file(&self, source: &Path, optimization_level: u8) -> Result<CompiledFile> {
        let scratch = tempfile::tempdir().context("failed to create compile scratch dir")?;
        let prelude = materialize_prelude(scratch.path())?;
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unit".to_string());
        let asm_path = scratch.path().join(format!("{stem}.s"));

        let args = [
            "-std=c++17".to_string(),
            "-Wall".to_string(),
            self.optimization_flags(optimization_level).to_string(),
            "-S".to_string(),
            "-masm=intel".to_string(),
            "-include".to_string(),
            prelude.to_string_lossy().into_owned(),
            "-o".to_string(),
            asm_path.to_string_lossy().into_owned(),
            source.to_string_lossy().into_owned(),
        ];

        tracing::debug!(source = %source.display(), optimization_level, "compiling with clang");
        let out = run_command(
            &self.clang_path,
            &args,
            source.parent(),
            &[],
            COMPILE_TIMEOUT,
        )
        .with_context(|| format!("failed to run {}", self.clang_path))?;

        let diagnostics = format!("{}{}", out.stdout, out.stderr);
        if !out.success() || !asm_path.exists() {
            tracing::debug!(source = %source.display(), "clang compile failed");
            return Ok(CompiledFile {
                source_path: source.to_path_buf(),
                asm_text: String::new(),
                diagnostics,
            });
        }

        let asm_text = std::fs::read_to_string(&asm_path)
            .with_context(|| format!("failed to read {}", asm_path.display()))?;
        Ok(CompiledFile {
            source_path: source.to_path_buf(),
            asm_text,
            diagnostics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optimization_levels_map_to_clang_flags() {
        let clang = ClangCompiler::new("clang++");
        assert_eq!(clang.optimization_flags(0), "-O0");
        assert_eq!(clang.optimization_flags(1), "-O1");
        assert_eq!(clang.optimization_flags(2), "-O2");
        assert_eq!(clang.optimization_flags(3), "-O3");
        assert_eq!(clang.optimization_flags(7), "-O2");
    }
}
