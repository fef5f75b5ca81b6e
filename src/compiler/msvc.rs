//! MSVC driver. Drives `cl.exe` directly; the environment is expected to be
//! a developer prompt or to have `MSVC_PATH` point at a usable `cl.exe`.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::process::run_command;

use super::{materialize_prelude, CompiledFile, Compiler, PRELUDE_HEADER_NAME};

pub const ID: &str = "msvc";
pub const NAME: &str = "Microsoft Visual C++";

const COMPILE_TIMEOUT: Duration = Duration::from_secs(300);

pub struct MsvcCompiler {
    cl_path: String,
}

impl MsvcCompiler {
    pub fn new(cl_path: &str) -> Self {
        Self {
            cl_path: cl_path.to_string(),
        }
    }
}

impl Compiler for MsvcCompiler {
    fn id(&self) -> &'static str {
        ID
    }

    fn name(&self) -> &'static str {
        NAME
    }

    fn optimization_flags(&self, level: u8) -> &'static str {
        match level {
            0 => "/Od",
            1 => "/O1",
            3 => "/Ox",
            _ => "/O2",
        }
    }

    fn compile_file(&self, source: &Path, optimization_level: u8) -> Result<CompiledFile> {
        let scratch = tempfile::tempdir().context("failed to create compile scratch dir")?;
        materialize_prelude(scratch.path())?;
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unit".to_string());
        let asm_path = scratch.path().join(format!("{stem}.asm"));
        let obj_path = scratch.path().join(format!("{stem}.obj"));

        let args = [
            "/nologo".to_string(),
            "/EHsc".to_string(),
            "/W3".to_string(),
            self.optimization_flags(optimization_level).to_string(),
            "/FA".to_string(),
            format!("/Fa{}", asm_path.display()),
            "/c".to_string(),
            format!("/Fo{}", obj_path.display()),
            format!("/FI{PRELUDE_HEADER_NAME}"),
            format!("/I{}", scratch.path().display()),
            source.to_string_lossy().into_owned(),
        ];

        tracing::debug!(source = %source.display(), optimization_level, "compiling with cl.exe");
        let out = run_command(&self.cl_path, &args, source.parent(), &[], COMPILE_TIMEOUT)
            .with_context(|| format!("failed to run {}", self.cl_path))?;

        // cl.exe reports diagnostics on stdout.
        let diagnostics = format!("{}{}", out.stdout, out.stderr);
        if !out.success() || !asm_path.exists() {
            tracing::debug!(source = %source.display(), "cl.exe compile failed");
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
