//! Regression validators.
//!
//! A validator decides whether two compiled translation units are
//! equivalent. Both concrete variants compare normalized assembly; they
//! differ only in the optimization level they require from the compiler.

pub mod asm;

use std::sync::Arc;

use anyhow::{bail, Result};

use crate::compiler::CompiledFile;
use crate::registry::RegistryEntry;

pub const ASM_O0: &str = "asm_o0";
pub const ASM_O3: &str = "asm_o3";

pub trait Validator: Send + Sync {
    /// Stable identifier used in APIs. Do not change once set.
    fn id(&self) -> &'static str;
    fn name(&self) -> &'static str;
    /// Optimization level both sides must be compiled at.
    fn optimization_level(&self) -> u8;
    fn validate(&self, original: &CompiledFile, modified: &CompiledFile) -> bool;
}

/// Assembly comparison at a fixed optimization level. Conservative: any
/// doubt, including a failed compile on either side, is a rejection.
pub struct AsmValidator {
    level: u8,
}

impl Validator for AsmValidator {
    fn id(&self) -> &'static str {
        if self.level == 0 {
            ASM_O0
        } else {
            ASM_O3
        }
    }

    fn name(&self) -> &'static str {
        if self.level == 0 {
            "Assembly Comparison (O0)"
        } else {
            "Assembly Comparison (O3)"
        }
    }

    fn optimization_level(&self) -> u8 {
        self.level
    }

    fn validate(&self, original: &CompiledFile, modified: &CompiledFile) -> bool {
        if !original.succeeded() || !modified.succeeded() {
            tracing::debug!(
                source = %modified.source_path.display(),
                "rejecting: compile produced no assembly"
            );
            return false;
        }
        asm::compare_asm(&original.asm_text, &modified.asm_text)
    }
}

pub fn validator_from_id(id: &str) -> Result<Arc<dyn Validator>> {
    match id {
        ASM_O0 => Ok(Arc::new(AsmValidator { level: 0 })),
        ASM_O3 => Ok(Arc::new(AsmValidator { level: 3 })),
        other => bail!("unsupported validator: {other}"),
    }
}

pub fn available_validators() -> Vec<RegistryEntry> {
    vec![
        RegistryEntry {
            id: ASM_O0,
            name: "Assembly Comparison (O0)",
        },
        RegistryEntry {
            id: ASM_O3,
            name: "Assembly Comparison (O3)",
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn compiled(asm: &str) -> CompiledFile {
        CompiledFile {
            source_path: PathBuf::from("unit.cpp"),
            asm_text: asm.to_string(),
            diagnostics: String::new(),
        }
    }

    #[test]
    fn registry_round_trips_ids_and_levels() {
        let o0 = validator_from_id(ASM_O0).unwrap();
        assert_eq!(o0.optimization_level(), 0);
        assert_eq!(o0.id(), ASM_O0);

        let o3 = validator_from_id(ASM_O3).unwrap();
        assert_eq!(o3.optimization_level(), 3);
        assert_eq!(o3.id(), ASM_O3);

        assert!(validator_from_id("source_diff").is_err());
    }

    #[test]
    fn failed_compile_on_either_side_rejects() {
        let validator = validator_from_id(ASM_O0).unwrap();
        let good = compiled("f PROC\n  ret 0\nf ENDP\n");
        let bad = compiled("");
        assert!(!validator.validate(&good, &bad));
        assert!(!validator.validate(&bad, &good));
        assert!(validator.validate(&good, &good));
    }
}
