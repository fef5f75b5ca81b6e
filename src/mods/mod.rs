//! Mods: repository-wide modernization planners.
//!
//! A mod inspects the symbol index and yields the atomic refactorings that
//! would carry out its intent. Mods never touch files themselves; the
//! engine applies and validates each refactoring individually. The order of
//! the returned plan is the order of application.

pub mod add_override;
pub mod remove_inline;

use anyhow::{bail, Result};

use crate::refactor::Refactoring;
use crate::registry::RegistryEntry;
use crate::symbols::SymbolTable;

pub use add_override::AddOverrideMod;
pub use remove_inline::RemoveInlineMod;

pub trait Mod: Send {
    /// Stable identifier used in APIs. Do not change once set.
    fn id(&self) -> &'static str;
    fn name(&self) -> &'static str;
    fn plan(&self, symbols: &mut SymbolTable) -> Result<Vec<Box<dyn Refactoring>>>;
}

pub fn mod_from_id(id: &str) -> Result<Box<dyn Mod>> {
    match id {
        add_override::ID => Ok(Box::new(AddOverrideMod)),
        remove_inline::ID => Ok(Box::new(RemoveInlineMod)),
        other => bail!("unsupported mod: {other}"),
    }
}

pub fn available_mods() -> Vec<RegistryEntry> {
    vec![
        RegistryEntry {
            id: add_override::ID,
            name: add_override::NAME,
        },
        RegistryEntry {
            id: remove_inline::ID,
            name: remove_inline::NAME,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_exposes_stable_ids() {
        let ids: Vec<_> = available_mods().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["add_override", "remove_inline"]);
        assert!(mod_from_id("add_override").is_ok());
        assert!(mod_from_id("rewrite_everything").is_err());
    }
}
