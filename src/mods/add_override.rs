//! Add `override` to virtual member functions that lack it.

use anyhow::Result;

use crate::refactor::{AddFunctionQualifier, Qualifier, Refactoring};
use crate::symbols::{SymbolKind, SymbolTable};

use super::Mod;

pub const ID: &str = "add_override";
pub const NAME: &str = "Add Override Keywords";

pub struct AddOverrideMod;

impl Mod for AddOverrideMod {
    fn id(&self) -> &'static str {
        ID
    }

    fn name(&self) -> &'static str {
        NAME
    }

    fn plan(&self, symbols: &mut SymbolTable) -> Result<Vec<Box<dyn Refactoring>>> {
        let mut plan: Vec<Box<dyn Refactoring>> = Vec::new();
        for symbol in symbols.get_all_symbols(true)? {
            if symbol.kind != SymbolKind::Function || !symbol.is_member {
                continue;
            }
            if !symbol.has_qualifier("virtual") || symbol.has_qualifier("override") {
                continue;
            }
            plan.push(Box::new(AddFunctionQualifier {
                symbol,
                qualifier: Qualifier::Override,
            }));
        }
        tracing::info!(count = plan.len(), "planned override additions");
        Ok(plan)
    }
}
