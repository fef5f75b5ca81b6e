//! Remove `inline` keywords across the repository.

use anyhow::Result;

use crate::refactor::{Qualifier, Refactoring, RemoveFunctionQualifier};
use crate::symbols::{SymbolKind, SymbolTable};

use super::Mod;

pub const ID: &str = "remove_inline";
pub const NAME: &str = "Remove Inline Keywords";

pub struct RemoveInlineMod;

impl Mod for RemoveInlineMod {
    fn id(&self) -> &'static str {
        ID
    }

    fn name(&self) -> &'static str {
        NAME
    }

    fn plan(&self, symbols: &mut SymbolTable) -> Result<Vec<Box<dyn Refactoring>>> {
        let mut plan: Vec<Box<dyn Refactoring>> = Vec::new();
        for symbol in symbols.get_all_symbols(true)? {
            if symbol.kind != SymbolKind::Function {
                continue;
            }
            if !symbol.has_qualifier("inline") {
                continue;
            }
            plan.push(Box::new(RemoveFunctionQualifier {
                symbol,
                qualifier: Qualifier::Inline,
            }));
        }
        tracing::info!(count = plan.len(), "planned inline removals");
        Ok(plan)
    }
}
