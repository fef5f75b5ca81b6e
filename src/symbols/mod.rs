//! Symbol extraction and indexing.
//!
//! An external doxygen run produces XML describing every symbol in the
//! repository as-written (macro expansion disabled); the parser turns that
//! into [`Symbol`] records and the [`SymbolTable`] keeps them queryable
//! with per-file invalidation.

pub mod doxygen;
pub mod model;
pub mod table;
pub mod xml;

pub use doxygen::{DoxygenRunner, SymbolExtractor};
pub use model::{Symbol, SymbolKind};
pub use table::SymbolTable;
