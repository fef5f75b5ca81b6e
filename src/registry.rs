//! Registry entries for the closed tool families (compilers, validators,
//! mods). The id string is the only stable external identifier; names are
//! for display.

use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct RegistryEntry {
    pub id: &'static str,
    pub name: &'static str,
}
