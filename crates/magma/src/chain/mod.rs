//! Vulkan `pNext` structure chains
//!
//! [`structure`] holds the registry of extension structures a chain can
//! carry; [`StructureChain`] builds, copies and hashes chains of them.

pub mod structure;
mod structure_chain;

pub use structure::{ExtensionStructure, StructureInfo};
pub use structure_chain::StructureChain;
