//! CLI command implementations.

pub mod convert;
pub mod kinds;
pub mod load;
pub mod run;

pub use convert::convert_tree;
pub use kinds::list_kinds;
pub use load::load_session;
pub use run::run_script;

use anyhow::{Context, Result};
use std::path::Path;
use switchyard::{Registry, RegistryConfig};

/// Registry with the built-in kinds, configured from `config` when given
pub fn open_registry(config: Option<&Path>) -> Result<Registry> {
    let config = match config {
        Some(path) => RegistryConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => RegistryConfig::default(),
    };
    Registry::with_builtins(config).context("Failed to register built-in kinds")
}
