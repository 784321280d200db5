//! Callback plugins loaded from a shared library
//!
//! Each configured symbol must have the host calling convention of its table
//! (see [`ForeignConstraintSub`] and [`ForeignPotentialSub`]). Symbols are
//! registered in the order they are listed, so their indices are predictable.

use anyhow::{Context, Result};
use host_bridge_core::registry::{
    ForeignConstraint, ForeignConstraintSub, ForeignPotentialCallback, ForeignPotentialSub,
};
use host_bridge_core::{BridgeConfig, BridgeContext};
use libloading::Library;

use crate::config::PluginsConfig;

/// A registered symbol and the index it was given
#[derive(Debug, Clone)]
pub struct Registration {
    pub symbol: String,
    pub index: usize,
}

/// A bridge context populated from a plugin library
///
/// Field order matters: the context holds function pointers into the
/// library, so it is dropped first.
pub struct LoadedPlugins {
    pub bridge: BridgeContext,
    pub constraints: Vec<Registration>,
    pub potentials: Vec<Registration>,
    _library: Option<Library>,
}

/// Load the configured library and register every listed symbol
pub fn load_plugins(config: &PluginsConfig, bridge_config: BridgeConfig) -> Result<LoadedPlugins> {
    let mut bridge = BridgeContext::new(bridge_config);

    let Some(path) = &config.library else {
        log::info!("No plugin library configured");
        return Ok(LoadedPlugins {
            bridge,
            constraints: Vec::new(),
            potentials: Vec::new(),
            _library: None,
        });
    };

    log::info!("Loading plugin library: {:?}", path);
    // SAFETY: loading runs the library's initialisers; the library is
    // trusted to the same degree as the host itself.
    let library = unsafe { Library::new(path) }
        .with_context(|| format!("Failed to load plugin library: {:?}", path))?;

    let mut constraints = Vec::with_capacity(config.constraints.len());
    for symbol in &config.constraints {
        // SAFETY: the configuration declares this symbol a constraint subroutine
        let sub: ForeignConstraintSub = unsafe {
            *library
                .get::<ForeignConstraintSub>(symbol.as_bytes())
                .with_context(|| format!("Symbol not found: {}", symbol))?
        };
        // SAFETY: `library` is kept alive alongside the context
        let evaluator = unsafe { ForeignConstraint::new(sub) };
        let index = bridge
            .register_constraint(Box::new(evaluator))
            .with_context(|| format!("Failed to register constraint {}", symbol))?;
        log::debug!("Constraint {} -> #{}", symbol, index);
        constraints.push(Registration {
            symbol: symbol.clone(),
            index,
        });
    }

    let mut potentials = Vec::with_capacity(config.potentials.len());
    for symbol in &config.potentials {
        // SAFETY: the configuration declares this symbol a potential callback
        let sub: ForeignPotentialSub = unsafe {
            *library
                .get::<ForeignPotentialSub>(symbol.as_bytes())
                .with_context(|| format!("Symbol not found: {}", symbol))?
        };
        // SAFETY: `library` is kept alive alongside the context
        let callback = unsafe { ForeignPotentialCallback::new(sub) };
        let index = bridge
            .register_potential_callback(Box::new(callback))
            .with_context(|| format!("Failed to register potential callback {}", symbol))?;
        log::debug!("Potential callback {} -> #{}", symbol, index);
        potentials.push(Registration {
            symbol: symbol.clone(),
            index,
        });
    }

    Ok(LoadedPlugins {
        bridge,
        constraints,
        potentials,
        _library: Some(library),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_no_library_gives_empty_context() {
        let plugins = load_plugins(&PluginsConfig::default(), BridgeConfig::new()).unwrap();
        assert!(plugins.constraints.is_empty());
        assert!(plugins.potentials.is_empty());
        assert!(plugins.bridge.constraints().is_empty());
    }

    #[test]
    fn test_missing_library_reports_path() {
        let config = PluginsConfig {
            library: Some(PathBuf::from("/nonexistent/libplugins.so")),
            constraints: vec!["sphere_".to_string()],
            potentials: Vec::new(),
        };
        let err = load_plugins(&config, BridgeConfig::new()).err().unwrap();
        assert!(err.to_string().contains("libplugins.so"));
    }
}
