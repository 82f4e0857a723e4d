//! rig-config: provider and physics configuration files.
//!
//! Two YAML documents feed the provider: the provider config (devices plus
//! the simulation section) and, in physics mode, a physics config referenced
//! by relative path (models, signal graph, rules). Both are validated fully
//! at load; a bad config aborts startup.

pub mod schema;
pub mod validate;

use std::path::{Path, PathBuf};

pub use schema::{
    DeviceSpec, GraphEdgeDef, ModelDef, PhysicsDef, PhysicsFile, ProviderConfig, RuleActionDef,
    RuleDef, SimulationDef, SimulationMode, TransformDef,
};
pub use validate::{condition_pattern, validate_physics, validate_provider, ValidationError};

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML error in '{path}': {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Load and validate the provider configuration.
pub fn load_provider_config(path: &Path) -> ConfigResult<ProviderConfig> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: ProviderConfig =
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
    validate_provider(&config)?;
    Ok(config)
}

/// Load and validate a physics configuration file.
pub fn load_physics_config(path: &Path) -> ConfigResult<PhysicsDef> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let physics = parse_physics_config(&content).map_err(|source| ConfigError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;
    validate_physics(&physics)?;
    Ok(physics)
}

/// Parse a physics configuration from its YAML content (no validation).
pub fn parse_physics_config(content: &str) -> Result<PhysicsDef, serde_yaml::Error> {
    let file: PhysicsFile = serde_yaml::from_str(content)?;
    Ok(file.physics)
}

/// Resolve the physics config path relative to the provider config file.
pub fn resolve_physics_path(provider_config_path: &Path, physics_config: &str) -> PathBuf {
    match provider_config_path.parent() {
        Some(dir) => dir.join(physics_config),
        None => PathBuf::from(physics_config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn physics_path_resolves_relative_to_config() {
        let resolved = resolve_physics_path(Path::new("/etc/rig/provider.yaml"), "physics.yaml");
        assert_eq!(resolved, Path::new("/etc/rig/physics.yaml"));
    }
}
