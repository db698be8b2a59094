//! Server node configuration
//!
//! One TOML file per node. The private key is the hex-encoded secret
//! scalar; everything derived from it (public key, roster identity) is
//! recomputed at startup so the file stays minimal.

use std::path::Path;

use curve25519_dalek::ristretto::RistrettoPoint;
use serde::{Deserialize, Serialize};

use daga_core::suite;
use daga_core::KeyPair;

/// Failures while loading or interpreting a config file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("invalid key material: {0}")]
    Key(String),
}

/// Contents of a node's TOML config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Websocket listen address, e.g. `0.0.0.0:7001`
    pub listen: String,
    /// Hex-encoded secret scalar of the long-term key
    pub private_key: String,
    /// Operator label shown in rosters
    #[serde(default)]
    pub description: String,
    /// Contributions required before a client may aggregate; defaults to a
    /// roster majority when unset
    #[serde(default)]
    pub threshold: Option<usize>,
    /// Hex-encoded public keys of services allowed to create contexts;
    /// empty means any service is accepted
    #[serde(default)]
    pub service_keys: Vec<String>,
}

impl ServerConfig {
    /// Load and parse a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })
    }

    /// The node's long-term key pair
    pub fn keypair(&self) -> Result<KeyPair, ConfigError> {
        let bytes = hex::decode(&self.private_key)
            .map_err(|e| ConfigError::Key(format!("private_key is not hex: {e}")))?;
        let secret = suite::scalar_from_bytes(&bytes)
            .map_err(|e| ConfigError::Key(format!("private_key: {e}")))?;
        Ok(KeyPair::from_secret(secret))
    }

    /// The decoded service admission keys
    pub fn authorized_services(&self) -> Result<Vec<RistrettoPoint>, ConfigError> {
        self.service_keys
            .iter()
            .map(|hex_key| {
                let bytes = hex::decode(hex_key)
                    .map_err(|e| ConfigError::Key(format!("service key is not hex: {e}")))?;
                suite::point_from_bytes(&bytes)
                    .map_err(|e| ConfigError::Key(format!("service key: {e}")))
            })
            .collect()
    }
}
