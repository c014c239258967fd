use std::fs;
use std::path::{Path, PathBuf};

use handles_attorney::HANDLES_PROTOCOL;
use handles_types::Token;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Port reserved for the block protocol itself.
pub const PROTOCOL_PORT: u16 = 6001;

/// Fewest blocks a node may keep: one checksum window.
pub const MIN_KEEP_N_BLOCKS: u64 = 900;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid token {0:?}")]
    InvalidToken(String),

    #[error("invalid admin port: {0} is reserved for protocol")]
    ReservedAdminPort(u16),

    #[error("keep_n_blocks {0} is less than {MIN_KEEP_N_BLOCKS}")]
    KeepTooFewBlocks(u64),

    #[error("no trusted providers")]
    NoTrustedProviders,

    #[error("providers size {size} is greater than trusted providers {trusted}")]
    ProvidersExceedTrusted { size: usize, trusted: usize },

    #[error("no trusted peers for non-genesis node")]
    NoTrustedPeers,
}

/// A remote node: its token and `host:port` address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub token: String,
    pub address: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Hex token identifying this node.
    pub token: String,
    pub admin_port: u16,
    /// Blocks kept in memory; also the checkpoint interval.
    pub keep_n_blocks: u64,
    pub trusted_providers: Vec<Peer>,
    /// How many trusted providers to pull blocks from.
    pub providers_size: usize,
    /// Directory for the vault journals. Memory-only when absent.
    pub notary_path: Option<PathBuf>,
    /// Start a fresh ledger instead of syncing from peers.
    pub genesis: bool,
    pub trusted_peers: Vec<Peer>,
    pub node_protocol: u32,
    pub parent_protocol: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            admin_port: 5403,
            keep_n_blocks: MIN_KEEP_N_BLOCKS,
            trusted_providers: Vec::new(),
            providers_size: 1,
            notary_path: None,
            genesis: false,
            trusted_peers: Vec::new(),
            node_protocol: HANDLES_PROTOCOL,
            parent_protocol: 0,
        }
    }
}

impl NodeConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load and validate in one step.
    pub fn load_checked(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.check()?;
        Ok(config)
    }

    pub fn check(&self) -> Result<(), ConfigError> {
        self.node_token()?;
        if self.admin_port == PROTOCOL_PORT {
            return Err(ConfigError::ReservedAdminPort(self.admin_port));
        }
        if self.keep_n_blocks < MIN_KEEP_N_BLOCKS {
            return Err(ConfigError::KeepTooFewBlocks(self.keep_n_blocks));
        }
        if self.trusted_providers.is_empty() {
            return Err(ConfigError::NoTrustedProviders);
        }
        if self.providers_size > self.trusted_providers.len() {
            return Err(ConfigError::ProvidersExceedTrusted {
                size: self.providers_size,
                trusted: self.trusted_providers.len(),
            });
        }
        if !self.genesis && self.trusted_peers.is_empty() {
            return Err(ConfigError::NoTrustedPeers);
        }
        for peer in self.trusted_providers.iter().chain(&self.trusted_peers) {
            parse_token(&peer.token)?;
        }
        Ok(())
    }

    pub fn node_token(&self) -> Result<Token, ConfigError> {
        parse_token(&self.token)
    }
}

fn parse_token(s: &str) -> Result<Token, ConfigError> {
    match Token::from_hex(s) {
        Ok(token) if token != Token::from_raw([0; 32]) => Ok(token),
        _ => Err(ConfigError::InvalidToken(s.to_string())),
    }
}
