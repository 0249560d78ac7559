use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::SatpError;

/// Ledger technologies a gateway can front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedgerType {
    Fabric,
    Besu,
    Ethereum,
}

impl LedgerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fabric => "FABRIC",
            Self::Besu => "BESU",
            Self::Ethereum => "ETHEREUM",
        }
    }

    pub fn from_str_tag(tag: &str) -> Result<Self, SatpError> {
        match tag {
            "FABRIC" => Ok(Self::Fabric),
            "BESU" => Ok(Self::Besu),
            "ETHEREUM" => Ok(Self::Ethereum),
            other => Err(SatpError::UnsupportedNetwork {
                origin: other.to_string(),
                destination: String::new(),
            }),
        }
    }
}

impl fmt::Display for LedgerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identifies one network fronted by a gateway.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkId {
    /// Network identifier, e.g. "fabric-supply-net".
    pub id: String,
    /// The ledger technology behind this network.
    pub ledger_type: LedgerType,
}

impl NetworkId {
    pub fn new(id: impl Into<String>, ledger_type: LedgerType) -> Self {
        Self {
            id: id.into(),
            ledger_type,
        }
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ledger_type, self.id)
    }
}

/// An asset as tracked on one side of a transfer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub token_id: String,
    pub owner: String,
    /// Asset ontology reference (profile describing the asset class).
    pub ontology: String,
    pub contract_name: String,
    pub contract_address: String,
    /// Value in the smallest unit of the asset.
    pub amount: u128,
    /// Fabric MSP id, empty for EVM-backed assets.
    pub msp_id: String,
    /// Fabric channel name, empty for EVM-backed assets.
    pub channel_name: String,
}

/// Identity of a gateway, created at bootstrap and immutable thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayIdentity {
    /// Unique gateway id.
    pub id: String,
    /// Hex-encoded Ed25519 public key. Doubles as the transport identity.
    pub pub_key: String,
    /// Networks this gateway can front.
    pub supported_ledgers: Vec<NetworkId>,
    /// Reachable address (IP or hostname).
    pub address: String,
    /// Gateway-to-gateway port.
    pub port: u16,
}

impl GatewayIdentity {
    /// Whether this gateway fronts the given network.
    pub fn supports(&self, network_id: &str) -> bool {
        self.supported_ledgers.iter().any(|n| n.id == network_id)
    }
}

/// Which role a gateway plays in one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    pub fn opposite(&self) -> Role {
        match self {
            Self::Client => Self::Server,
            Self::Server => Self::Client,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => write!(f, "CLIENT"),
            Self::Server => write!(f, "SERVER"),
        }
    }
}

/// Outcome of one crash-detection pass over a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashStatus {
    /// Latest log entry is "done" and fresh; nothing to do.
    Idle,
    /// Latest log entry is not "done": a step was interrupted mid-flight.
    InRecovery,
    /// Latest entry is "done" but older than the session timeout.
    InRollback,
    /// The log repository is unreachable or holds no entry for the session.
    Error,
}

impl fmt::Display for CrashStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::InRecovery => write!(f, "IN_RECOVERY"),
            Self::InRollback => write!(f, "IN_ROLLBACK"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}
