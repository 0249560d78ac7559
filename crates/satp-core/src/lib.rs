pub mod config;
pub mod error;
pub mod message;
pub mod session;
pub mod types;
pub mod verifier;

/// Generated protobuf types; source of truth is proto/satp/v1/*.proto
pub mod proto {
    pub mod satp {
        pub mod v1 {
            include!(concat!(env!("OUT_DIR"), "/satp.v1.rs"));
        }
    }
}

pub use error::{ErrorType, SatpError};
pub use message::{CommonBody, MessageType, Stage, SATP_VERSION};
pub use session::{MessageStageRecords, SatpSession, SessionData, SessionState};
pub use types::{Asset, CrashStatus, GatewayIdentity, LedgerType, NetworkId, Role};
