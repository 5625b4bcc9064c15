use dsnode_core::PublicKey;
use thiserror::Error;

/// A broken round invariant.
///
/// A fault means an earlier protocol step was already corrupted; the round
/// cannot continue safely and the caller must stop driving it.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoundFault {
    #[error("round completed but winner {0} is not in the candidate pool")]
    WinnerMissing(PublicKey),

    #[error("agreement completed with no pending block to finalize")]
    NoPendingBlock,

    #[error("agreement completed with no consensus session installed")]
    NoSession,

    #[error("co-signatures already attached to block {0}")]
    AlreadySigned(u64),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Load(#[from] config::ConfigError),
}
