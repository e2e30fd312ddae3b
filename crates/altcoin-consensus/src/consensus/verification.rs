use bitcoin::BlockHash;
use thiserror::Error;

use crate::hashes::HashError;
use crate::pow::{CompactTarget, PowHash, Target};

/// Reasons a header fails proof-of-work or difficulty verification.
///
/// Every variant except [`VerificationError::Hash`] rejects the candidate
/// block. `Hash` reports a misconfigured pipeline and is never a property of
/// the block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    /// The header's digest is above its declared target.
    #[error("Hash is higher than target: {hash} vs {target}")]
    ProofOfWork { hash: PowHash, target: Target },

    /// The declared target is zero, negative, overflowing or easier than the
    /// chain allows.
    #[error("Difficulty target is bad: {0}")]
    BadTarget(CompactTarget),

    /// A block that is not a retarget point changed the difficulty.
    #[error("Unexpected change in difficulty at height {height}: {declared} vs {expected}")]
    UnexpectedDifficultyChange {
        height: u32,
        declared: CompactTarget,
        expected: CompactTarget,
    },

    /// The retarget computed a different value than the header declares.
    #[error(
        "Network provided difficulty bits do not match what was calculated at height {height}: {computed} vs {declared}"
    )]
    DifficultyMismatch {
        height: u32,
        computed: CompactTarget,
        declared: CompactTarget,
    },

    /// A testnet block after a short gap did not keep the last real difficulty.
    #[error("Testnet block transition that is not allowed at height {height}: {expected} vs {declared}")]
    TestnetTransition {
        height: u32,
        expected: CompactTarget,
        declared: CompactTarget,
    },

    /// A walk that needs contiguous history did not find an ancestor.
    #[error(
        "Difficulty transition point but we did not find a way back to the genesis block: {hash} missing at height {height}"
    )]
    MissingAncestor { hash: BlockHash, height: u32 },

    /// A stored ancestor carries a target that cannot be decoded.
    #[error("Stored block at height {height} has an undecodable target {bits}")]
    InvalidStoredTarget { bits: CompactTarget, height: u32 },

    #[error(transparent)]
    Hash(#[from] HashError),
}
