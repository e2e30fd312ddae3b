/// Difficulty verification and retarget dispatch.
pub mod difficulty;
/// Gravity-well retarget algorithms.
pub mod gravity;
/// Static consensus parameters per chain.
pub mod params;
/// Validated chain parameters and proof-of-work verification.
pub mod registry;
/// Verification failures.
pub mod verification;

pub use difficulty::DifficultyEngine;
pub use params::Params;
pub use registry::{ChainParams, ChainRegistry, ParamsError};
pub use verification::VerificationError;
