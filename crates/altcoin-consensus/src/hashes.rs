//! Proof-of-work hash pipelines.
//!
//! Every supported chain hashes the same 80-byte serialized header, but with a
//! different function: double SHA-256 (Bitcoin, Dogecoin block identity),
//! scrypt with fixed parameters (Litecoin, Dogecoin proof-of-work) or the X11
//! cascade (Darkcoin). [`HashPipeline`] is the closed set of these functions.
//! All pipelines are stateless and may be shared freely between threads.

use std::fmt;

use bitcoin::hashes::{Hash, sha256d};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pow::PowHash;

/// Size of a serialized block header.
pub const HEADER_SIZE: usize = bitcoin::block::Header::SIZE;

/// Errors raised while running a hash pipeline.
///
/// These are configuration errors, never a property of the hashed header, so
/// callers must not fold them into a "proof of work failed" result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HashError {
    /// The scrypt parameter set was rejected.
    #[error("Invalid scrypt parameters {params}: {reason}")]
    ScryptParams {
        /// The offending parameter set.
        params: ScryptParams,
        /// Reason reported by the scrypt implementation.
        reason: String,
    },
    /// Key derivation failed after the parameters were accepted.
    #[error("Scrypt derivation failed: {0}")]
    Scrypt(String),
    /// The configured digest length is not the 32 bytes a PoW hash needs.
    #[error("Digest length {0} is not 32 bytes")]
    DigestLength(usize),
}

/// Parameters of the scrypt proof-of-work function.
///
/// The header is used as both password and salt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScryptParams {
    /// log2 of the CPU/memory cost `N`.
    pub log_n: u8,
    /// Block size.
    pub r: u32,
    /// Parallelism.
    pub p: u32,
    /// Output length in bytes.
    pub output_len: usize,
}

impl ScryptParams {
    /// N=1024, r=1, p=1, 32-byte output, as used by Litecoin and Dogecoin.
    pub const LITECOIN: Self = Self {
        log_n: 10,
        r: 1,
        p: 1,
        output_len: 32,
    };

    /// The cost parameter `N`.
    pub fn n(&self) -> u64 {
        1u64.checked_shl(u32::from(self.log_n)).unwrap_or(0)
    }

    fn to_scrypt(self) -> Result<scrypt::Params, HashError> {
        if self.output_len != 32 {
            return Err(HashError::DigestLength(self.output_len));
        }
        scrypt::Params::new(self.log_n, self.r, self.p, self.output_len).map_err(|e| {
            HashError::ScryptParams {
                params: self,
                reason: e.to_string(),
            }
        })
    }
}

impl fmt::Display for ScryptParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(N={}, r={}, p={}, len={})",
            self.n(),
            self.r,
            self.p,
            self.output_len
        )
    }
}

/// One stage of the X11 cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum X11Stage {
    Blake,
    Bmw,
    Groestl,
    Skein,
    Jh,
    Keccak,
    Luffa,
    CubeHash,
    Shavite,
    Simd,
    Echo,
}

/// The X11 stages in evaluation order. Every stage is 512-bit; each consumes
/// the previous stage's full 64-byte output and the first 32 bytes of the last
/// stage form the digest. `rs_x11_hash::get_x11_hash` runs this cascade.
pub const X11_STAGES: [X11Stage; 11] = [
    X11Stage::Blake,
    X11Stage::Bmw,
    X11Stage::Groestl,
    X11Stage::Skein,
    X11Stage::Jh,
    X11Stage::Keccak,
    X11Stage::Luffa,
    X11Stage::CubeHash,
    X11Stage::Shavite,
    X11Stage::Simd,
    X11Stage::Echo,
];

/// A header hashing function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "params", rename_all = "lowercase")]
pub enum HashPipeline {
    /// Double SHA-256.
    Sha256d,
    /// Scrypt with the header as password and salt.
    Scrypt(ScryptParams),
    /// The eleven-function X11 cascade.
    X11,
}

impl HashPipeline {
    /// Hashes a serialized header.
    ///
    /// # Returns
    ///
    /// * `Ok(PowHash)` - The digest, big-endian
    /// * `Err(HashError)` - If the pipeline is misconfigured
    pub fn hash(&self, header: &[u8; HEADER_SIZE]) -> Result<PowHash, HashError> {
        match self {
            HashPipeline::Sha256d => Ok(PowHash::from_internal(
                sha256d::Hash::hash(header).to_byte_array(),
            )),
            HashPipeline::Scrypt(params) => {
                let scrypt_params = params.to_scrypt()?;
                let mut out = [0u8; 32];
                scrypt::scrypt(header, header, &scrypt_params, &mut out)
                    .map_err(|e| HashError::Scrypt(e.to_string()))?;
                Ok(PowHash::from_internal(out))
            }
            HashPipeline::X11 => Ok(PowHash::from_internal(rs_x11_hash::get_x11_hash(header))),
        }
    }

    /// Checks the pipeline configuration without hashing anything.
    pub fn validate(&self) -> Result<(), HashError> {
        match self {
            HashPipeline::Scrypt(params) => params.to_scrypt().map(|_| ()),
            HashPipeline::Sha256d | HashPipeline::X11 => Ok(()),
        }
    }

    /// Short lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            HashPipeline::Sha256d => "sha256d",
            HashPipeline::Scrypt(_) => "scrypt",
            HashPipeline::X11 => "x11",
        }
    }
}

impl fmt::Display for HashPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashPipeline::Scrypt(params) => write!(f, "scrypt{params}"),
            other => f.write_str(other.name()),
        }
    }
}
