//! Validated per-chain parameters and the process-wide registry of them.
//!
//! [`ChainParams`] is the checked form of a static [`Params`]: its hash
//! pipelines are usable, its maximum target decodes and its genesis block
//! hashes to the chain's known value. It is built once at startup and passed
//! by reference afterwards.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::blockdata::block::{BlockHash, BlockHeader, header_bytes};
use crate::blockdata::genesis::{GenesisBlock, GenesisError};
use crate::consensus::difficulty::DifficultyEngine;
use crate::consensus::params::Params;
use crate::consensus::verification::VerificationError;
use crate::hashes::HashError;
use crate::network::Chain;
use crate::pow::{CompactTarget, PowHash, Target};

/// Errors raised while validating a chain's parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamsError {
    #[error(transparent)]
    Genesis(#[from] GenesisError),
    #[error(transparent)]
    Hash(#[from] HashError),
    /// The maximum target is zero, negative or overflows.
    #[error("Invalid maximum target {0}")]
    InvalidMaxTarget(CompactTarget),
    /// Spacing, timespan or interval is zero.
    #[error("Zero block timing in parameters for {0}")]
    ZeroTiming(Chain),
}

/// A chain's parameters after the startup self-check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainParams {
    params: Params,
    max_target: Target,
    genesis: GenesisBlock,
}

impl ChainParams {
    /// Validates `params` and builds the chain's genesis block.
    ///
    /// # Errors
    ///
    /// * `ParamsError::Hash` - A hash pipeline is misconfigured
    /// * `ParamsError::InvalidMaxTarget` - The maximum target does not decode
    ///   to a positive value
    /// * `ParamsError::ZeroTiming` - A timing constant is zero
    /// * `ParamsError::Genesis` - The genesis block does not hash to the
    ///   chain's known genesis hash
    pub fn new(params: Params) -> Result<Self, ParamsError> {
        params.pow_hash.validate()?;
        params.block_hash.validate()?;

        let max_target = Target::from_compact(params.max_target)
            .filter(|target| !target.is_zero())
            .ok_or(ParamsError::InvalidMaxTarget(params.max_target))?;

        if params.target_spacing == 0 || params.target_timespan == 0 || params.interval == 0 {
            return Err(ParamsError::ZeroTiming(params.chain));
        }

        let genesis = GenesisBlock::build(&params)?;
        debug!(
            chain = %params.chain,
            pow = %params.pow_hash,
            max_target = %params.max_target,
            "Chain parameters ready"
        );

        Ok(ChainParams {
            params,
            max_target,
            genesis,
        })
    }

    /// Validated parameters of a supported chain.
    pub fn for_chain(chain: Chain) -> Result<Self, ParamsError> {
        Self::new(chain.consensus_params())
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn chain(&self) -> Chain {
        self.params.chain
    }

    /// The easiest permitted target, decoded.
    pub fn max_target(&self) -> Target {
        self.max_target
    }

    pub fn genesis(&self) -> &GenesisBlock {
        &self.genesis
    }

    /// Difficulty engine bound to these parameters.
    pub fn difficulty(&self) -> DifficultyEngine<'_> {
        DifficultyEngine::new(self)
    }

    /// Runs the proof-of-work pipeline over `header`.
    pub fn pow_hash(&self, header: &BlockHeader) -> Result<PowHash, HashError> {
        self.params.pow_hash.hash(&header_bytes(header))
    }

    /// Computes `header`'s identity hash.
    pub fn block_hash(&self, header: &BlockHeader) -> Result<BlockHash, HashError> {
        Ok(self
            .params
            .block_hash
            .hash(&header_bytes(header))?
            .to_block_hash())
    }

    /// Decodes a declared target and checks it lies in `(0, max_target]`.
    pub fn declared_target(&self, bits: CompactTarget) -> Result<Target, VerificationError> {
        match Target::from_compact(bits) {
            Some(target) if !target.is_zero() && target <= self.max_target => Ok(target),
            _ => Err(VerificationError::BadTarget(bits)),
        }
    }

    /// Checks that `header`'s digest does not exceed its declared target.
    ///
    /// # Returns
    ///
    /// * `Ok(PowHash)` - The digest, which satisfies the target
    /// * `Err(VerificationError::ProofOfWork)` - The digest is too high
    /// * `Err(VerificationError::BadTarget)` - The declared target is unusable
    /// * `Err(VerificationError::Hash)` - The pipeline is misconfigured
    pub fn verify_proof_of_work(&self, header: &BlockHeader) -> Result<PowHash, VerificationError> {
        let target = self.declared_target(header.bits.into())?;
        let hash = self.pow_hash(header)?;
        if hash.to_target() > target {
            return Err(VerificationError::ProofOfWork { hash, target });
        }
        Ok(hash)
    }

    /// Non-raising form of [`ChainParams::verify_proof_of_work`].
    ///
    /// An insufficient digest yields `Ok(false)`. A bad declared target and a
    /// broken pipeline are still reported as errors.
    pub fn has_valid_proof_of_work(&self, header: &BlockHeader) -> Result<bool, VerificationError> {
        match self.verify_proof_of_work(header) {
            Ok(_) => Ok(true),
            Err(VerificationError::ProofOfWork { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }
}

/// Exactly one validated [`ChainParams`] per chain.
#[derive(Debug, Clone, Default)]
pub struct ChainRegistry {
    chains: BTreeMap<Chain, ChainParams>,
}

impl ChainRegistry {
    /// Validates every supported chain.
    pub fn new() -> Result<Self, ParamsError> {
        Self::with_chains(Chain::ALL)
    }

    /// Validates the given chains. Repeated chains are built once.
    pub fn with_chains<I>(chains: I) -> Result<Self, ParamsError>
    where
        I: IntoIterator<Item = Chain>,
    {
        let mut registry = ChainRegistry::default();
        for chain in chains {
            if !registry.chains.contains_key(&chain) {
                registry.chains.insert(chain, ChainParams::for_chain(chain)?);
            }
        }
        Ok(registry)
    }

    pub fn get(&self, chain: Chain) -> Option<&ChainParams> {
        self.chains.get(&chain)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChainParams> {
        self.chains.values()
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}
