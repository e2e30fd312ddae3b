//! Genesis block information for the supported chains.
//!
//! Each chain's genesis header is rebuilt from constants and checked against the
//! hash the chain is known by. A mismatch means the constants or the hash
//! pipeline are wrong, and the chain must not be used.

use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash;
use bitcoin::opcodes::all::OP_CHECKSIG;
use bitcoin::script::{Builder, PushBytesBuf, PushBytesError};
use bitcoin::{
    Amount, BlockHash, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxMerkleNode, TxOut,
    Witness, transaction,
};
use hex::FromHex;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::blockdata::block::{BlockHeader, header_bytes};
use crate::consensus::Params;
use crate::hashes::HashError;
use crate::network::Chain;

/// Errors raised while building a genesis block.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenesisError {
    /// A hex constant failed to decode.
    #[error("Invalid hex in genesis constant: {0}")]
    Hex(#[from] hex::FromHexError),
    /// The coinbase output key cannot be pushed onto a script.
    #[error("Invalid genesis output key: {0}")]
    Script(#[from] PushBytesError),
    /// The hash pipeline is misconfigured.
    #[error(transparent)]
    Hash(#[from] HashError),
    /// The rebuilt genesis does not hash to the chain's known genesis hash.
    #[error("Genesis hash mismatch for {chain}: computed {computed}, expected {expected}")]
    HashMismatch {
        chain: Chain,
        computed: String,
        expected: &'static str,
    },
}

/// Source of the genesis merkle root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenesisCoinbase {
    /// Rebuild the single coinbase transaction and use its txid.
    Transaction {
        /// Hex of the coinbase input script.
        script_sig: &'static str,
        /// Hex of the uncompressed key paid with `<key> OP_CHECKSIG`.
        pubkey: &'static str,
        /// Output value in satoshis.
        reward: u64,
    },
    /// Merkle root given directly, in display (reversed) hex.
    MerkleRoot(&'static str),
}

/// Genesis block information for the supported chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GenesisInfo {
    pub coinbase: GenesisCoinbase,
    /// The version of the genesis block.
    pub version: i32,
    /// The timestamp of the genesis block.
    pub timestamp: u32,
    /// The bits (difficulty) of the genesis block.
    pub bits: u32,
    /// The nonce of the genesis block.
    pub nonce: u32,
    /// Expected identity hash, display hex.
    pub hash: &'static str,
}

const BITCOIN_SCRIPT_SIG: &str = "04ffff001d0104455468652054696d65732030332f4a616e2f32303039204368616e63656c6c6f72206f6e206272696e6b206f66207365636f6e64206261696c6f757420666f722062616e6b73";
const BITCOIN_PUBKEY: &str = "04678afdb0fe5548271967f1a67130b7105cd6a828e03909a67962e0ea1f61deb649f6bc3f4cef38c4f35504e51ec112de5c384df7ba0b8d578a4c702b6bf11d5f";
const LITECOIN_MERKLE_ROOT: &str =
    "97ddfbbae6be97fd6cdf3e7ca13232a3afff2353e29badfab7f73011edd4ced9";

const COIN: u64 = 100_000_000;

impl GenesisInfo {
    /// Bitcoin mainnet genesis.
    pub const BITCOIN: Self = Self {
        coinbase: GenesisCoinbase::Transaction {
            script_sig: BITCOIN_SCRIPT_SIG,
            pubkey: BITCOIN_PUBKEY,
            reward: 50 * COIN,
        },
        version: 1,
        timestamp: 1_231_006_505,
        bits: 0x1d00ffff,
        nonce: 2_083_236_893,
        hash: "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f",
    };

    /// Bitcoin testnet2 genesis. Same coinbase as mainnet.
    pub const BITCOIN_TESTNET2: Self = Self {
        timestamp: 1_296_688_602,
        bits: 0x1d07fff8,
        nonce: 384_568_319,
        hash: "00000007199508e34a9ff81e6ec0c477a4cccff2a4767a8eee39c11db367b008",
        ..Self::BITCOIN
    };

    pub const LITECOIN: Self = Self {
        coinbase: GenesisCoinbase::MerkleRoot(LITECOIN_MERKLE_ROOT),
        version: 1,
        timestamp: 1_317_972_665,
        bits: 0x1e0ffff0,
        nonce: 2_084_524_493,
        hash: "12a765e31ffd4059bada1e25190f6e98c99d9714d334efa41a195a7e7e04bfe2",
    };

    pub const LITECOIN_TESTNET: Self = Self {
        timestamp: 1_317_798_646,
        nonce: 385_270_584,
        hash: "f5ae71e26c74beacc88382716aced69cddf3dffff24f384e1808905e0188f68f",
        ..Self::LITECOIN
    };

    pub const DOGECOIN: Self = Self {
        coinbase: GenesisCoinbase::Transaction {
            script_sig: "04ffff001d0104084e696e746f6e646f",
            pubkey: "040184710fa689ad5023690c80f3a49c8f13f8d45b8c857fbcbc8bc4a8e4d3eb4b10f4d4604fa08dce601aaf0f470216fe1b51850b4acf21b179c45070ac7b03a9",
            reward: 88 * COIN,
        },
        version: 1,
        timestamp: 1_386_325_540,
        bits: 0x1e0ffff0,
        nonce: 99_943,
        hash: "1a91e3dace36e2be3bf030a65679fe821aa1d6ef92e7c9902eb318182c355691",
    };

    /// Darkcoin genesis. The identity hash is X11.
    pub const DARKCOIN: Self = Self {
        coinbase: GenesisCoinbase::MerkleRoot(
            "e0028eb9648db56b1ac77cf090b99048a8007e2bb64b68f092c03c7f56a662c7",
        ),
        version: 1,
        timestamp: 1_390_095_618,
        bits: 0x1e0ffff0,
        nonce: 28_917_698,
        hash: "00000ffd590b1485b3caadc19b22e6379c733355108f107a430458cdf3407ab6",
    };

    /// Returns the genesis block information for the specified chain.
    pub fn for_chain(chain: Chain) -> Self {
        chain.consensus_params().genesis
    }

    /// Rebuilds the coinbase transaction, if the chain defines one.
    pub fn coinbase_transaction(&self) -> Result<Option<Transaction>, GenesisError> {
        match self.coinbase {
            GenesisCoinbase::Transaction {
                script_sig,
                pubkey,
                reward,
            } => build_coinbase(script_sig, pubkey, reward).map(Some),
            GenesisCoinbase::MerkleRoot(_) => Ok(None),
        }
    }

    /// The genesis merkle root.
    pub fn merkle_root(&self) -> Result<TxMerkleNode, GenesisError> {
        match self.coinbase {
            GenesisCoinbase::MerkleRoot(display_hex) => {
                let mut bytes = <[u8; 32]>::from_hex(display_hex)?;
                bytes.reverse();
                Ok(TxMerkleNode::from_byte_array(bytes))
            }
            GenesisCoinbase::Transaction {
                script_sig,
                pubkey,
                reward,
            } => {
                // A single transaction is its own merkle root
                let txid = build_coinbase(script_sig, pubkey, reward)?.compute_txid();
                Ok(TxMerkleNode::from_raw_hash(txid.to_raw_hash()))
            }
        }
    }

    /// Converts the genesis information into a block header.
    pub fn to_header(&self) -> Result<BlockHeader, GenesisError> {
        Ok(BlockHeader {
            version: bitcoin::block::Version::from_consensus(self.version),
            prev_blockhash: BlockHash::all_zeros(),
            merkle_root: self.merkle_root()?,
            time: self.timestamp,
            bits: bitcoin::CompactTarget::from_consensus(self.bits),
            nonce: self.nonce,
        })
    }
}

fn build_coinbase(
    script_sig: &str,
    pubkey: &str,
    reward: u64,
) -> Result<Transaction, GenesisError> {
    let script_sig = ScriptBuf::from_bytes(Vec::from_hex(script_sig)?);
    let pubkey = PushBytesBuf::try_from(Vec::from_hex(pubkey)?)?;
    let script_pubkey = Builder::new()
        .push_slice(pubkey)
        .push_opcode(OP_CHECKSIG)
        .into_script();

    Ok(Transaction {
        version: transaction::Version::ONE,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: OutPoint::null(),
            script_sig,
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: Amount::from_sat(reward),
            script_pubkey,
        }],
    })
}

/// A built and self-checked genesis block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GenesisBlock {
    pub header: BlockHeader,
    /// Identity hash under the chain's block-hash pipeline.
    pub hash: BlockHash,
}

impl GenesisBlock {
    /// Builds the chain's genesis header and checks its identity hash.
    ///
    /// # Errors
    ///
    /// * `GenesisError::HashMismatch` - The rebuilt header does not hash to
    ///   the chain's known genesis hash
    /// * Any constant or pipeline error encountered on the way
    pub fn build(params: &Params) -> Result<Self, GenesisError> {
        let header = params.genesis.to_header()?;
        let digest = params.block_hash.hash(&header_bytes(&header))?;
        let computed = digest.to_string();
        if computed != params.genesis.hash {
            return Err(GenesisError::HashMismatch {
                chain: params.chain,
                computed,
                expected: params.genesis.hash,
            });
        }
        info!(chain = %params.chain, hash = %computed, "Genesis block verified");
        Ok(GenesisBlock {
            header,
            hash: digest.to_block_hash(),
        })
    }
}
