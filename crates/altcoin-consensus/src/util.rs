use bitcoin::BlockHash;
use bitcoin::consensus::encode;
use bitcoin::hashes::Hash;
use hex::FromHex;
use thiserror::Error;

use crate::blockdata::block::{BlockHeader, header_bytes};
use crate::hashes::HEADER_SIZE;

/// Errors raised while decoding a hex header.
#[derive(Debug, Error)]
pub enum HeaderHexError {
    #[error("Invalid header hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("Invalid header encoding: {0}")]
    Decode(#[from] encode::Error),
}

/// Convert a hex string to a BlockHash.
/// The hex string is in internal byte order, i.e. the reverse of how block
/// hashes are usually displayed.
pub fn hex_to_blockhash(hex: &str) -> Result<BlockHash, hex::FromHexError> {
    let bytes = <[u8; 32]>::from_hex(hex)?;
    Ok(BlockHash::from_byte_array(bytes))
}

/// Convert a display-order hex string (as printed by explorers) to a BlockHash.
pub fn display_hex_to_blockhash(hex: &str) -> Result<BlockHash, hex::FromHexError> {
    let mut bytes = <[u8; 32]>::from_hex(hex)?;
    bytes.reverse();
    Ok(BlockHash::from_byte_array(bytes))
}

/// Decode a serialized 80-byte header from hex.
pub fn header_from_hex(hex: &str) -> Result<BlockHeader, HeaderHexError> {
    let bytes = <[u8; HEADER_SIZE]>::from_hex(hex.trim())?;
    Ok(encode::deserialize(&bytes)?)
}

/// Encode a header as hex of its 80-byte serialization.
pub fn header_to_hex(header: &BlockHeader) -> String {
    hex::encode(header_bytes(header))
}
