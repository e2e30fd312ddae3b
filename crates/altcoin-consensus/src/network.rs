use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consensus::Params;

/// Errors that can occur when parsing a chain type.
#[derive(Clone, Debug, Error)]
pub enum ChainTypeError {
    /// The provided chain type string is invalid.
    #[error("Invalid chain type: {0}")]
    InvalidChainType(String),
}

/// The supported chains.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Chain {
    /// Bitcoin main network.
    Bitcoin,
    /// The second Bitcoin test network.
    BitcoinTestnet2,
    /// Litecoin main network.
    Litecoin,
    /// Litecoin test network.
    LitecoinTestnet,
    /// Dogecoin main network.
    Dogecoin,
    /// Darkcoin main network.
    Darkcoin,
}

impl Chain {
    /// Every supported chain, in registry order.
    pub const ALL: [Chain; 6] = [
        Chain::Bitcoin,
        Chain::BitcoinTestnet2,
        Chain::Litecoin,
        Chain::LitecoinTestnet,
        Chain::Dogecoin,
        Chain::Darkcoin,
    ];

    /// Returns the string representation of this chain.
    ///
    /// # Returns
    ///
    /// A string slice representing the chain name
    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Bitcoin => "bitcoin",
            Chain::BitcoinTestnet2 => "bitcoin-testnet2",
            Chain::Litecoin => "litecoin",
            Chain::LitecoinTestnet => "litecoin-testnet",
            Chain::Dogecoin => "dogecoin",
            Chain::Darkcoin => "darkcoin",
        }
    }

    /// Returns the reverse-DNS chain identifier.
    pub fn id(&self) -> &'static str {
        self.consensus_params().id
    }

    /// Returns the consensus parameters for this chain.
    pub fn consensus_params(self) -> Params {
        match self {
            Chain::Bitcoin => Params::BITCOIN,
            Chain::BitcoinTestnet2 => Params::BITCOIN_TESTNET2,
            Chain::Litecoin => Params::LITECOIN,
            Chain::LitecoinTestnet => Params::LITECOIN_TESTNET,
            Chain::Dogecoin => Params::DOGECOIN,
            Chain::Darkcoin => Params::DARKCOIN,
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = ChainTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Chain::try_from(s)
    }
}

impl TryFrom<&str> for Chain {
    type Error = ChainTypeError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "bitcoin" | "btc" | "org.bitcoin.production" => Ok(Chain::Bitcoin),
            "bitcoin-testnet2" | "testnet2" | "org.bitcoin.test" => Ok(Chain::BitcoinTestnet2),
            "litecoin" | "ltc" | "org.litecoin.production" => Ok(Chain::Litecoin),
            "litecoin-testnet" | "org.litecoin.testnet" => Ok(Chain::LitecoinTestnet),
            "dogecoin" | "doge" | "org.dogecoin.production" => Ok(Chain::Dogecoin),
            "darkcoin" | "drk" | "org.darkcoin.production" => Ok(Chain::Darkcoin),
            other => Err(ChainTypeError::InvalidChainType(other.to_string())),
        }
    }
}

impl TryFrom<String> for Chain {
    type Error = ChainTypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Chain::try_from(s.as_str())
    }
}
