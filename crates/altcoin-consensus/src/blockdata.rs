/// Block headers and stored blocks.
pub mod block;

/// Genesis block information for the supported chains.
pub mod genesis;
