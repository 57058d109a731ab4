//! Decoder side of the Opus/CELT entropy coder.

pub mod entropy;
