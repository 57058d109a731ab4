pub mod opus;

pub use opus::entropy::{
    CeltRangeCoding, RangeCodingDecoder,
    bits::{BigEndianBitReader, BitSupply, RawBitReader},
    error::{RangeCodingError, Result},
};
