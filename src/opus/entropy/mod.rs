pub mod bits;
pub mod error;
pub mod model;

use integer_sqrt::IntegerSquareRoot;
use log::{debug, trace};

use self::{
    bits::{BigEndianBitReader, BitSupply, RawBitReader},
    error::{RangeCodingError, Result},
};

/// Range decoder for the entropy coded part of an Opus/CELT frame. The
/// arithmetic coded symbols are read front to back through a [`BitSupply`],
/// while raw bits are taken back to front from the tail of the same frame.
///
/// None of the decode primitives fail. Running out of input yields zero bits
/// and the caller validates the whole frame once, through [`Self::finish`].
#[derive(Debug, Clone)]
pub struct RangeCodingDecoder<'a, R = BigEndianBitReader<'a>> {
    // Used to read forward bitstreams.
    forward_reader: R,
    // For reading reverse bitstreams (rawbits use)
    reverse_reader: RawBitReader<'a>,
    frame: &'a [u8],
    // Total number of input bits.
    bitstream_length: u32,
    // Current decoder range (similar to the difference between the upper and
    // lower limits)
    current_range: u32,
    // Current cumulative value.
    coded_value: u32,
    // Total bits consumed (for tell/tell_frac)
    consumed_bits: u32,
    // Raw bits handed out over the life of the decoder.
    raw_consumed_bits: u32,
}

impl<R> RangeCodingDecoder<'_, R> {
    // Number of bits used per symbol (8 bits)
    const SYMBOL_BITS: u32 = 8;

    // Symbol Maximum (255)
    const SYMBOL_MAX: u32 = (1 << Self::SYMBOL_BITS) - 1;

    // Above this many bits a uniform value is split into a range coded head
    // and a raw tail.
    const UNIFORM_THRESHOLD_BITS: u32 = 8;

    // Encoder upper limit value (highest bit is 1)
    const CODE_TOP: u32 = 1 << (32 - 1);

    // Minimum legal interval (needs to be normalized)
    const CODE_BOT: u32 = Self::CODE_TOP >> Self::SYMBOL_BITS;

    // Laplace distributions live in a 15-bit probability space.
    const LAPLACE_BITS: u32 = 15;
    const LAPLACE_TOTAL: u32 = 1 << Self::LAPLACE_BITS;
}

impl<'a> RangeCodingDecoder<'a> {
    /// Starts decoding a frame that spans all of `bytes`.
    pub fn new(bytes: &'a [u8]) -> Result<Self> {
        Self::with_size(bytes, bytes.len())
    }

    /// Starts decoding a frame made of the first `size` bytes of `bytes`.
    pub fn with_size(bytes: &'a [u8], size: usize) -> Result<Self> {
        if size > bytes.len() {
            return Err(RangeCodingError::SizeMismatch {
                size,
                available: bytes.len(),
            });
        }

        let frame = &bytes[..size];
        Self::from_supply(BigEndianBitReader::new(frame), frame)
    }
}

impl<'a, R: BitSupply> RangeCodingDecoder<'a, R> {
    /// Starts decoding `frame` with a caller provided forward bit supply.
    ///
    /// `forward_reader` must be positioned at the first bit of `frame`. The
    /// raw bit cursor starts at the end of `frame`, see [`Self::raw_init`].
    pub fn from_supply(mut forward_reader: R, frame: &'a [u8]) -> Result<Self> {
        if frame.is_empty() {
            return Err(RangeCodingError::EmptyFrame);
        }

        // Bit counts are kept in eighths by tell_frac, which bounds the frame
        // size.
        let bitstream_length = u32::try_from(frame.len())
            .ok()
            .filter(|len| len.checked_mul(64).is_some())
            .map(|len| len * 8)
            .ok_or(RangeCodingError::FrameTooLarge(frame.len()))?;

        // Reads 7 bits and subtracts it from 127 to get the initial value.
        let coded_value = 127 - forward_reader.get_bits(7);

        let mut this = Self {
            reverse_reader: RawBitReader::new(frame, frame.len(), frame.len()),
            consumed_bits: Self::SYMBOL_BITS + 1,
            raw_consumed_bits: 0,
            current_range: 128,
            bitstream_length,
            coded_value,
            forward_reader,
            frame,
        };

        // Ensure that the initial state is legal.
        this.ensure_valid_range();

        trace!("range decoder over a {} byte frame", frame.len());

        Ok(this)
    }

    /// Re-seats the raw bit cursor so that it reads `count` bytes backwards
    /// from byte index `end` of the frame.
    pub fn raw_init(&mut self, end: usize, count: usize) -> Result<()> {
        if end > self.frame.len() || count > end {
            return Err(RangeCodingError::InvalidRawRegion { end, count });
        }

        trace!("raw bits from {} bytes below offset {}", count, end);

        self.reverse_reader = RawBitReader::new(self.frame, end, count);
        Ok(())
    }

    /// Ensure that range is not less than CODE_BOT (to prevent loss of precision)
    fn ensure_valid_range(&mut self) {
        while self.current_range <= Self::CODE_BOT {
            // Expands the value each time and reads a new 8bit replacement
            // SYM_MAX after XOR for CELT decoding compatibility.
            self.coded_value = ((self.coded_value << Self::SYMBOL_BITS)
                | (self.forward_reader.get_bits(Self::SYMBOL_BITS) ^ Self::SYMBOL_MAX))
                & (Self::CODE_TOP - 1);

            // Interval scaling to maintain accuracy.
            self.current_range <<= Self::SYMBOL_BITS;
            self.consumed_bits += Self::SYMBOL_BITS;
        }
    }

    /// Narrows the interval to `[low, high)` out of `total` and renormalizes.
    fn update_range_and_value(&mut self, scale: u32, low: u32, high: u32, total: u32) {
        // Size of the part of the interval above `high`.
        let size = scale * (total - high);

        self.coded_value -= size;

        // The symbol touching zero takes whatever is left of the range, which
        // also absorbs the rounding of `scale`.
        self.current_range = if low != 0 {
            scale * (high - low)
        } else {
            self.current_range - size
        };

        self.ensure_valid_range();
    }

    /// Get the probability interval where the current value is located, and
    /// calculate the current symbol index.
    fn get_scale_symbol(&self, total: u32) -> (u32, u32) {
        let range_scale = self.current_range / total;

        // value The inverse index mapped to the distribution (the further back,
        // the smaller the value)
        (
            range_scale,
            total - (self.coded_value / range_scale + 1).min(total),
        )
    }

    /// Dichotomous decoding: cut the current interval by 2^logp, return true
    /// or false.
    ///
    /// `true` is the unlikely symbol, with probability `1/2^logp`.
    pub fn logp(&mut self, logp: u32) -> bool {
        debug_assert!(logp < 32);

        let range_scale = self.current_range >> logp;

        let result = if range_scale > self.coded_value {
            self.current_range = range_scale;

            true
        } else {
            self.current_range -= range_scale;
            self.coded_value -= range_scale;

            false
        };

        self.ensure_valid_range();
        result
    }

    /// Decodes a symbol against a cumulative frequency table.
    ///
    /// `cdf[0]` is the total frequency and the remaining entries are the
    /// increasing cumulative counts, ending with the total. The returned index
    /// is in `0..cdf.len() - 1`.
    pub fn cdf(&mut self, cdf: &[u16]) -> usize {
        let total = cdf[0] as u32;
        let dist = &cdf[1..];

        debug_assert!(total > 0);
        debug_assert_eq!(dist.last().map(|v| *v as u32), Some(total));

        let (range_scale, symbol_index) = self.get_scale_symbol(total);

        // Determine the probability interval corresponding to the current
        // symbol and then update the decoder state
        let value = dist
            .iter()
            .position(|v| *v as u32 > symbol_index)
            .unwrap_or(dist.len() - 1);

        self.update_range_and_value(
            range_scale,
            if value > 0 { dist[value - 1] as u32 } else { 0 },
            dist[value] as u32,
            total,
        );

        value
    }

    /// Returns the number of bits currently consumed (integer)
    pub fn tell(&self) -> u32 {
        self.consumed_bits - self.current_range.ilog2() - 1
    }

    /// Returns the number of bits currently consumed in 1/8 bit units.
    pub fn tell_frac(&self) -> u32 {
        let mut log2_range = self.current_range.ilog2() + 1;
        let mut range_q15 = self.current_range >> (log2_range - 16);

        // Three squarings of the normalized range give the next three bits of
        // log2(range).
        for _ in 0..3 {
            range_q15 = (range_q15 * range_q15) >> 15;

            let lastbit = range_q15 >> 16;
            log2_range = log2_range << 1 | lastbit;
            range_q15 >>= lastbit;
        }

        (self.consumed_bits << 3) - log2_range
    }

    /// Size of the frame in bits.
    pub fn frame_bits(&self) -> u32 {
        self.bitstream_length
    }

    pub fn available(&self) -> u32 {
        self.bitstream_length.saturating_sub(self.tell())
    }

    pub fn available_frac(&self) -> u32 {
        (self.bitstream_length << 3).saturating_sub(self.tell_frac())
    }

    /// Whether the range coded data ran into raw bits already taken from the
    /// tail of the frame.
    pub fn cursors_crossed(&self) -> bool {
        let raw_bits = self.reverse_reader.bits_read();
        if raw_bits == 0 {
            return false;
        }

        let coded_bits = self.tell().saturating_sub(self.raw_consumed_bits) as usize;
        coded_bits + raw_bits > self.reverse_reader.end() * 8
    }

    /// Validates the frame once decoding is done.
    ///
    /// Decoding past the end of the data is never reported by the individual
    /// primitives; this is where a corrupt or truncated frame shows up.
    pub fn finish(&self) -> Result<()> {
        let consumed = self.tell();
        if consumed > self.bitstream_length {
            debug!(
                "frame overrun, consumed {} of {} bits",
                consumed, self.bitstream_length
            );

            return Err(RangeCodingError::BudgetExceeded {
                consumed,
                budget: self.bitstream_length,
            });
        }

        if self.cursors_crossed() {
            debug!("range coded data overlaps the raw bits");

            return Err(RangeCodingError::CursorsCrossed);
        }

        Ok(())
    }
}

pub trait CeltRangeCoding {
    fn rawbits(&mut self, len: u32) -> u32;
    fn uniform(&mut self, len: u32) -> u32;
    fn laplace(&mut self, symbol: u32, decay: u32) -> i32;
    fn step(&mut self, k0: u32) -> u32;
    fn triangular(&mut self, qn: u32) -> u32;
    fn to_end(&mut self);
}

impl<R: BitSupply> CeltRangeCoding for RangeCodingDecoder<'_, R> {
    /// Read raw bits without probabilistic modeling (CELT will use reverse
    /// bitstream to do complementary)
    fn rawbits(&mut self, len: u32) -> u32 {
        self.consumed_bits += len;
        self.raw_consumed_bits += len;

        self.reverse_reader.get_bits(len)
    }

    /// Decode uniformly distributed integer values (0 to len-1)
    fn uniform(&mut self, len: u32) -> u32 {
        debug_assert!(len > 0);

        // Significant bits of the largest value.
        let bits = u32::BITS - (len - 1).leading_zeros();

        // If bits exceeds UNI_BITS, narrow the denominator first and then add
        // rawbits; otherwise, decode directly.
        let total = if bits > Self::UNIFORM_THRESHOLD_BITS {
            ((len - 1) >> (bits - Self::UNIFORM_THRESHOLD_BITS)) + 1
        } else {
            len
        };

        let (range_scale, symbol_idx) = self.get_scale_symbol(total);

        self.update_range_and_value(range_scale, symbol_idx, symbol_idx + 1, total);

        if bits > Self::UNIFORM_THRESHOLD_BITS {
            let value = symbol_idx << (bits - Self::UNIFORM_THRESHOLD_BITS)
                | self.rawbits(bits - Self::UNIFORM_THRESHOLD_BITS);

            value.min(len - 1)
        } else {
            symbol_idx
        }
    }

    /// Decoding Laplace distributions (for centrosymmetric structures)
    ///
    /// `symbol` is the mass of zero and `decay` the Q15 ratio between the
    /// masses of consecutive magnitudes, both out of `1 << 15`.
    fn laplace(&mut self, mut symbol: u32, decay: u32) -> i32 {
        debug_assert!(symbol <= Self::LAPLACE_TOTAL - 32 && decay < 1 << 14);

        let range_scale = self.current_range >> Self::LAPLACE_BITS;

        // Constructed center value: the closer to 0 the more likely it is to be
        // sampled, consistent with the properties of the Laplace distribution.
        // center is larger, the more off-center it is.
        let center = Self::LAPLACE_TOTAL
            - (self.coded_value / range_scale + 1).min(Self::LAPLACE_TOTAL);

        let mut value = 0;
        let mut low = 0;

        // Starting at center, the exponential expansion looks for possible
        // symbolic values on both sides.
        if center >= symbol {
            value = 1;
            low = symbol;
            symbol = 1 + ((Self::LAPLACE_TOTAL - 32 - symbol) * ((1 << 14) - decay) >> 15);

            while symbol > 1 && center >= low + 2 * symbol {
                value += 1;
                symbol *= 2;
                low += symbol;

                // Exponential decay: the probability decreases with distance
                // from the center.
                symbol = (((symbol - 2) * decay) >> 15) + 1;
            }

            // Past this point every magnitude has the minimum mass, so the
            // rest of the way is a direct division.
            if symbol <= 1 {
                let dist = (center - low) >> 1;
                value += dist as i32;
                low += 2 * dist;
            }

            // The negative half of each magnitude comes first.
            if center < low + symbol {
                value = -value;
            } else {
                low += symbol;
            }
        }

        self.update_range_and_value(
            range_scale,
            low,
            Self::LAPLACE_TOTAL.min(low + symbol),
            Self::LAPLACE_TOTAL,
        );

        value
    }

    /// CELT custom non-uniform distribution modeler (for pulse-distributed coding)
    ///
    /// Symbols up to and including `k0` weigh 3, the `k0` symbols after weigh 1.
    fn step(&mut self, k0: u32) -> u32 {
        let k1 = (k0 + 1) * 3;
        let total = k1 + k0;
        let (range_scale, symbol) = self.get_scale_symbol(total);

        // First half: each k maps to three symbols.
        // Second half: each k maps to a symbol (asymmetric)
        let k = if symbol < k1 {
            symbol / 3
        } else {
            symbol - (k0 + 1) * 2
        };

        if k <= k0 {
            self.update_range_and_value(range_scale, 3 * k, 3 * (k + 1), total);
        } else {
            self.update_range_and_value(range_scale, k1 + (k - 1 - k0), k1 + (k - k0), total);
        }

        k
    }

    /// Decoding a triangular distribution (pulse-symmetric encoding of CELT)
    ///
    /// `qn` must be even; symbol `k` weighs `k + 1` up to `qn / 2` and
    /// `qn + 1 - k` after.
    fn triangular(&mut self, qn: u32) -> u32 {
        debug_assert!(qn % 2 == 0);

        let half_level = qn >> 1;
        let total = (half_level + 1) * (half_level + 1);
        let range_scale = self.current_range / total;

        // center maps to an inverse-order integer, which is used to quickly
        // find the distribution segment on which it falls.
        let center = total - (self.coded_value / range_scale + 1).min(total);

        // Upper Triangle vs Lower Triangle distribution judgment.
        let (k, low, symbol) = if center < total >> 1 {
            // Bottom half: incremental fill from top left (top left to bottom right)
            let k = ((8 * center + 1).integer_sqrt() - 1) >> 1;

            (k, k * (k + 1) >> 1, k + 1)
        } else {
            // Top: Push back from the bottom right corner to the top left corner.
            let k = (2 * (qn + 1) - (8 * (total - center - 1) + 1).integer_sqrt()) >> 1;

            (k, total - ((qn + 1 - k) * (qn + 2 - k) >> 1), qn + 1 - k)
        };

        self.update_range_and_value(range_scale, low, low + symbol, total);

        k
    }

    /// Advances the decoder to the end of the data, patching unused bits
    /// (CELT is usually called)
    ///
    /// Afterwards `tell()` equals the frame size, even if the decoder had
    /// already overrun it.
    fn to_end(&mut self) {
        let consumed = self.tell();

        debug!(
            "skipping to the end of a {} bit frame at bit {}",
            self.bitstream_length, consumed
        );

        self.consumed_bits = self.consumed_bits - consumed + self.bitstream_length;
    }
}
