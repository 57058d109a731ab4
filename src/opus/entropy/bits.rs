use bytes::Buf;

/// A forward bit source feeding the range decoder.
///
/// Bits are handed out most significant first. Reading past the end of the
/// underlying data is not an error: the missing bits read as zero and the
/// caller detects the overrun by comparing its bit accounting against the
/// frame budget.
///
/// The decoder itself only calls `get_bits`; the accounting methods are for
/// callers that own the supply and want their own end-of-input check.
pub trait BitSupply {
    /// Returns the next `n` bits (`n <= 32`) as the low bits of a `u32`.
    fn get_bits(&mut self, n: u32) -> u32;

    /// Number of bits handed out so far, including zero padding.
    fn bits_read(&self) -> usize;

    /// Number of bits actually backed by data.
    fn bits_total(&self) -> usize;

    fn is_exhausted(&self) -> bool {
        self.bits_read() >= self.bits_total()
    }
}

/// A big-endian reader.
///
/// Keeps a left-justified 64-bit cache that is topped up with whole bytes
/// whenever a request cannot be served from it.
#[derive(Debug, Clone)]
pub struct BigEndianBitReader<'a> {
    // Bytes not yet moved into the cache.
    bytes: &'a [u8],
    cache: u64,
    left: u32,
    consumed: usize,
    total: usize,
}

impl<'a> BigEndianBitReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        let mut this = Self {
            total: bytes.len() * 8,
            bytes,
            cache: 0,
            left: 0,
            consumed: 0,
        };

        this.refill();
        this
    }

    /// Moves as many whole bytes as fit into the cache.
    fn refill(&mut self) {
        let count = ((64 - self.left) / 8).min(self.bytes.remaining() as u32);
        if count == 0 {
            return;
        }

        let chunk = self.bytes.get_uint(count as usize);
        self.cache |= chunk << (64 - self.left - count * 8);
        self.left += count * 8;
    }
}

impl BitSupply for BigEndianBitReader<'_> {
    fn get_bits(&mut self, n: u32) -> u32 {
        debug_assert!(n <= 32, "at most 32 bits per read");

        if n == 0 {
            return 0;
        }

        if self.left < n {
            self.refill();
        }

        // Once the input is drained the cache shifts in zeros.
        let value = (self.cache >> (64 - n)) as u32;
        self.cache <<= n;
        self.left = self.left.saturating_sub(n);
        self.consumed += n as usize;

        value
    }

    fn bits_read(&self) -> usize {
        self.consumed
    }

    fn bits_total(&self) -> usize {
        self.total
    }
}

/// Reader for the raw bits CELT packs backwards from the end of a frame.
///
/// Bytes are consumed back to front and stacked into an LSB-first cache, so
/// the last byte of the frame supplies the first bits.
#[derive(Debug, Clone)]
pub struct RawBitReader<'a> {
    bytes: &'a [u8],
    end: usize,
    // One past the next byte to read.
    position: usize,
    bytes_remaining: usize,
    cache_value: u32,
    cache_bit_count: u32,
    bits_read: usize,
}

impl<'a> RawBitReader<'a> {
    /// Creates a reader whose cursor sits at `end` with `count` bytes below
    /// it available for reading.
    ///
    /// The caller guarantees `count <= end <= bytes.len()`.
    pub fn new(bytes: &'a [u8], end: usize, count: usize) -> Self {
        debug_assert!(end <= bytes.len() && count <= end);

        Self {
            bytes,
            end,
            position: end,
            bytes_remaining: count,
            cache_value: 0,
            cache_bit_count: 0,
            bits_read: 0,
        }
    }

    /// Reads `count` bits (at most 25). Zeros once the region is used up.
    pub fn get_bits(&mut self, count: u32) -> u32 {
        debug_assert!(count <= 25, "at most 25 raw bits per read");

        while self.bytes_remaining > 0 && self.cache_bit_count < count {
            self.position -= 1;
            self.cache_value |= (self.bytes[self.position] as u32) << self.cache_bit_count;
            self.cache_bit_count += 8;
            self.bytes_remaining -= 1;
        }

        let value = self.cache_value & ((1 << count) - 1);
        self.cache_value >>= count;
        self.cache_bit_count = self.cache_bit_count.saturating_sub(count);
        self.bits_read += count as usize;

        value
    }

    /// Index of the lowest byte read so far (the cursor position).
    pub fn position(&self) -> usize {
        self.position
    }

    /// One past the highest byte of the region.
    pub fn end(&self) -> usize {
        self.end
    }

    /// Number of bits handed out so far, including zero padding.
    pub fn bits_read(&self) -> usize {
        self.bits_read
    }

    pub fn bytes_remaining(&self) -> usize {
        self.bytes_remaining
    }

    /// Number of bytes taken off the end of the region so far.
    pub fn bytes_consumed(&self) -> usize {
        self.end - self.position
    }
}
