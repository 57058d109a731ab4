//! Constant probability models consumed by the CELT decode primitives.
//!
//! CDF tables are stored total first, followed by the increasing cumulative
//! counts, which is the layout [`RangeCodingDecoder::cdf`] expects.

use super::{CeltRangeCoding, RangeCodingDecoder, bits::BitSupply};

/// Post-filter tapset.
pub const TAPSET: [u16; 4] = [4, 2, 3, 4];

/// Coarse energy deltas of 0, -1 and +1, used when too few bits remain for
/// the Laplace model.
pub const ENERGY_SMALL: [u16; 4] = [4, 2, 3, 4];

/// Spreading decision.
pub const SPREAD: [u16; 5] = [32, 7, 9, 30, 32];

/// Allocation trim, 0 to 10.
pub const ALLOC_TRIM: [u16; 12] = [128, 2, 4, 9, 19, 41, 87, 109, 119, 124, 126, 128];

/// Laplace parameters for coarse energy, indexed by frame size (120, 240, 480
/// and 960 samples) then inter (0) / intra (1) prediction. Each band has a
/// pair `(symbol >> 7, decay >> 6)`.
pub const COARSE_ENERGY_MODEL: [[[u8; 42]; 2]; 4] = [
    [
        [
            // 120-sample inter
            72, 127, 65, 129, 66, 128, 65, 128, 64, 128, 62, 128, 64, 128, 64, 128, 92, 78, 92, 79,
            92, 78, 90, 79, 116, 41, 115, 40, 114, 40, 132, 26, 132, 26, 145, 17, 161, 12, 176, 10,
            177, 11,
        ],
        [
            // 120-sample intra
            24, 179, 48, 138, 54, 135, 54, 132, 53, 134, 56, 133, 55, 132, 55, 132, 61, 114, 70, 96,
            74, 88, 75, 88, 87, 74, 89, 66, 91, 67, 100, 59, 108, 50, 120, 40, 122, 37, 97, 43, 78,
            50,
        ],
    ],
    [
        [
            // 240-sample inter
            83, 78, 84, 81, 88, 75, 86, 74, 87, 71, 90, 73, 93, 74, 93, 74, 109, 40, 114, 36, 117,
            34, 117, 34, 143, 17, 145, 18, 146, 19, 162, 12, 165, 10, 178, 7, 189, 6, 190, 8, 177,
            9,
        ],
        [
            // 240-sample intra
            23, 178, 54, 115, 63, 102, 66, 98, 69, 99, 74, 89, 71, 91, 73, 91, 78, 89, 86, 80, 92,
            66, 93, 64, 102, 59, 103, 60, 104, 60, 117, 52, 123, 44, 138, 35, 133, 31, 97, 38, 77,
            45,
        ],
    ],
    [
        [
            // 480-sample inter
            61, 90, 93, 60, 105, 42, 107, 41, 110, 45, 116, 38, 113, 38, 112, 38, 124, 26, 132, 27,
            136, 19, 140, 20, 155, 14, 159, 16, 158, 18, 170, 13, 177, 10, 187, 8, 192, 6, 175, 9,
            159, 10,
        ],
        [
            // 480-sample intra
            21, 178, 59, 110, 71, 86, 75, 85, 84, 83, 91, 66, 88, 73, 87, 72, 92, 75, 98, 72, 105,
            58, 107, 54, 115, 52, 114, 55, 112, 56, 129, 51, 132, 40, 150, 33, 140, 29, 98, 35, 77,
            42,
        ],
    ],
    [
        [
            // 960-sample inter
            42, 121, 96, 66, 108, 43, 111, 40, 117, 44, 123, 32, 120, 36, 119, 33, 127, 33, 134, 34,
            139, 21, 147, 23, 152, 20, 158, 25, 154, 26, 166, 21, 173, 16, 184, 13, 184, 10, 150,
            13, 139, 15,
        ],
        [
            // 960-sample intra
            22, 178, 63, 114, 74, 82, 84, 83, 92, 82, 103, 62, 96, 72, 96, 67, 101, 73, 107, 72,
            113, 55, 118, 52, 125, 52, 118, 52, 117, 55, 135, 49, 137, 39, 157, 32, 145, 29, 97,
            33, 77, 40,
        ],
    ],
];

/// Laplace `(symbol, decay)` for `band`, bands past 20 share the last entry.
pub fn coarse_energy_params(model: &[u8; 42], band: usize) -> (u32, u32) {
    let idx = band.min(20) << 1;

    ((model[idx] as u32) << 7, (model[idx + 1] as u32) << 6)
}

/// Decodes one coarse energy delta, falling back to cheaper models as the
/// frame runs out of bits.
pub fn decode_coarse_energy_delta<R: BitSupply>(
    range_dec: &mut RangeCodingDecoder<'_, R>,
    model: &[u8; 42],
    band: usize,
) -> i32 {
    let available = range_dec.available();

    if available >= 15 {
        let (symbol, decay) = coarse_energy_params(model, band);
        range_dec.laplace(symbol, decay)
    } else if available >= 2 {
        // 0, -1, +1 zig-zag folded.
        let v = range_dec.cdf(&ENERGY_SMALL) as i32;
        (v >> 1) ^ -(v & 1)
    } else if available >= 1 {
        -(range_dec.logp(1) as i32)
    } else {
        -1
    }
}

#[cfg(test)]
mod test {
    use super::{
        ALLOC_TRIM, COARSE_ENERGY_MODEL, ENERGY_SMALL, SPREAD, TAPSET, coarse_energy_params,
        decode_coarse_energy_delta,
    };
    use crate::opus::entropy::RangeCodingDecoder;

    #[test]
    fn tables_are_well_formed() {
        let tables: [&[u16]; 4] = [&TAPSET, &ENERGY_SMALL, &SPREAD, &ALLOC_TRIM];

        for table in tables {
            assert_eq!(table.last(), Some(&table[0]));
            assert!(table[1..].windows(2).all(|w| w[0] < w[1]));
        }

        for model in COARSE_ENERGY_MODEL.iter().flatten() {
            for band in 0..21 {
                let (symbol, decay) = coarse_energy_params(model, band);
                assert!(symbol <= (1 << 15) - 32);
                assert!(decay < 1 << 14);
            }
        }
    }

    #[test]
    fn band_index_saturates() {
        let model = &COARSE_ENERGY_MODEL[3][0];

        assert_eq!(coarse_energy_params(model, 0), (42 << 7, 121 << 6));
        assert_eq!(coarse_energy_params(model, 20), (139 << 7, 15 << 6));
        assert_eq!(coarse_energy_params(model, 25), coarse_energy_params(model, 20));
    }

    #[test]
    fn coarse_energy_falls_back_as_bits_run_out() {
        let model = &COARSE_ENERGY_MODEL[0][1];

        // All-zero data keeps the value at the top of the range, which decodes
        // the first symbol of every model.
        let frame = [0u8; 3];
        let mut rd = RangeCodingDecoder::new(&frame).unwrap();
        assert_eq!(rd.available(), 23);

        let mut deltas = Vec::new();
        while rd.available() > 0 {
            deltas.push(decode_coarse_energy_delta(&mut rd, model, deltas.len()));
        }

        // Three Laplace decodes, thirteen small-model decodes, one bit.
        assert_eq!(deltas.len(), 17);
        assert!(deltas.iter().all(|d| *d == 0));
        assert_eq!(rd.tell(), 24);

        // Nothing left: the delta is fixed at -1 and no bits are consumed.
        let tell = rd.tell_frac();
        assert_eq!(decode_coarse_energy_delta(&mut rd, model, 0), -1);
        assert_eq!(rd.tell_frac(), tell);
    }
}
