//! IEEE-754 bit packing for REAL and LREAL.
//!
//! The encoder normalizes the host value into `m * 2^e` with `1 <= m < 2`,
//! then builds the sign, biased exponent and mantissa fields with integer
//! arithmetic. The first dropped mantissa bit rounds half up; a carry out of
//! the mantissa bumps the exponent.
//!
//! | Input | REAL bits | LREAL bits |
//! |-------|-----------|------------|
//! | `0.0` / `-0.0` | `0x0000_0000` / `0x8000_0000` | all zero / sign only |
//! | too large | `±0x7F80_0000` (infinity) | infinity |
//! | NaN | `0x7FC0_0000` | `0x7FF8_0000_0000_0000` |
//!
//! Values below the smallest normal are packed as subnormals (exponent 0).
//!
//! # Example
//!
//! ```
//! use tame_ads::ieee754::{decode_f32_bits, encode_f32_bits};
//!
//! assert_eq!(encode_f32_bits(1.0), 0x3F80_0000);
//! assert_eq!(encode_f32_bits(-2.5), 0xC020_0000);
//! assert_eq!(decode_f32_bits(0x4049_0FDB), 3.1415927410125732);
//! ```

/// Bit layout of one binary interchange format.
struct Format {
    exp_bits: u32,
    mant_bits: u32,
}

impl Format {
    const fn bias(&self) -> i32 {
        (1 << (self.exp_bits - 1)) - 1
    }

    const fn max_exp_field(&self) -> u64 {
        (1 << self.exp_bits) - 1
    }

    const fn sign_bit(&self) -> u64 {
        1 << (self.exp_bits + self.mant_bits)
    }

    const fn quiet_nan(&self) -> u64 {
        (self.max_exp_field() << self.mant_bits) | (1 << (self.mant_bits - 1))
    }
}

const BINARY32: Format = Format {
    exp_bits: 8,
    mant_bits: 23,
};

const BINARY64: Format = Format {
    exp_bits: 11,
    mant_bits: 52,
};

/// Packs a host number into a REAL bit pattern.
pub fn encode_f32_bits(value: f64) -> u32 {
    // binary32 fits in the low 32 bits
    pack(value, &BINARY32) as u32
}

/// Unpacks a REAL bit pattern.
pub fn decode_f32_bits(bits: u32) -> f64 {
    unpack(u64::from(bits), &BINARY32)
}

/// Packs a host number into an LREAL bit pattern.
pub fn encode_f64_bits(value: f64) -> u64 {
    pack(value, &BINARY64)
}

/// Unpacks an LREAL bit pattern.
pub fn decode_f64_bits(bits: u64) -> f64 {
    unpack(bits, &BINARY64)
}

fn pack(value: f64, fmt: &Format) -> u64 {
    if value.is_nan() {
        return fmt.quiet_nan();
    }
    let sign = if value.is_sign_negative() {
        fmt.sign_bit()
    } else {
        0
    };
    let abs = value.abs();
    if abs == 0.0 {
        return sign;
    }
    let infinity = sign | (fmt.max_exp_field() << fmt.mant_bits);
    if abs.is_infinite() {
        return infinity;
    }

    let (m, e) = normalize(abs);
    let biased = e + fmt.bias();
    let hidden = 1u64 << fmt.mant_bits;

    if biased >= 1 {
        // normal: mantissa holds the fraction of m
        let mut mant = round_half_up(scale_pow2(m - 1.0, fmt.mant_bits as i32));
        let mut exp = biased as u64;
        if mant == hidden {
            mant = 0;
            exp += 1;
        }
        if exp >= fmt.max_exp_field() {
            return infinity;
        }
        sign | (exp << fmt.mant_bits) | mant
    } else {
        // subnormal: abs / 2^(1 - bias - mant_bits); a carry to `hidden`
        // lands exactly on the smallest normal
        let shift = e - (1 - fmt.bias() - fmt.mant_bits as i32);
        sign | round_half_up(scale_pow2(m, shift))
    }
}

fn unpack(bits: u64, fmt: &Format) -> f64 {
    let negative = bits & fmt.sign_bit() != 0;
    let exp = (bits >> fmt.mant_bits) & fmt.max_exp_field();
    let mant = bits & ((1u64 << fmt.mant_bits) - 1);

    let magnitude = if exp == fmt.max_exp_field() {
        if mant != 0 {
            return f64::NAN;
        }
        f64::INFINITY
    } else if exp == 0 {
        scale_pow2(mant as f64, 1 - fmt.bias() - fmt.mant_bits as i32)
    } else {
        let significand = (mant | (1u64 << fmt.mant_bits)) as f64;
        scale_pow2(significand, exp as i32 - fmt.bias() - fmt.mant_bits as i32)
    };

    if negative {
        -magnitude
    } else {
        magnitude
    }
}

/// Splits a positive finite value into `m * 2^e` with `1 <= m < 2`.
fn normalize(abs: f64) -> (f64, i32) {
    const CHUNK: i32 = 64;
    let big = scale_pow2(1.0, CHUNK);
    let small = scale_pow2(1.0, -CHUNK);

    let mut m = abs;
    let mut e = 0;
    while m >= big {
        m *= small;
        e += CHUNK;
    }
    while m < small {
        m *= big;
        e -= CHUNK;
    }
    while m >= 2.0 {
        m *= 0.5;
        e += 1;
    }
    while m < 1.0 {
        m *= 2.0;
        e -= 1;
    }
    (m, e)
}

/// Multiplies by `2^n`, exact while the result stays normal.
fn scale_pow2(mut x: f64, mut n: i32) -> f64 {
    const STEP: f64 = 4_294_967_296.0; // 2^32
    const INV_STEP: f64 = 1.0 / 4_294_967_296.0;
    while n >= 32 {
        x *= STEP;
        n -= 32;
    }
    while n <= -32 {
        x *= INV_STEP;
        n += 32;
    }
    while n > 0 {
        x *= 2.0;
        n -= 1;
    }
    while n < 0 {
        x *= 0.5;
        n += 1;
    }
    x
}

fn round_half_up(x: f64) -> u64 {
    let whole = x.floor();
    let rounded = if x - whole >= 0.5 { whole + 1.0 } else { whole };
    rounded as u64
}
