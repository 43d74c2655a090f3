//! 16.16 fixed-point helpers. Everything in the renderer that touches world
//! space goes through these so that results are identical on every thread.

pub type Fixed = i32;

pub const FRACBITS: i32 = 16;
pub const FRACUNIT: Fixed = 1 << FRACBITS;

/// Doom function name `FixedMul`
#[inline(always)]
pub const fn fixed_mul(a: Fixed, b: Fixed) -> Fixed {
    ((a as i64 * b as i64) >> FRACBITS) as Fixed
}

/// Doom function name `FixedDiv`. Saturates rather than trapping on overflow.
#[inline(always)]
pub const fn fixed_div(a: Fixed, b: Fixed) -> Fixed {
    if (a.unsigned_abs() >> 14) >= b.unsigned_abs() {
        if (a ^ b) < 0 { i32::MIN } else { i32::MAX }
    } else {
        (((a as i64) << FRACBITS) / b as i64) as Fixed
    }
}

/// Whole map units to fixed
#[inline]
pub const fn int_to_fixed(value: i32) -> Fixed {
    value << FRACBITS
}

/// Convert a Doom `fixed_t` fixed-point to `f32`
#[inline]
pub const fn fixed_to_float(value: Fixed) -> f32 {
    value as f32 / FRACUNIT as f32
}

#[inline]
pub fn float_to_fixed(value: f32) -> Fixed {
    (value * FRACUNIT as f32) as Fixed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mul_whole_units() {
        assert_eq!(fixed_mul(int_to_fixed(3), int_to_fixed(4)), int_to_fixed(12));
        assert_eq!(fixed_mul(int_to_fixed(-3), FRACUNIT / 2), -(3 << 15));
    }

    #[test]
    fn div_saturates() {
        assert_eq!(fixed_div(int_to_fixed(10), int_to_fixed(4)), (5 << 16) / 2);
        assert_eq!(fixed_div(int_to_fixed(1000), 1), i32::MAX);
        assert_eq!(fixed_div(-int_to_fixed(1000), 1), i32::MIN);
    }

    #[test]
    fn float_conversions() {
        assert_eq!(fixed_to_float(FRACUNIT / 4), 0.25);
        assert_eq!(float_to_fixed(1.5), FRACUNIT + FRACUNIT / 2);
    }
}
