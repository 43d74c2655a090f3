//! Binary angle measure. A full turn is the whole `u32` range so wrapping
//! arithmetic does the modulo for free.

use crate::fixed_point::{FRACUNIT, Fixed};
use lazy_static::lazy_static;

pub type Angle = u32;

pub const ANG45: Angle = 0x2000_0000;
pub const ANG90: Angle = 0x4000_0000;
pub const ANG180: Angle = 0x8000_0000;
pub const ANG270: Angle = 0xc000_0000;
pub const ANG1: Angle = ANG45 / 45;

// Size of the fine angle tables
pub const FINEANGLES: usize = 8192;
pub const FINEMASK: usize = FINEANGLES - 1;
pub const ANGLETOFINESHIFT: u32 = 19;

pub const SLOPERANGE: u32 = 2048;

lazy_static! {
    /// Quarter turn longer than a full circle so cosine can index with an offset
    static ref FINESINE: Vec<Fixed> = (0..5 * FINEANGLES / 4)
        .map(|i| {
            let a = (i as f64 + 0.5) * std::f64::consts::TAU / FINEANGLES as f64;
            (a.sin() * FRACUNIT as f64) as Fixed
        })
        .collect();

    static ref FINETANGENT: Vec<Fixed> = (0..FINEANGLES / 2)
        .map(|i| {
            let a = (i as f64 - (FINEANGLES / 4) as f64 + 0.5) * std::f64::consts::PI
                / (FINEANGLES / 2) as f64;
            (a.tan() * FRACUNIT as f64).clamp(i32::MIN as f64, i32::MAX as f64) as Fixed
        })
        .collect();

    static ref TANTOANGLE: Vec<Angle> = (0..=SLOPERANGE)
        .map(|i| {
            let a = (i as f64 / SLOPERANGE as f64).atan();
            (a / std::f64::consts::TAU * 4_294_967_296.0) as Angle
        })
        .collect();
}

/// Sine by fine angle index
#[inline(always)]
pub fn finesine(fine: usize) -> Fixed {
    FINESINE[fine & FINEMASK]
}

#[inline(always)]
pub fn finecosine(fine: usize) -> Fixed {
    FINESINE[(fine & FINEMASK) + FINEANGLES / 4]
}

/// Tangent by fine angle index, which is only valid for `0..FINEANGLES/2`
#[inline(always)]
pub fn finetangent(fine: usize) -> Fixed {
    FINETANGENT[fine.min(FINEANGLES / 2 - 1)]
}

#[inline(always)]
pub fn tantoangle(slope: u32) -> Angle {
    TANTOANGLE[slope.min(SLOPERANGE) as usize]
}

/// Angle to fine table index
#[inline(always)]
pub const fn fine(angle: Angle) -> usize {
    (angle >> ANGLETOFINESHIFT) as usize
}

/// Doom function name `SlopeDiv`
#[inline]
pub fn slope_div(num: u32, den: u32) -> u32 {
    if den < 512 {
        return SLOPERANGE;
    }
    let ans = ((num as u64) << 3) / ((den as u64) >> 8);
    (ans as u32).min(SLOPERANGE)
}

/// Doom function name `R_PointToAngle2`, using a delta from the origin
pub fn point_to_angle(x: Fixed, y: Fixed) -> Angle {
    if x == 0 && y == 0 {
        return 0;
    }
    let (ax, ay) = (x.unsigned_abs(), y.unsigned_abs());
    match (x >= 0, y >= 0) {
        (true, true) => {
            if ax > ay {
                tantoangle(slope_div(ay, ax))
            } else {
                (ANG90 - 1).wrapping_sub(tantoangle(slope_div(ax, ay)))
            }
        }
        (true, false) => {
            if ax > ay {
                0u32.wrapping_sub(tantoangle(slope_div(ay, ax)))
            } else {
                ANG270.wrapping_add(tantoangle(slope_div(ax, ay)))
            }
        }
        (false, true) => {
            if ax > ay {
                (ANG180 - 1).wrapping_sub(tantoangle(slope_div(ay, ax)))
            } else {
                ANG90.wrapping_add(tantoangle(slope_div(ax, ay)))
            }
        }
        (false, false) => {
            if ax > ay {
                ANG180.wrapping_add(tantoangle(slope_div(ay, ax)))
            } else {
                (ANG270 - 1).wrapping_sub(tantoangle(slope_div(ax, ay)))
            }
        }
    }
}

/// Convert a BAM (Binary Angle Measure) to radians
#[inline]
pub const fn bam_to_radian(value: Angle) -> f32 {
    value as f32 * (std::f32::consts::TAU / 4_294_967_296.0)
}

#[inline]
pub fn radian_to_bam(rad: f32) -> Angle {
    let turns = rad.rem_euclid(std::f32::consts::TAU) / std::f32::consts::TAU;
    (turns as f64 * 4_294_967_296.0) as u64 as Angle
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_edges() {
        assert_eq!(finesine(0), 25);
        assert!(finesine(FINEANGLES / 4) > 65530);
        assert_eq!(finecosine(0), finesine(FINEANGLES / 4));
        assert!(tantoangle(SLOPERANGE).abs_diff(ANG45) <= 1);
        assert!(finetangent(0) < -100_000_000);
    }

    #[test]
    fn cardinal_points() {
        let one = FRACUNIT;
        assert_eq!(point_to_angle(one, 0), 0);
        assert!(point_to_angle(one, one).abs_diff(ANG45) <= 1);
        assert!(point_to_angle(0, one).abs_diff(ANG90) <= 1);
        assert!(point_to_angle(-one, 0).abs_diff(ANG180) <= 1);
        assert!(point_to_angle(0, -one).abs_diff(ANG270) <= 1);
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn convert_bam_to_rad() {
        assert_eq!(bam_to_radian(ANG90), std::f32::consts::FRAC_PI_2);
        assert_eq!(bam_to_radian(ANG180), std::f32::consts::PI);
        assert_eq!(radian_to_bam(std::f32::consts::PI), ANG180);
    }
}
