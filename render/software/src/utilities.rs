use math::{
    ANG90, ANGLETOFINESHIFT, Angle, FRACBITS, FRACUNIT, Fixed, fixed_div, fixed_mul, fine,
    finesine, tantoangle,
};

/// Shift from a `fixed_div` slope down to a `tantoangle` index
const DBITS: i32 = FRACBITS - 11;

/// Doom function name `R_PointToDist`, distance from the view to a point
pub fn point_to_dist(viewx: Fixed, viewy: Fixed, x: Fixed, y: Fixed) -> Fixed {
    let mut dx = x.wrapping_sub(viewx).wrapping_abs();
    let mut dy = y.wrapping_sub(viewy).wrapping_abs();

    if dy > dx {
        std::mem::swap(&mut dx, &mut dy);
    }
    if dx == 0 {
        return 0;
    }

    let slope = (fixed_div(dy, dx) >> DBITS) as u32;
    let angle = tantoangle(slope).wrapping_add(ANG90);
    // use as cosine
    fixed_div(dx, finesine(fine(angle)))
}

/// Doom function name `R_ScaleFromGlobalAngle`. Returns the texture mapping
/// scale for the current line at the given angle. `rw_distance` must be
/// calculated first.
pub fn scale_from_global_angle(
    visangle: Angle,
    viewangle: Angle,
    rw_normalangle: Angle,
    rw_distance: Fixed,
    projectiony: Fixed,
) -> Fixed {
    let anglea = ANG90.wrapping_add(visangle.wrapping_sub(viewangle));
    let angleb = ANG90.wrapping_add(visangle.wrapping_sub(rw_normalangle));

    // both sines are always positive
    let sinea = finesine((anglea >> ANGLETOFINESHIFT) as usize);
    let sineb = finesine((angleb >> ANGLETOFINESHIFT) as usize);
    let num = fixed_mul(projectiony, sineb);
    let den = fixed_mul(rw_distance, sinea);

    if den > num >> FRACBITS {
        fixed_div(num, den).clamp(256, 64 * FRACUNIT)
    } else {
        64 * FRACUNIT
    }
}

/// Linear blend of two fixed values by a `FRACUNIT` based fraction
#[inline]
pub fn lerp_fixed(frac: Fixed, from: Fixed, to: Fixed) -> Fixed {
    from.wrapping_add(fixed_mul(frac, to.wrapping_sub(from)))
}

/// Blend two angles the short way round
#[inline]
pub fn lerp_angle(frac: Fixed, from: Angle, to: Angle) -> Angle {
    let delta = to.wrapping_sub(from) as i32;
    from.wrapping_add(((delta as i64 * frac as i64) >> FRACBITS) as i32 as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use math::int_to_fixed;

    #[test]
    fn dist_along_axes() {
        let d = point_to_dist(0, 0, int_to_fixed(100), 0);
        assert!((d - int_to_fixed(100)).abs() < FRACUNIT);
        let d = point_to_dist(0, 0, int_to_fixed(30), int_to_fixed(40));
        assert!((d - int_to_fixed(50)).abs() < FRACUNIT / 4);
        assert_eq!(point_to_dist(5, 5, 5, 5), 0);
    }

    #[test]
    fn scale_is_clamped() {
        // Very close wall
        let s = scale_from_global_angle(0, 0, 0, 1, 160 * FRACUNIT);
        assert_eq!(s, 64 * FRACUNIT);
        // Facing a wall straight on at the projection distance is a scale of one.
        // The normal points away from the viewer.
        let s = scale_from_global_angle(0, 0, 0, int_to_fixed(160), 160 * FRACUNIT);
        assert!((s - FRACUNIT).abs() < 16);
    }

    #[test]
    fn angle_lerp_wraps() {
        let a = lerp_angle(FRACUNIT / 2, u32::MAX - 99, 100);
        assert!(a < 2 || a > u32::MAX - 2);
        assert_eq!(lerp_fixed(FRACUNIT / 4, 0, int_to_fixed(8)), int_to_fixed(2));
    }
}
