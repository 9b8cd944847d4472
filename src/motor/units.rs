// Conversions between engineering units and tacho-motor native units
//
// Speeds are degrees/second on the API side and tacho counts/second on the
// driver side; positions are rotations vs. tacho counts; times are seconds
// vs. milliseconds. All conversions truncate toward zero.

const DEGREES_PER_ROTATION: i64 = 360;
const MS_PER_SECOND: f32 = 1000.0;

/// Convert degrees per second to tacho counts per second
pub fn deg_s_to_counts(speed: i32, count_per_rot: i32) -> i64 {
    // integer division truncates toward zero
    speed as i64 * count_per_rot as i64 / DEGREES_PER_ROTATION
}

/// Convert tacho counts per second to degrees per second
///
/// This is the inverse of [`deg_s_to_counts`]: every speed whose magnitude
/// is at most `counts_to_deg_s(max, cpr)` converts back within `max`.
pub fn counts_to_deg_s(counts: i32, count_per_rot: i32) -> i32 {
    if count_per_rot == 0 {
        return 0;
    }
    let deg_s = counts as i64 * DEGREES_PER_ROTATION / count_per_rot as i64;
    deg_s.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

/// Convert a number of rotations to tacho counts
pub fn rotations_to_counts(rotations: f32, count_per_rot: i32) -> i32 {
    // `as` saturates on overflow
    (count_per_rot as f32 * rotations) as i32
}

/// Convert tacho counts to rotations
pub fn counts_to_rotations(counts: i32, count_per_rot: i32) -> f32 {
    if count_per_rot == 0 {
        return 0.0;
    }
    counts as f32 / count_per_rot as f32
}

/// Convert seconds to whole milliseconds
///
/// Returns `None` for negative, non-finite or out-of-range durations.
pub fn seconds_to_ms(seconds: f32) -> Option<i32> {
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    let ms = seconds * MS_PER_SECOND;
    // i32::MAX rounds up to 2^31 as f32, which would saturate on the cast
    if ms >= i32::MAX as f32 {
        return None;
    }
    Some(ms as i32)
}
