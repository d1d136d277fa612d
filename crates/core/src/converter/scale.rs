//! Aspect-preserving scaling against a longest-side bound.

/// Scales `width`x`height` so the longer side equals `max_side`.
///
/// The shorter side is `round(shorter / longer * max_side)`, never below 1.
/// Returns `None` for degenerate input (a zero dimension or bound).
pub fn scale_to_longest_side(width: u32, height: u32, max_side: u32) -> Option<(u32, u32)> {
    if width == 0 || height == 0 || max_side == 0 {
        return None;
    }

    let scale_short = |short: u32, long: u32| -> u32 {
        let scaled = (short as f64 / long as f64 * max_side as f64).round() as u32;
        scaled.max(1)
    };

    if width >= height {
        Some((max_side, scale_short(height, width)))
    } else {
        Some((scale_short(width, height), max_side))
    }
}
