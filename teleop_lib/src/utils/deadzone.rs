//! Circular deadzone normalization shared by all input sources.

/// Apply a circular deadzone to a raw 2-axis pair and rescale linearly
/// beyond it, so the output sweeps the full [-1, 1] range starting just
/// past the deadzone boundary. Output magnitude is clamped to 1.
pub fn normalize_axes(x: f64, y: f64, deadzone: f64) -> (f64, f64) {
    let x = if x.is_finite() { x } else { 0.0 };
    let y = if y.is_finite() { y } else { 0.0 };

    let magnitude = (x * x + y * y).sqrt();
    if magnitude < deadzone || magnitude == 0.0 {
        return (0.0, 0.0);
    }

    // Rescale so the usable band maps onto [0, 1]
    let scaled = ((magnitude - deadzone) / (1.0 - deadzone)).min(1.0);
    let factor = scaled / magnitude;

    (x * factor, y * factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inside_deadzone_is_zero() {
        let (x, y) = normalize_axes(0.05, 0.05, 0.15);
        assert_eq!((x, y), (0.0, 0.0));
    }

    #[test]
    fn test_full_deflection_reaches_one() {
        let (x, y) = normalize_axes(1.0, 0.0, 0.15);
        assert!((x - 1.0).abs() < 1e-9);
        assert_eq!(y, 0.0);
    }

    #[test]
    fn test_just_past_boundary_is_near_zero() {
        let (x, _) = normalize_axes(0.16, 0.0, 0.15);
        assert!(x > 0.0);
        assert!(x < 0.02);
    }

    #[test]
    fn test_magnitude_clamped_to_unit() {
        let (x, y) = normalize_axes(1.0, 1.0, 0.15);
        let magnitude = (x * x + y * y).sqrt();
        assert!(magnitude <= 1.0 + 1e-9);
    }

    #[test]
    fn test_non_finite_input_neutralized() {
        let (x, y) = normalize_axes(f64::NAN, 0.5, 0.15);
        assert!(x.is_finite());
        assert!(y.is_finite());
    }
}
