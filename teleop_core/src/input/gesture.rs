//! Drag-gesture virtual joystick source.

use std::time::Instant;
use teleop_lib::{normalize_axes, InputVector};

/// Maps a 2D drag displacement onto a normalized (x, y) pair, clamped
/// to a circular range with the shared deadzone transform.
pub struct GestureSource {
    deadzone: f64,
    x: f64,
    y: f64,
    active: bool,
    last_update: Instant,
}

impl GestureSource {
    pub fn new(deadzone: f64) -> Self {
        Self {
            deadzone,
            x: 0.0,
            y: 0.0,
            active: false,
            last_update: Instant::now(),
        }
    }

    /// Feed a drag displacement in screen units relative to the stick
    /// center. `radius` is the stick's full-deflection radius in the
    /// same units.
    pub fn update_drag(&mut self, dx: f64, dy: f64, radius: f64) {
        let (raw_x, raw_y) = if radius > 0.0 {
            (dx / radius, dy / radius)
        } else {
            (0.0, 0.0)
        };

        let (x, y) = normalize_axes(raw_x, raw_y, self.deadzone);
        self.x = x;
        self.y = y;
        self.active = true;
        self.last_update = Instant::now();
    }

    /// The drag ended: snap back to center.
    pub fn release(&mut self) {
        self.x = 0.0;
        self.y = 0.0;
        self.active = false;
        self.last_update = Instant::now();
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn last_update(&self) -> Instant {
        self.last_update
    }

    /// Current control vector. Screen-up is negative dy, so forward is
    /// the inverted y axis; the same pair drives the arm axes.
    pub fn vector(&self) -> InputVector {
        InputVector {
            forward: -self.y,
            strafe: self.x,
            rotation: self.x,
            arm_x: self.x,
            arm_y: self.y,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_drag_maps_to_unit_forward() {
        let mut source = GestureSource::new(0.15);
        source.update_drag(0.0, -120.0, 120.0);
        let v = source.vector();
        assert!((v.forward - 1.0).abs() < 1e-9);
        assert_eq!(v.strafe, 0.0);
        assert!(source.is_active());
    }

    #[test]
    fn test_small_drag_inside_deadzone() {
        let mut source = GestureSource::new(0.15);
        source.update_drag(5.0, 5.0, 120.0);
        let v = source.vector();
        assert_eq!(v.forward, 0.0);
        assert_eq!(v.strafe, 0.0);
    }

    #[test]
    fn test_release_recenters() {
        let mut source = GestureSource::new(0.15);
        source.update_drag(120.0, 0.0, 120.0);
        source.release();
        assert!(!source.is_active());
        assert_eq!(source.vector(), InputVector::zero());
    }

    #[test]
    fn test_overdrag_clamped_to_circle() {
        let mut source = GestureSource::new(0.15);
        source.update_drag(400.0, -400.0, 120.0);
        let v = source.vector();
        let magnitude = (v.strafe * v.strafe + v.forward * v.forward).sqrt();
        assert!(magnitude <= 1.0 + 1e-9);
    }
}
