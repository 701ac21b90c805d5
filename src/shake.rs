use crate::math::Vec2;

/// A shaker contributes nothing once its clock passes this age.
const SHAKER_LIFETIME: f32 = 10.0;

/// One decaying oscillation along a fixed direction. The camera sums the
/// offsets of every live shaker each frame.
#[derive(Clone, Copy, Debug)]
pub struct ScreenShaker {
    /// Oscillation axis, premultiplied by the amplitude.
    direction: Vec2,
    shake_speed: f32,
    damping: f32,
    time: f32,
}

impl ScreenShaker {
    pub fn new(direction: Vec2, shake_speed: f32, damping: f32) -> Self {
        Self {
            direction,
            shake_speed,
            damping,
            time: 0.0,
        }
    }

    pub fn update(&mut self, dt: f32) {
        self.time += dt;
    }

    /// Offset is exactly zero at birth; the oscillation ramps in through
    /// the sine rather than jumping the camera.
    pub fn offset(&self) -> Vec2 {
        let envelope = (-self.damping * self.time).exp();
        self.direction * (envelope * (self.shake_speed * self.time).sin())
    }

    pub fn expired(&self) -> bool {
        self.time > SHAKER_LIFETIME
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_zero_offset() {
        let shaker = ScreenShaker::new(Vec2::new(1.0, 0.5), 30.0, 5.0);
        let offset = shaker.offset();
        assert_eq!(offset, Vec2::ZERO);
    }

    #[test]
    fn decays_toward_zero() {
        let mut shaker = ScreenShaker::new(Vec2::new(1.0, 0.0), 30.0, 5.0);
        shaker.update(0.02);
        let early = shaker.offset().length();
        assert!(early > 0.0);

        shaker.update(3.0);
        assert!(shaker.offset().length() < 1e-3);
        assert!(!shaker.expired());

        shaker.update(8.0);
        assert!(shaker.expired());
    }
}
