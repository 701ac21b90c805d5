use glam::Mat4;

/// 2D vector type used throughout the game.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };
    pub const ONE: Self = Self { x: 1.0, y: 1.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Returns the squared length of the vector (faster than `length()`).
    pub fn length_squared(&self) -> f32 {
        self.x * self.x + self.y * self.y
    }

    pub fn normalized(&self) -> Self {
        let len = self.length();
        if len == 0.0 {
            Self::ZERO
        } else {
            Self::new(self.x / len, self.y / len)
        }
    }

    /// Computes the squared distance between two points.
    pub fn distance_squared(self, rhs: Self) -> f32 {
        (self - rhs).length_squared()
    }

    /// Returns this vector rotated 90 degrees.
    pub fn perp(self) -> Self {
        Self::new(-self.y, self.x)
    }

    /// Returns this vector rotated by `angle` radians.
    pub fn rotated(self, angle: f32) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self::new(self.x * cos - self.y * sin, self.x * sin + self.y * cos)
    }
}

impl From<(f32, f32)> for Vec2 {
    fn from(value: (f32, f32)) -> Self {
        Self {
            x: value.0,
            y: value.1,
        }
    }
}

impl std::ops::Add for Vec2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::ops::Mul<f32> for Vec2 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self::Output {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl std::ops::MulAssign<f32> for Vec2 {
    fn mul_assign(&mut self, rhs: f32) {
        self.x *= rhs;
        self.y *= rhs;
    }
}

impl std::ops::Div<f32> for Vec2 {
    type Output = Self;

    fn div(self, rhs: f32) -> Self::Output {
        Self::new(self.x / rhs, self.y / rhs)
    }
}

impl std::ops::Neg for Vec2 {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::new(-self.x, -self.y)
    }
}

/// Half of the horizontal extent of the view at zoom 1, in world units.
pub const VIEW_HALF_WIDTH: f32 = 12.0;

/// Camera representing a simple 2D view over the level.
///
/// The world uses +y pointing down (gravity is positive y), so the
/// projection flips the vertical axis to keep screen and world agreeing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera2D {
    pub position: Vec2,
    pub zoom: f32,
}

impl Camera2D {
    pub fn new(position: Vec2) -> Self {
        Self {
            position,
            zoom: 1.0,
        }
    }

    fn half_extents(&self, width: u32, height: u32) -> Vec2 {
        let half_w = VIEW_HALF_WIDTH / self.zoom;
        let half_h = half_w * height as f32 / width.max(1) as f32;
        Vec2::new(half_w, half_h)
    }

    pub fn view_projection(&self, width: u32, height: u32) -> Mat4 {
        let half = self.half_extents(width, height);
        // Bottom/top swapped: +y world maps downward on screen.
        Mat4::orthographic_rh(
            self.position.x - half.x,
            self.position.x + half.x,
            self.position.y + half.y,
            self.position.y - half.y,
            -1.0,
            1.0,
        )
    }

    /// Converts screen-pixel coordinates to world coordinates. Exact inverse
    /// of `view_projection`, used to aim player shots at the pointer.
    pub fn screen_to_world(&self, screen_pos: Vec2, width: u32, height: u32) -> Vec2 {
        let half = self.half_extents(width, height);
        let ndc_x = screen_pos.x / width.max(1) as f32 * 2.0 - 1.0;
        let ndc_y = screen_pos.y / height.max(1) as f32 * 2.0 - 1.0;
        Vec2::new(
            self.position.x + ndc_x * half.x,
            self.position.y + ndc_y * half.y,
        )
    }
}

impl Default for Camera2D {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            zoom: 1.0,
        }
    }
}

/// Projection used by the HUD: plain pixel coordinates, origin top-left.
pub fn screen_projection(width: u32, height: u32) -> Mat4 {
    Mat4::orthographic_rh(
        0.0,
        width.max(1) as f32,
        height.max(1) as f32,
        0.0,
        -1.0,
        1.0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn screen_to_world_round_trips_through_projection() {
        let camera = Camera2D {
            position: Vec2::new(12.0, 7.0),
            zoom: 1.75,
        };
        let (w, h) = (1280, 720);

        let world = camera.screen_to_world(Vec2::new(320.0, 540.0), w, h);
        let clip = camera.view_projection(w, h) * glam::Vec4::new(world.x, world.y, 0.0, 1.0);

        // Back to the same NDC the screen position started from.
        assert!((clip.x - (320.0 / 1280.0 * 2.0 - 1.0)).abs() < 1e-4);
        assert!((clip.y - -(540.0 / 720.0 * 2.0 - 1.0)).abs() < 1e-4);
    }

    #[test]
    fn center_of_screen_is_camera_position() {
        let camera = Camera2D::new(Vec2::new(3.0, 4.0));
        let world = camera.screen_to_world(Vec2::new(400.0, 300.0), 800, 600);
        assert!((world.x - 3.0).abs() < 1e-5);
        assert!((world.y - 4.0).abs() < 1e-5);
    }
}
