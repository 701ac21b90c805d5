//! Screen-space overlay drawn with the same shape batches as the world:
//! health bar, ammo pips, score diamonds and the menu / game-over screens.

use std::f32::consts::PI;

use crate::entity::{Player, MAX_HP};
use crate::math::Vec2;
use crate::render::DrawBatch;

const MARGIN: f32 = 24.0;
const HEALTH_BAR_SIZE: Vec2 = Vec2 { x: 220.0, y: 14.0 };

/// More score than this is shown as a full row.
const MAX_SCORE_PIPS: u32 = 15;
const MAX_AMMO_PIPS: u32 = 10;

const HEALTH_COLOR: [f32; 4] = [1.0, 0.25, 0.25, 1.0];
const AMMO_COLOR: [f32; 4] = [1.0, 1.0, 0.0, 1.0];
const SCORE_COLOR: [f32; 4] = [0.5764, 0.8431, 1.0, 1.0];
const FRAME_COLOR: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

fn rect_outline(batch: &mut DrawBatch, min: Vec2, max: Vec2, color: [f32; 4]) {
    batch.line_loop(
        &[
            min,
            Vec2::new(max.x, min.y),
            max,
            Vec2::new(min.x, max.y),
        ],
        color,
    );
}

fn diamond_outline(batch: &mut DrawBatch, center: Vec2, radius: f32, color: [f32; 4]) {
    batch.line_loop(
        &[
            center + Vec2::new(0.0, -radius),
            center + Vec2::new(radius, 0.0),
            center + Vec2::new(0.0, radius),
            center + Vec2::new(-radius, 0.0),
        ],
        color,
    );
}

/// In-game overlay: health, ammunition and score.
pub fn draw_hud(batch: &mut DrawBatch, viewport: (u32, u32), player: &Player) {
    let origin = Vec2::new(MARGIN, MARGIN);

    // Health bar with a white frame.
    let fraction = player.health as f32 / MAX_HP as f32;
    batch.quad(
        origin,
        origin + Vec2::new(HEALTH_BAR_SIZE.x * fraction, HEALTH_BAR_SIZE.y),
        HEALTH_COLOR,
    );
    rect_outline(batch, origin, origin + HEALTH_BAR_SIZE, FRAME_COLOR);

    // One pip per embedded bullet, the player's ammunition.
    let ammo = player.embedded_bullets.min(MAX_AMMO_PIPS);
    for i in 0..ammo {
        let min = origin + Vec2::new(i as f32 * 18.0, HEALTH_BAR_SIZE.y + 10.0);
        batch.quad(min, min + Vec2::new(10.0, 10.0), AMMO_COLOR);
    }

    // Score diamonds grow in from the top-right corner.
    let score = player.score.min(MAX_SCORE_PIPS);
    for i in 0..score {
        let center = Vec2::new(
            viewport.0 as f32 - MARGIN - i as f32 * 24.0,
            MARGIN + 8.0,
        );
        diamond_outline(batch, center, 8.0, SCORE_COLOR);
    }
}

/// A large star outline, used by the menu and game-over screens.
fn star_outline(batch: &mut DrawBatch, center: Vec2, scale: f32, color: [f32; 4]) {
    let points: Vec<Vec2> = (0..12)
        .map(|i| {
            let angle = i as f32 * PI / 6.0;
            let radius = if i % 2 == 0 { 1.0 } else { 0.45 };
            center + Vec2::new(angle.cos(), angle.sin()) * (radius * scale)
        })
        .collect();
    batch.line_loop(&points, color);
}

/// Title screen: star emblem and a pulsing start bar.
pub fn draw_main_menu(batch: &mut DrawBatch, viewport: (u32, u32), time: f32) {
    let center = Vec2::new(viewport.0 as f32 / 2.0, viewport.1 as f32 / 2.0);

    star_outline(batch, center - Vec2::new(0.0, 60.0), 70.0, [1.0, 0.0, 1.0, 1.0]);
    diamond_outline(batch, center - Vec2::new(0.0, 60.0), 24.0, SCORE_COLOR);

    let pulse = 0.55 + 0.45 * (time * 3.0).sin();
    let bar_half = Vec2::new(120.0, 8.0);
    let bar_center = center + Vec2::new(0.0, 120.0);
    batch.quad(
        bar_center - bar_half,
        bar_center + bar_half,
        [1.0, 1.0, 1.0, pulse],
    );
}

/// Game-over screen, drawn over the frozen level.
pub fn draw_game_over(batch: &mut DrawBatch, viewport: (u32, u32), player: &Player) {
    let size = Vec2::new(viewport.0 as f32, viewport.1 as f32);
    batch.quad(Vec2::ZERO, size, [0.0, 0.0, 0.0, 0.6]);

    let center = size * 0.5;
    star_outline(batch, center - Vec2::new(0.0, 40.0), 90.0, HEALTH_COLOR);

    // Final score, one diamond per point.
    let score = player.score.min(MAX_SCORE_PIPS);
    let row_width = score.saturating_sub(1) as f32 * 28.0;
    for i in 0..score {
        let pos = Vec2::new(
            center.x - row_width / 2.0 + i as f32 * 28.0,
            center.y + 100.0,
        );
        diamond_outline(batch, pos, 10.0, SCORE_COLOR);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hud_scales_health_fill_with_health() {
        let mut full = DrawBatch::new();
        let mut half = DrawBatch::new();

        let mut player = Player::new();
        draw_hud(&mut full, (800, 600), &player);

        player.health = MAX_HP / 2;
        draw_hud(&mut half, (800, 600), &player);

        let full_max = full
            .fill_vertices
            .iter()
            .map(|v| v.position[0])
            .fold(f32::MIN, f32::max);
        let half_max = half
            .fill_vertices
            .iter()
            .map(|v| v.position[0])
            .fold(f32::MIN, f32::max);
        assert!(half_max < full_max);
    }

    #[test]
    fn score_pips_are_capped() {
        let mut batch = DrawBatch::new();
        let mut player = Player::new();
        player.score = 1000;
        draw_hud(&mut batch, (800, 600), &player);

        // Frame + capped diamonds only; no unbounded growth.
        let loops = batch.line_vertices.len();
        let mut capped = DrawBatch::new();
        player.score = MAX_SCORE_PIPS;
        draw_hud(&mut capped, (800, 600), &player);
        assert_eq!(loops, capped.line_vertices.len());
    }
}
