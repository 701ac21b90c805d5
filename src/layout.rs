use anyhow::Result;
use log::{info, warn};
use thiserror::Error;

use crate::entity::Shooter;
use crate::level::Level;
use crate::math::Vec2;

/// Default shoot interval assigned by the generator.
const SHOOTER_INTERVAL: f32 = 1.0;
/// Shooters start deep in their charge cycle so the first volley is late.
const SHOOTER_INITIAL_ELAPSED: f32 = -3.9;

const PLAYER_SPAWN: Vec2 = Vec2 { x: 2.0, y: 5.0 };

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("failed to decode level image")]
    Decode(#[from] image::ImageError),
    #[error("level layout contains no cells")]
    Empty,
}

/// One cell of the layout grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cell {
    Empty,
    Wall,
    Shooter,
    /// Claimed as a shooting direction by cardinally adjacent shooters.
    DirectionMarker,
}

/// A level layout decoded from an RGBA grid. Each pixel is one world cell;
/// x grows rightward and y grows downward, matching world axes.
pub struct LevelLayout {
    width: u32,
    height: u32,
    cells: Vec<Cell>,
}

impl LevelLayout {
    pub fn from_cells(width: u32, height: u32, cells: Vec<Cell>) -> Result<Self, LayoutError> {
        if cells.is_empty() || cells.len() != (width * height) as usize {
            return Err(LayoutError::Empty);
        }
        Ok(Self {
            width,
            height,
            cells,
        })
    }

    /// Decode a layout from PNG bytes. Black is a wall, red a shooter, blue
    /// a direction marker and transparent is empty; anything else is skipped
    /// with a warning.
    pub fn decode_png(bytes: &[u8]) -> Result<Self, LayoutError> {
        let img = image::load_from_memory_with_format(bytes, image::ImageFormat::Png)?.to_rgba8();
        let (width, height) = img.dimensions();

        let mut cells = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                let [r, g, b, a] = img.get_pixel(x, y).0;
                let cell = match (r, g, b, a) {
                    (_, _, _, 0) => Cell::Empty,
                    (0, 0, 0, _) => Cell::Wall,
                    (255, 0, 0, _) => Cell::Shooter,
                    (0, 0, 255, _) => Cell::DirectionMarker,
                    _ => {
                        warn!("invalid layout color #{r:02x}{g:02x}{b:02x} at {x},{y}, skipping");
                        Cell::Empty
                    }
                };
                cells.push(cell);
            }
        }

        Self::from_cells(width, height, cells)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn at(&self, x: u32, y: u32) -> Cell {
        self.cells[(y * self.width + x) as usize]
    }

    /// Build a fresh level from this layout: walls and shooters placed on
    /// their cells, markers turned into shooting directions, all shooters
    /// sealed and the player spawned.
    pub fn generate(&self, seed: u64) -> Result<Level> {
        let mut level = Level::new(seed);

        let mut shooters = Vec::new();
        let mut markers = Vec::new();

        for y in 0..self.height {
            for x in 0..self.width {
                let position = Vec2::new(x as f32, y as f32);
                match self.at(x, y) {
                    Cell::Empty => {}
                    Cell::Wall => {
                        level.add_wall(position)?;
                    }
                    Cell::Shooter => {
                        let id = level.add_shooter(
                            position,
                            Shooter::new(SHOOTER_INTERVAL, SHOOTER_INITIAL_ELAPSED),
                        )?;
                        shooters.push((id, x as i32, y as i32));
                    }
                    Cell::DirectionMarker => markers.push((x as i32, y as i32)),
                }
            }
        }

        for &(mx, my) in &markers {
            let mut claimed = false;
            for &(id, sx, sy) in &shooters {
                let (dx, dy) = (mx - sx, my - sy);
                if dx.abs() + dy.abs() != 1 {
                    continue;
                }
                if let Some(crate::entity::EntityKind::Shooter(shooter)) =
                    level.entity_mut(id).map(|e| &mut e.kind)
                {
                    shooter.add_direction(dx, dy)?;
                    claimed = true;
                }
            }
            if !claimed {
                warn!("direction marker at {mx},{my} has no adjacent shooter");
            }
        }

        for &(id, _, _) in &shooters {
            if let Some(crate::entity::EntityKind::Shooter(shooter)) =
                level.entity_mut(id).map(|e| &mut e.kind)
            {
                shooter.seal();
            }
        }

        level.spawn_player(PLAYER_SPAWN)?;
        info!(
            "generated level {}x{}: {} shooters, {} markers",
            self.width,
            self.height,
            shooters.len(),
            markers.len()
        );

        Ok(level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityKind;

    #[test]
    fn three_cell_strip_generates_a_sealed_shooter() {
        let layout = LevelLayout::from_cells(
            3,
            1,
            vec![Cell::Shooter, Cell::DirectionMarker, Cell::Wall],
        )
        .unwrap();

        let level = layout.generate(1).unwrap();

        let shooter = level
            .entities()
            .find_map(|e| match &e.kind {
                EntityKind::Shooter(s) => Some(s),
                _ => None,
            })
            .expect("a shooter");
        assert_eq!(shooter.directions(), &[(1, 0)]);

        assert_eq!(
            level
                .entities()
                .filter(|e| matches!(e.kind, EntityKind::Wall))
                .count(),
            1
        );
        assert!(level.player_id().is_some());
    }

    #[test]
    fn sealed_shooters_reject_further_directions() {
        let layout =
            LevelLayout::from_cells(2, 1, vec![Cell::Shooter, Cell::DirectionMarker]).unwrap();
        let mut level = layout.generate(1).unwrap();

        let id = level
            .entities()
            .find(|e| matches!(e.kind, EntityKind::Shooter(_)))
            .map(|e| e.id)
            .unwrap();
        let EntityKind::Shooter(shooter) = &mut level.entity_mut(id).unwrap().kind else {
            panic!("not a shooter");
        };
        assert!(shooter.add_direction(0, 1).is_err());
    }

    #[test]
    fn empty_grid_is_rejected() {
        assert!(matches!(
            LevelLayout::from_cells(0, 0, Vec::new()),
            Err(LayoutError::Empty)
        ));
    }

    #[test]
    fn markers_only_bind_to_cardinal_neighbors() {
        // Diagonal marker must not become a direction.
        let layout = LevelLayout::from_cells(
            2,
            2,
            vec![
                Cell::Shooter,
                Cell::Empty,
                Cell::Empty,
                Cell::DirectionMarker,
            ],
        )
        .unwrap();
        let level = layout.generate(1).unwrap();

        let shooter = level
            .entities()
            .find_map(|e| match &e.kind {
                EntityKind::Shooter(s) => Some(s),
                _ => None,
            })
            .unwrap();
        assert!(shooter.directions().is_empty());
    }

    #[test]
    fn embedded_level_asset_decodes() {
        let layout = LevelLayout::decode_png(include_bytes!("../assets/level.png")).unwrap();
        assert_eq!(layout.width(), 28);
        assert_eq!(layout.height(), 16);

        let shooters = layout.cells.iter().filter(|c| **c == Cell::Shooter).count();
        assert_eq!(shooters, 4);
    }
}
