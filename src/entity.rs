use std::collections::HashSet;
use std::f32::consts::PI;

use thiserror::Error;

use crate::math::Vec2;
use crate::physics::{BodyDef, BodyKind, ColliderDef, ShapeDef};

/// Unique identifier for an entity in the level arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub(crate) u32);

#[derive(Debug, Error)]
pub enum EntityError {
    /// Mutating a shooter after level generation would desynchronize its
    /// already-derived chevron/shape data; the operation must be refused.
    #[error("shooter directions are sealed after level generation")]
    DirectionsSealed,
}

/// Maximum player health; refilled on diamond pickup.
pub const MAX_HP: u32 = 5;

/// The player dies once more than this many bullets are embedded.
pub const EMBEDDED_BULLET_LIMIT: u32 = 6;

pub const BULLET_RADIUS: f32 = 0.15;

/// Projectile faction, doubling as the bullet's draw color. Bullets of the
/// same faction pass through each other without detonating.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Faction {
    Emitter,
    Player,
}

impl Faction {
    pub fn color(self) -> [f32; 4] {
        match self {
            Faction::Emitter => [1.0, 0.0, 0.0, 1.0],
            Faction::Player => [1.0, 1.0, 0.0, 1.0],
        }
    }
}

#[derive(Clone, Debug)]
pub struct Shooter {
    directions: Vec<(i32, i32)>,
    sealed: bool,
    pub interval: f32,
    pub elapsed: f32,
    pub next_is_reward: bool,
}

impl Shooter {
    pub fn new(interval: f32, elapsed: f32) -> Self {
        Self {
            directions: Vec::new(),
            sealed: false,
            interval,
            elapsed,
            next_is_reward: false,
        }
    }

    /// Register a cardinal shooting direction. Fails once the shooter has
    /// been sealed by the level generator.
    pub fn add_direction(&mut self, dx: i32, dy: i32) -> Result<(), EntityError> {
        if self.sealed {
            return Err(EntityError::DirectionsSealed);
        }
        self.directions.push((dx, dy));
        Ok(())
    }

    pub fn seal(&mut self) {
        self.sealed = true;
    }

    pub fn directions(&self) -> &[(i32, i32)] {
        &self.directions
    }

    /// Warm-up fraction in [0, 1]; drives the charge tint of the chevrons.
    pub fn charge(&self) -> f32 {
        (self.elapsed / self.interval).clamp(0.0, 1.0)
    }
}

#[derive(Clone, Debug)]
pub struct Bullet {
    pub faction: Faction,
    pub scale: f32,
    /// Homing behavior: steer toward the player while in line of sight.
    pub following: bool,
    /// Area-kill behavior: detonate instead of dying on contact.
    pub exploding: bool,
    pub start_velocity: Vec2,
}

#[derive(Clone, Debug)]
pub struct Diamond {
    pub start_velocity: Vec2,
    pub age: f32,
}

#[derive(Clone, Debug)]
pub struct Player {
    pub health: u32,
    pub score: u32,
    /// Bullets currently embedded: both the ammunition pool and a death
    /// condition once the limit is exceeded.
    pub embedded_bullets: u32,
    pub touching_walls: HashSet<EntityId>,
}

impl Player {
    pub fn new() -> Self {
        Self {
            health: MAX_HP,
            score: 0,
            embedded_bullets: 0,
            touching_walls: HashSet::new(),
        }
    }
}

impl Default for Player {
    fn default() -> Self {
        Self::new()
    }
}

/// Closed set of everything that can live in a level.
#[derive(Clone, Debug)]
pub enum EntityKind {
    Wall,
    Shooter(Shooter),
    Bullet(Bullet),
    Diamond(Diamond),
    Player(Player),
}

/// A simulated object: authoritative pose mirrored back from the physics
/// body each tick, an alive flag, and the kind-specific state.
#[derive(Clone, Debug)]
pub struct Entity {
    pub id: EntityId,
    pub position: Vec2,
    pub rotation: f32,
    alive: bool,
    pub kind: EntityKind,
}

/// Octagon shared by walls and shooters: a unit cell with cut corners.
const WALL_OCTAGON: [Vec2; 8] = [
    Vec2 { x: -0.45, y: -0.40 },
    Vec2 { x: -0.40, y: -0.45 },
    Vec2 { x: 0.40, y: -0.45 },
    Vec2 { x: 0.45, y: -0.40 },
    Vec2 { x: 0.45, y: 0.40 },
    Vec2 { x: 0.40, y: 0.45 },
    Vec2 { x: -0.40, y: 0.45 },
    Vec2 { x: -0.45, y: 0.40 },
];

/// Player hexagon, pointed along x.
const PLAYER_HEXAGON: [Vec2; 6] = [
    Vec2 { x: -0.25, y: -0.43 },
    Vec2 { x: 0.25, y: -0.43 },
    Vec2 { x: 0.50, y: 0.00 },
    Vec2 { x: 0.25, y: 0.43 },
    Vec2 { x: -0.25, y: 0.43 },
    Vec2 { x: -0.50, y: 0.00 },
];

/// Twelve-pointed star drawn for the player, centered on its pivot.
const PLAYER_STAR: [Vec2; 12] = [
    Vec2 { x: -0.25, y: -0.43 },
    Vec2 { x: 0.00, y: -0.22 },
    Vec2 { x: 0.25, y: -0.43 },
    Vec2 { x: 0.19, y: -0.11 },
    Vec2 { x: 0.50, y: 0.00 },
    Vec2 { x: 0.19, y: 0.11 },
    Vec2 { x: 0.25, y: 0.43 },
    Vec2 { x: 0.00, y: 0.22 },
    Vec2 { x: -0.25, y: 0.43 },
    Vec2 { x: -0.19, y: 0.11 },
    Vec2 { x: -0.50, y: 0.00 },
    Vec2 { x: -0.19, y: -0.11 },
];

impl Entity {
    pub fn new(id: EntityId, position: Vec2, kind: EntityKind) -> Self {
        Self {
            id,
            position,
            rotation: 0.0,
            alive: true,
            kind,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Mark the entity dead. Idempotent; the level removes it at the end of
    /// the tick.
    pub fn die(&mut self) {
        self.alive = false;
    }

    pub fn is_bullet(&self) -> bool {
        matches!(self.kind, EntityKind::Bullet(_))
    }

    /// Walls and shooters both count as ground for the player.
    pub fn is_wall_like(&self) -> bool {
        matches!(self.kind, EntityKind::Wall | EntityKind::Shooter(_))
    }

    pub fn as_player(&self) -> Option<&Player> {
        match &self.kind {
            EntityKind::Player(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_player_mut(&mut self) -> Option<&mut Player> {
        match &mut self.kind {
            EntityKind::Player(p) => Some(p),
            _ => None,
        }
    }

    /// Body descriptor for the physics world, by kind.
    pub fn body_def(&self) -> BodyDef {
        match &self.kind {
            EntityKind::Wall | EntityKind::Shooter(_) => BodyDef::default(),
            EntityKind::Bullet(bullet) => BodyDef {
                kind: BodyKind::Dynamic,
                linear_velocity: bullet.start_velocity,
                gravity_scale: 0.0,
                ccd: true,
                ..BodyDef::default()
            },
            EntityKind::Diamond(diamond) => BodyDef {
                kind: BodyKind::Dynamic,
                linear_velocity: diamond.start_velocity,
                lock_rotation: true,
                ..BodyDef::default()
            },
            EntityKind::Player(_) => BodyDef {
                kind: BodyKind::Dynamic,
                angular_damping: 0.98,
                ..BodyDef::default()
            },
        }
    }

    /// Fixture descriptor for the physics world, by kind.
    pub fn collider_def(&self) -> ColliderDef {
        match &self.kind {
            EntityKind::Wall | EntityKind::Shooter(_) => ColliderDef {
                shape: ShapeDef::ConvexHull(WALL_OCTAGON.to_vec()),
                density: 0.0,
                friction: 0.0,
                restitution: 0.0,
            },
            EntityKind::Bullet(bullet) => ColliderDef {
                shape: ShapeDef::Circle {
                    radius: BULLET_RADIUS * bullet.scale,
                },
                density: 1.0,
                friction: 0.0,
                restitution: 1.0,
            },
            EntityKind::Diamond(_) => ColliderDef {
                shape: ShapeDef::Box { hx: 0.25, hy: 0.25 },
                density: 1.0,
                friction: 1.0,
                restitution: 0.0,
            },
            EntityKind::Player(_) => ColliderDef {
                shape: ShapeDef::ConvexHull(PLAYER_HEXAGON.to_vec()),
                density: 10.0,
                friction: 0.0,
                restitution: 0.0,
            },
        }
    }

    /// Closed outline in local coordinates, centered on the body origin.
    pub fn outline(&self) -> Vec<Vec2> {
        match &self.kind {
            EntityKind::Wall | EntityKind::Shooter(_) => WALL_OCTAGON.to_vec(),
            EntityKind::Bullet(bullet) => {
                let r = BULLET_RADIUS * bullet.scale;
                let mut points = Vec::new();
                let mut f = 0.0f32;
                while f < 2.0 * PI {
                    points.push(Vec2::new(f.cos() * r, f.sin() * r));
                    f += 0.2;
                }
                points
            }
            EntityKind::Diamond(_) => {
                let half = 0.25;
                [
                    Vec2::new(-half, -half),
                    Vec2::new(half, -half),
                    Vec2::new(half, half),
                    Vec2::new(-half, half),
                ]
                .iter()
                .map(|p| p.rotated(PI / 4.0))
                .collect()
            }
            EntityKind::Player(_) => PLAYER_STAR.to_vec(),
        }
    }

    pub fn color(&self) -> [f32; 4] {
        match &self.kind {
            EntityKind::Wall | EntityKind::Shooter(_) => [1.0, 1.0, 1.0, 1.0],
            EntityKind::Bullet(bullet) => bullet.faction.color(),
            EntityKind::Diamond(_) => [0.5764, 0.8431, 1.0, 1.0],
            EntityKind::Player(_) => [1.0, 0.0, 1.0, 1.0],
        }
    }

    /// Chevron line segments (pairs of local points) showing where a shooter
    /// fires, plus the charge-dependent tint.
    pub fn chevrons(&self) -> Option<(Vec<Vec2>, [f32; 4])> {
        let EntityKind::Shooter(shooter) = &self.kind else {
            return None;
        };

        let mut lines = Vec::new();
        for &(dx, dy) in shooter.directions() {
            let segments: [Vec2; 4] = match (dx, dy) {
                (1, 0) => [
                    Vec2::new(0.45, -0.30),
                    Vec2::new(0.10, 0.00),
                    Vec2::new(0.10, 0.00),
                    Vec2::new(0.45, 0.30),
                ],
                (-1, 0) => [
                    Vec2::new(-0.45, -0.30),
                    Vec2::new(-0.10, 0.00),
                    Vec2::new(-0.10, 0.00),
                    Vec2::new(-0.45, 0.30),
                ],
                (0, 1) => [
                    Vec2::new(-0.30, 0.45),
                    Vec2::new(0.00, 0.10),
                    Vec2::new(0.00, 0.10),
                    Vec2::new(0.30, 0.45),
                ],
                (0, -1) => [
                    Vec2::new(-0.30, -0.45),
                    Vec2::new(0.00, -0.10),
                    Vec2::new(0.00, -0.10),
                    Vec2::new(0.30, -0.45),
                ],
                _ => continue,
            };
            lines.extend_from_slice(&segments);
        }

        let cold = 1.0 - shooter.charge();
        Some((lines, [1.0, cold, cold, 1.0]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn die_is_idempotent() {
        let mut wall = Entity::new(EntityId(1), Vec2::new(2.0, 3.0), EntityKind::Wall);
        assert!(wall.is_alive());
        wall.die();
        wall.die();
        assert!(!wall.is_alive());
    }

    #[test]
    fn shooter_directions_reject_mutation_after_seal() {
        let mut shooter = Shooter::new(1.0, 0.0);
        shooter.add_direction(1, 0).unwrap();
        shooter.seal();
        assert!(matches!(
            shooter.add_direction(0, 1),
            Err(EntityError::DirectionsSealed)
        ));
        assert_eq!(shooter.directions(), &[(1, 0)]);
    }

    #[test]
    fn bullet_body_ignores_gravity_and_uses_ccd() {
        let bullet = Entity::new(
            EntityId(7),
            Vec2::ZERO,
            EntityKind::Bullet(Bullet {
                faction: Faction::Emitter,
                scale: 1.0,
                following: true,
                exploding: false,
                start_velocity: Vec2::new(8.0, 0.0),
            }),
        );
        let def = bullet.body_def();
        assert_eq!(def.gravity_scale, 0.0);
        assert!(def.ccd);
        assert_eq!(def.linear_velocity, Vec2::new(8.0, 0.0));
    }
}
