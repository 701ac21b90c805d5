use std::collections::HashMap;

use anyhow::Result;
use log::{debug, error, info, warn};
use rand::Rng;
use rand::SeedableRng;
use rand_distr::StandardNormal;
use rand_pcg::Pcg64Mcg;

use crate::controller::PlayerController;
use crate::entity::{
    Bullet, Diamond, Entity, EntityId, EntityKind, Faction, Shooter, EMBEDDED_BULLET_LIMIT, MAX_HP,
};
use crate::math::{Camera2D, Vec2};
use crate::physics::{ContactEvent, PhysicsWorld};
use crate::render::DrawBatch;
use crate::shake::ScreenShaker;

const PHYSICS_SUBSTEPS: u32 = 5;

/// No diamond is scheduled during the opening seconds of a level.
const DIAMOND_SCHEDULE_DELAY: f32 = 5.0;
/// An uncollected diamond dies of old age so a fresh one can be scheduled.
const DIAMOND_LIFETIME: f32 = 20.0;

const EMITTER_BULLET_SPEED: f32 = 8.0;
const PLAYER_BULLET_SPEED: f32 = 10.0;
const DIAMOND_SPEED: f32 = 4.0;

/// Standard deviation of the sideways velocity jitter added to volleys.
const VOLLEY_JITTER_STD: f32 = 2.0;
/// Projectiles leave one cell ahead of the shooter's face.
const VOLLEY_SPAWN_OFFSET: f32 = 1.0;
/// Player bullets spawn outside the player's own hull.
const PLAYER_BULLET_SPAWN_OFFSET: f32 = 0.8;

/// Kill radius of an exploding bullet, compared in squared distance.
const EXPLOSION_RADIUS: f32 = 5.0;

const CAMERA_SLACK_X: f32 = 5.0;
const CAMERA_SLACK_Y: f32 = 3.0;
const CAMERA_ZOOM: f32 = 1.75;

const SHAKE_DAMPING: f32 = 5.0;
const EXPLOSION_SHAKE_POWER: f32 = 15.0;
const EXPLOSION_SHAKE_AMPLITUDE: f32 = 0.5;
const HIT_SHAKE_POWER: f32 = 15.0;
const HIT_SHAKE_AMPLITUDE: f32 = 0.15;

/// Deferred side effect, queued during collision handling and entity ticks
/// and applied at a fixed point after the physics step.
#[derive(Clone, Debug)]
pub enum Command {
    SpawnEmitterBullet { position: Vec2, velocity: Vec2 },
    /// Direction is resolved against the player position at apply time.
    FirePlayerBullet { target: Vec2, exploding: bool },
    SpawnDiamond { position: Vec2, velocity: Vec2 },
    Explode { at: Vec2 },
    Shake { power: f32, amplitude: f32 },
}

/// Simplified view of a contact partner, snapshotted before reactions run.
#[derive(Clone, Copy)]
enum ContactPartner {
    WallLike,
    Bullet(Faction),
    Diamond,
    Player,
}

/// The playfield: physics world, entity arena and everything scheduled on
/// top of them. All cross-entity references are [`EntityId`] handles.
pub struct Level {
    physics: PhysicsWorld,
    entities: HashMap<EntityId, Entity>,
    next_id: u32,

    shooters: Vec<EntityId>,
    diamond: Option<EntityId>,
    player: Option<EntityId>,
    /// The player entity outlives its arena slot so the HUD and renderer
    /// can still show it after death.
    dead_player: Option<Entity>,

    pub controller: PlayerController,

    rng: Pcg64Mcg,
    time: f32,
    diamond_scheduled: bool,
    shakers: Vec<ScreenShaker>,
    camera: Camera2D,
    commands: Vec<Command>,
    game_over: bool,
}

impl Level {
    pub fn new(seed: u64) -> Self {
        let mut camera = Camera2D::new(Vec2::new(12.0, 12.0));
        camera.zoom = CAMERA_ZOOM;

        Self {
            physics: PhysicsWorld::new(),
            entities: HashMap::new(),
            next_id: 0,
            shooters: Vec::new(),
            diamond: None,
            player: None,
            dead_player: None,
            controller: PlayerController::default(),
            rng: Pcg64Mcg::seed_from_u64(seed),
            time: 0.0,
            diamond_scheduled: false,
            shakers: Vec::new(),
            camera,
            commands: Vec::new(),
            game_over: false,
        }
    }

    // ------------------------------
    // Construction
    // ------------------------------

    pub fn add_wall(&mut self, position: Vec2) -> Result<EntityId> {
        self.insert_entity(position, EntityKind::Wall)
    }

    pub fn add_shooter(&mut self, position: Vec2, shooter: Shooter) -> Result<EntityId> {
        let id = self.insert_entity(position, EntityKind::Shooter(shooter))?;
        self.shooters.push(id);
        Ok(id)
    }

    pub fn spawn_player(&mut self, position: Vec2) -> Result<EntityId> {
        let id = self.insert_entity(position, EntityKind::Player(crate::entity::Player::new()))?;
        self.player = Some(id);
        Ok(id)
    }

    pub fn spawn_emitter_bullet(&mut self, position: Vec2, velocity: Vec2) -> Result<EntityId> {
        self.insert_entity(
            position,
            EntityKind::Bullet(Bullet {
                faction: Faction::Emitter,
                scale: 1.0,
                following: true,
                exploding: false,
                start_velocity: velocity,
            }),
        )
    }

    pub fn spawn_player_bullet(
        &mut self,
        position: Vec2,
        velocity: Vec2,
        exploding: bool,
    ) -> Result<EntityId> {
        self.insert_entity(
            position,
            EntityKind::Bullet(Bullet {
                faction: Faction::Player,
                scale: 1.0,
                following: false,
                exploding,
                start_velocity: velocity,
            }),
        )
    }

    pub fn spawn_diamond(&mut self, position: Vec2, velocity: Vec2) -> Result<EntityId> {
        let id = self.insert_entity(
            position,
            EntityKind::Diamond(Diamond {
                start_velocity: velocity,
                age: 0.0,
            }),
        )?;
        self.diamond = Some(id);
        Ok(id)
    }

    fn insert_entity(&mut self, position: Vec2, kind: EntityKind) -> Result<EntityId> {
        let id = EntityId(self.next_id);
        self.next_id += 1;

        let entity = Entity::new(id, position, kind);
        self.physics.create_body(id, &entity.body_def(), position, 0.0)?;
        self.physics.add_collider(id, &entity.collider_def())?;
        self.entities.insert(id, entity);
        Ok(id)
    }

    // ------------------------------
    // Accessors
    // ------------------------------

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn player_id(&self) -> Option<EntityId> {
        self.player
    }

    /// The player entity, whether it is still in the arena or already dead.
    pub fn player_entity(&self) -> Option<&Entity> {
        self.player
            .and_then(|id| self.entities.get(&id))
            .or(self.dead_player.as_ref())
    }

    pub fn diamond_id(&self) -> Option<EntityId> {
        self.diamond
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    /// The current camera, with the sum of all live shaker offsets applied.
    pub fn camera(&self) -> Camera2D {
        let mut camera = self.camera;
        for shaker in &self.shakers {
            camera.position += shaker.offset();
        }
        camera
    }

    // ------------------------------
    // Update
    // ------------------------------

    /// Advance the level by `dt` seconds. Returns `false` exactly from the
    /// tick on which the game ended.
    pub fn update(&mut self, dt: f32) -> bool {
        if self.game_over {
            return false;
        }

        self.time += dt;

        if let Some(player_id) = self.player {
            let grounded = self.is_player_grounded(player_id);
            self.controller
                .update(dt, player_id, grounded, &mut self.physics);
        }

        let sub_dt = dt / PHYSICS_SUBSTEPS as f32;
        for _ in 0..PHYSICS_SUBSTEPS {
            self.physics.step(sub_dt);
        }

        for (id, entity) in self.entities.iter_mut() {
            if let Some(position) = self.physics.body_position(*id) {
                entity.position = position;
            }
            if let Some(rotation) = self.physics.body_rotation(*id) {
                entity.rotation = rotation;
            }
        }

        let events = self.physics.drain_events();
        for event in events {
            match event {
                ContactEvent::Started(a, b) => {
                    self.contact_started(a, b);
                    self.contact_started(b, a);
                }
                ContactEvent::Stopped(a, b) => {
                    self.contact_stopped(a, b);
                    self.contact_stopped(b, a);
                }
            }
        }

        self.schedule_diamond();
        self.tick_entities(dt);

        let commands = std::mem::take(&mut self.commands);
        for command in commands {
            self.apply_command(command);
        }

        self.sweep_dead();
        self.update_camera(dt);

        !self.game_over
    }

    fn schedule_diamond(&mut self) {
        if self.diamond.is_some()
            || self.diamond_scheduled
            || self.time <= DIAMOND_SCHEDULE_DELAY
            || self.shooters.is_empty()
        {
            return;
        }

        let pick = self.shooters[self.rng.random_range(0..self.shooters.len())];
        if let Some(EntityKind::Shooter(shooter)) =
            self.entities.get_mut(&pick).map(|e| &mut e.kind)
        {
            shooter.next_is_reward = true;
            self.diamond_scheduled = true;
            debug!("diamond queued on shooter {:?}", pick);
        }
    }

    fn tick_entities(&mut self, dt: f32) {
        let ids: Vec<EntityId> = self.entities.keys().copied().collect();
        for id in ids {
            // Take the entity out of the arena so its tick can borrow the
            // whole level, then put it back.
            let Some(mut entity) = self.entities.remove(&id) else {
                continue;
            };
            self.tick_entity(&mut entity, dt);
            self.entities.insert(id, entity);
        }
    }

    fn tick_entity(&mut self, entity: &mut Entity, dt: f32) {
        match &mut entity.kind {
            EntityKind::Shooter(shooter) => {
                shooter.elapsed += dt;
                if shooter.elapsed >= shooter.interval {
                    shooter.elapsed = 0.0;
                    let reward = std::mem::replace(&mut shooter.next_is_reward, false);
                    Self::fire_volley(
                        &mut self.rng,
                        &mut self.commands,
                        entity.position,
                        shooter,
                        reward,
                    );
                }
            }
            EntityKind::Bullet(bullet) if bullet.following => {
                self.steer_bullet(entity.id, entity.position);
            }
            EntityKind::Diamond(diamond) => {
                diamond.age += dt;
                if diamond.age > DIAMOND_LIFETIME {
                    debug!("diamond expired uncollected");
                    entity.die();
                }
            }
            EntityKind::Player(player) => {
                if player.health == 0 || player.embedded_bullets > EMBEDDED_BULLET_LIMIT {
                    entity.die();
                }
            }
            _ => {}
        }
    }

    fn fire_volley(
        rng: &mut Pcg64Mcg,
        commands: &mut Vec<Command>,
        origin: Vec2,
        shooter: &Shooter,
        reward: bool,
    ) {
        let directions = shooter.directions();
        if directions.is_empty() {
            return;
        }

        let reward_slot = if reward {
            Some(rng.random_range(0..directions.len()))
        } else {
            None
        };

        for (slot, &(dx, dy)) in directions.iter().enumerate() {
            let dir = Vec2::new(dx as f32, dy as f32);
            let position = origin + dir * VOLLEY_SPAWN_OFFSET;
            let jitter: f32 = rng.sample(StandardNormal);
            let sideways = dir.perp() * (jitter * VOLLEY_JITTER_STD);

            if reward_slot == Some(slot) {
                commands.push(Command::SpawnDiamond {
                    position,
                    velocity: dir * DIAMOND_SPEED + sideways,
                });
            } else {
                commands.push(Command::SpawnEmitterBullet {
                    position,
                    velocity: dir * EMITTER_BULLET_SPEED + sideways,
                });
            }
        }
    }

    /// Steer a homing bullet toward the player while it has line of sight.
    /// Bullets never occlude the ray; walls and the diamond do.
    fn steer_bullet(&mut self, id: EntityId, position: Vec2) {
        let Some(player_id) = self.player else {
            return;
        };
        let Some(target) = self.entities.get(&player_id).map(|p| p.position) else {
            return;
        };

        let delta = target - position;
        let hit = self.raycast(position, delta.normalized(), 10000.0, |entity| {
            !entity.is_bullet()
        });

        if hit.map(|(entity, _)| entity) == Some(player_id) {
            if let Some(velocity) = self.physics.linear_velocity(id) {
                let speed = velocity.length();
                let steered = (velocity + delta * 0.1).normalized() * speed;
                self.physics.set_linear_velocity(id, steered);
            }
        }
    }

    /// Closest entity hit by a ray, among those accepted by `predicate`.
    pub fn raycast(
        &self,
        origin: Vec2,
        direction: Vec2,
        max_toi: f32,
        predicate: impl Fn(&Entity) -> bool,
    ) -> Option<(EntityId, f32)> {
        self.physics
            .cast_ray_filtered(origin, direction, max_toi, |id| {
                self.entities.get(&id).map(&predicate).unwrap_or(false)
            })
    }

    // ------------------------------
    // Collision reactions
    // ------------------------------

    fn partner_info(&self, id: EntityId) -> Option<ContactPartner> {
        let entity = self.entities.get(&id)?;
        Some(match &entity.kind {
            EntityKind::Wall | EntityKind::Shooter(_) => ContactPartner::WallLike,
            EntityKind::Bullet(bullet) => ContactPartner::Bullet(bullet.faction),
            EntityKind::Diamond(_) => ContactPartner::Diamond,
            EntityKind::Player(_) => ContactPartner::Player,
        })
    }

    fn contact_started(&mut self, subject: EntityId, other: EntityId) {
        let Some(partner) = self.partner_info(other) else {
            return;
        };

        let mut player_hit = false;
        let mut diamond_collected = false;

        if let Some(entity) = self.entities.get_mut(&subject) {
            match &mut entity.kind {
                EntityKind::Player(player) => {
                    if matches!(partner, ContactPartner::WallLike) {
                        player.touching_walls.insert(other);
                    }
                }
                EntityKind::Bullet(bullet) => {
                    let same_faction =
                        matches!(partner, ContactPartner::Bullet(f) if f == bullet.faction);
                    let exploding = bullet.exploding;

                    if exploding {
                        // The explosion itself kills this bullet.
                        let at = entity.position;
                        self.commands.push(Command::Explode { at });
                        self.commands.push(Command::Shake {
                            power: EXPLOSION_SHAKE_POWER,
                            amplitude: EXPLOSION_SHAKE_AMPLITUDE,
                        });
                        self.commands.push(Command::Shake {
                            power: EXPLOSION_SHAKE_POWER,
                            amplitude: EXPLOSION_SHAKE_AMPLITUDE,
                        });
                    } else if !same_faction {
                        entity.die();
                    }

                    if matches!(partner, ContactPartner::Player) {
                        player_hit = true;
                    }
                }
                EntityKind::Diamond(_) => {
                    if matches!(partner, ContactPartner::Player) {
                        entity.die();
                        diamond_collected = true;
                    }
                }
                EntityKind::Wall | EntityKind::Shooter(_) => {}
            }
        }

        if player_hit {
            if let Some(player) = self
                .entities
                .get_mut(&other)
                .and_then(Entity::as_player_mut)
            {
                player.embedded_bullets += 1;
                player.health = player.health.saturating_sub(1);
                debug!(
                    "player hit, health {} embedded {}",
                    player.health, player.embedded_bullets
                );
            }
            self.commands.push(Command::Shake {
                power: HIT_SHAKE_POWER,
                amplitude: HIT_SHAKE_AMPLITUDE,
            });
        }

        if diamond_collected {
            if let Some(player) = self
                .entities
                .get_mut(&other)
                .and_then(Entity::as_player_mut)
            {
                player.score += 1;
                player.health = MAX_HP;
                info!("diamond collected, score {}", player.score);
            }
        }
    }

    fn contact_stopped(&mut self, subject: EntityId, other: EntityId) {
        let wall_like = self
            .entities
            .get(&other)
            .map(|e| e.is_wall_like())
            .unwrap_or(false);
        if !wall_like {
            return;
        }

        if let Some(player) = self
            .entities
            .get_mut(&subject)
            .and_then(Entity::as_player_mut)
        {
            player.touching_walls.remove(&other);
        }
    }

    fn is_player_grounded(&self, player_id: EntityId) -> bool {
        let Some(player_entity) = self.entities.get(&player_id) else {
            return false;
        };
        let Some(player) = player_entity.as_player() else {
            return false;
        };

        player.touching_walls.iter().any(|wall_id| {
            self.entities.get(wall_id).is_some_and(|wall| {
                player_entity.position.y <= wall.position.y + 0.42
                    && (player_entity.position.x - wall.position.x).abs() <= 0.35
            })
        })
    }

    // ------------------------------
    // Commands
    // ------------------------------

    fn apply_command(&mut self, command: Command) {
        match command {
            Command::SpawnEmitterBullet { position, velocity } => {
                if let Err(err) = self.spawn_emitter_bullet(position, velocity) {
                    error!("failed to spawn bullet: {err:#}");
                }
            }
            Command::FirePlayerBullet { target, exploding } => {
                self.fire_player_bullet(target, exploding);
            }
            Command::SpawnDiamond { position, velocity } => {
                if self.diamond.is_some() {
                    warn!("diamond spawn dropped, one is already in play");
                    return;
                }
                if let Err(err) = self.spawn_diamond(position, velocity) {
                    error!("failed to spawn diamond: {err:#}");
                }
            }
            Command::Explode { at } => self.explode_at(at),
            Command::Shake { power, amplitude } => self.shake_screen(power, amplitude),
        }
    }

    fn fire_player_bullet(&mut self, target: Vec2, exploding: bool) {
        let Some(position) = self
            .player
            .and_then(|id| self.entities.get(&id))
            .map(|p| p.position)
        else {
            return;
        };

        // Aim from slightly above the player's center.
        let aim_origin = Vec2::new(position.x, position.y - 0.5);
        let direction = (target - aim_origin).normalized();
        if direction == Vec2::ZERO {
            return;
        }

        let spawn = position + direction * PLAYER_BULLET_SPAWN_OFFSET;
        if let Err(err) = self.spawn_player_bullet(spawn, direction * PLAYER_BULLET_SPEED, exploding)
        {
            error!("failed to spawn player bullet: {err:#}");
        }
    }

    /// Kill every bullet within the explosion radius, boundary included.
    pub fn explode_at(&mut self, at: Vec2) {
        for entity in self.entities.values_mut() {
            if entity.is_bullet()
                && entity.position.distance_squared(at) <= EXPLOSION_RADIUS * EXPLOSION_RADIUS
            {
                entity.die();
            }
        }
    }

    /// Add four randomly oriented shakers, horizontally biased.
    pub fn shake_screen(&mut self, power: f32, amplitude: f32) {
        for _ in 0..4 {
            let direction = Vec2::new(
                self.rng.random_range(-1.0..1.0),
                self.rng.random_range(-1.0..1.0) / 1.7,
            );
            self.shakers
                .push(ScreenShaker::new(direction * amplitude, power, SHAKE_DAMPING));
        }
    }

    // ------------------------------
    // Lifecycle and camera
    // ------------------------------

    fn sweep_dead(&mut self) {
        let dead: Vec<EntityId> = self
            .entities
            .iter()
            .filter(|(_, entity)| !entity.is_alive())
            .map(|(id, _)| *id)
            .collect();

        for id in dead {
            let Some(entity) = self.entities.remove(&id) else {
                continue;
            };
            self.physics.remove_body(id);
            self.shooters.retain(|&s| s != id);

            if self.diamond == Some(id) {
                self.diamond = None;
                self.diamond_scheduled = false;
            }

            if self.player == Some(id) {
                info!("player died after {:.1}s", self.time);
                self.player = None;
                self.dead_player = Some(entity);
                self.game_over = true;
            }
        }
    }

    fn update_camera(&mut self, dt: f32) {
        if let Some(player) = self.player.and_then(|id| self.entities.get(&id)) {
            let cam = &mut self.camera.position;
            if cam.x < player.position.x - CAMERA_SLACK_X {
                cam.x = player.position.x - CAMERA_SLACK_X;
            }
            if cam.x > player.position.x + CAMERA_SLACK_X {
                cam.x = player.position.x + CAMERA_SLACK_X;
            }
            if cam.y < player.position.y - CAMERA_SLACK_Y {
                cam.y = player.position.y - CAMERA_SLACK_Y;
            }
            if cam.y > player.position.y + CAMERA_SLACK_Y {
                cam.y = player.position.y + CAMERA_SLACK_Y;
            }
        }

        for shaker in &mut self.shakers {
            shaker.update(dt);
        }
        self.shakers.retain(|shaker| !shaker.expired());
    }

    // ------------------------------
    // Input and drawing
    // ------------------------------

    /// Left-mouse press: delegate to the controller, which queues the shot.
    pub fn fire_pressed(&mut self) {
        let Some(player_id) = self.player else {
            return;
        };
        let angular_velocity = self.physics.angular_velocity(player_id).unwrap_or(0.0);
        let Some(player) = self
            .entities
            .get_mut(&player_id)
            .and_then(Entity::as_player_mut)
        else {
            return;
        };
        self.controller
            .fire(player, angular_velocity, &mut self.commands);
    }

    /// Append every entity's outline to the world-space batch.
    pub fn draw(&self, batch: &mut DrawBatch) {
        for entity in self.entities.values() {
            Self::draw_entity(entity, batch);
        }
        if let Some(dead) = &self.dead_player {
            Self::draw_entity(dead, batch);
        }
    }

    fn draw_entity(entity: &Entity, batch: &mut DrawBatch) {
        let transform =
            |p: &Vec2| -> Vec2 { p.rotated(entity.rotation) + entity.position };

        let outline: Vec<Vec2> = entity.outline().iter().map(&transform).collect();
        batch.line_loop(&outline, entity.color());

        if let Some((chevrons, color)) = entity.chevrons() {
            let chevrons: Vec<Vec2> = chevrons.iter().map(&transform).collect();
            batch.line_list(&chevrons, color);
        }
    }

    #[cfg(test)]
    fn queue_command(&mut self, command: Command) {
        self.commands.push(command);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_level() -> Level {
        Level::new(42)
    }

    /// A level with a floor directly under the player spawn.
    fn level_with_player() -> (Level, EntityId) {
        let mut level = empty_level();
        for x in 0..8 {
            level.add_wall(Vec2::new(x as f32, 7.0)).unwrap();
        }
        let player = level.spawn_player(Vec2::new(2.0, 5.0)).unwrap();
        (level, player)
    }

    #[test]
    fn dead_entities_leave_arena_and_physics_in_one_sweep() {
        let mut level = empty_level();
        let bullet = level
            .spawn_emitter_bullet(Vec2::new(3.0, 3.0), Vec2::new(1.0, 0.0))
            .unwrap();

        level.explode_at(Vec2::new(3.0, 3.0));
        assert!(level.entity(bullet).is_some());

        level.update(1.0 / 60.0);
        assert!(level.entity(bullet).is_none());
        assert!(!level.physics.has_body(bullet));
    }

    #[test]
    fn explosion_radius_boundary_is_inclusive() {
        let mut level = empty_level();
        let on_boundary = level
            .spawn_emitter_bullet(Vec2::new(5.0, 0.0), Vec2::ZERO)
            .unwrap();
        let outside = level
            .spawn_emitter_bullet(Vec2::new(5.05, 0.0), Vec2::ZERO)
            .unwrap();

        level.explode_at(Vec2::ZERO);

        assert!(!level.entity(on_boundary).unwrap().is_alive());
        assert!(level.entity(outside).unwrap().is_alive());
    }

    #[test]
    fn explosion_spares_non_bullets() {
        let (mut level, player) = level_with_player();
        level.explode_at(Vec2::new(2.0, 5.0));
        assert!(level.entity(player).unwrap().is_alive());
    }

    #[test]
    fn volley_fires_on_exact_interval() {
        let mut level = empty_level();
        let mut shooter = Shooter::new(1.0, 0.0);
        shooter.add_direction(1, 0).unwrap();
        shooter.seal();
        level.add_shooter(Vec2::new(0.0, 0.0), shooter).unwrap();

        level.update(1.0);

        let bullets = level.entities().filter(|e| e.is_bullet()).count();
        assert_eq!(bullets, 1);
    }

    #[test]
    fn initial_volley_is_delayed_by_the_generator_offset() {
        let mut level = empty_level();
        let mut shooter = Shooter::new(1.0, -3.9);
        shooter.add_direction(0, -1).unwrap();
        shooter.seal();
        level.add_shooter(Vec2::new(4.0, 4.0), shooter).unwrap();

        for _ in 0..4 {
            level.update(1.0);
            assert_eq!(level.entities().filter(|e| e.is_bullet()).count(), 0);
        }
        level.update(1.0);
        assert_eq!(level.entities().filter(|e| e.is_bullet()).count(), 1);
    }

    #[test]
    fn at_most_one_diamond_in_play() {
        let mut level = empty_level();
        level
            .spawn_diamond(Vec2::new(3.0, 3.0), Vec2::ZERO)
            .unwrap();
        let first = level.diamond_id().unwrap();

        level.queue_command(Command::SpawnDiamond {
            position: Vec2::new(6.0, 6.0),
            velocity: Vec2::ZERO,
        });
        level.update(1.0 / 60.0);

        assert_eq!(level.diamond_id(), Some(first));
        assert_eq!(
            level
                .entities()
                .filter(|e| matches!(e.kind, EntityKind::Diamond(_)))
                .count(),
            1
        );
    }

    #[test]
    fn no_diamond_scheduled_before_the_opening_delay() {
        let mut level = empty_level();
        let mut shooter = Shooter::new(1000.0, 0.0);
        shooter.add_direction(1, 0).unwrap();
        shooter.seal();
        let id = level.add_shooter(Vec2::new(0.0, 0.0), shooter).unwrap();

        level.update(4.0);
        let EntityKind::Shooter(s) = &level.entity(id).unwrap().kind else {
            panic!("not a shooter");
        };
        assert!(!s.next_is_reward);

        level.update(2.0);
        let EntityKind::Shooter(s) = &level.entity(id).unwrap().kind else {
            panic!("not a shooter");
        };
        assert!(s.next_is_reward);
    }

    #[test]
    fn reward_volley_substitutes_the_diamond_into_one_slot() {
        let mut level = empty_level();
        let mut shooter = Shooter::new(1.0, 0.0);
        shooter.add_direction(1, 0).unwrap();
        shooter.add_direction(0, -1).unwrap();
        shooter.seal();
        let id = level.add_shooter(Vec2::new(10.0, 10.0), shooter).unwrap();

        if let Some(EntityKind::Shooter(s)) = level.entity_mut(id).map(|e| &mut e.kind) {
            s.next_is_reward = true;
        }
        level.update(1.0);

        assert_eq!(level.entities().filter(|e| e.is_bullet()).count(), 1);
        assert!(level.diamond_id().is_some());
        let EntityKind::Shooter(s) = &level.entity(id).unwrap().kind else {
            panic!("not a shooter");
        };
        assert!(!s.next_is_reward);
    }

    #[test]
    fn expired_diamond_frees_the_schedule_slot() {
        let mut level = empty_level();
        level
            .spawn_diamond(Vec2::new(3.0, 3.0), Vec2::ZERO)
            .unwrap();
        level.diamond_scheduled = true;

        for _ in 0..21 {
            level.update(1.0);
        }

        assert!(level.diamond_id().is_none());
        assert!(!level.diamond_scheduled);
    }

    #[test]
    fn bullet_hit_embeds_damages_and_shakes() {
        let (mut level, player) = level_with_player();
        let bullet = level
            .spawn_emitter_bullet(Vec2::new(2.0, 5.0), Vec2::ZERO)
            .unwrap();

        level.contact_started(bullet, player);
        level.contact_started(player, bullet);

        let p = level.entity(player).unwrap().as_player().unwrap();
        assert_eq!(p.health, MAX_HP - 1);
        assert_eq!(p.embedded_bullets, 1);
        assert!(!level.entity(bullet).unwrap().is_alive());
        assert!(level
            .commands
            .iter()
            .any(|c| matches!(c, Command::Shake { .. })));
    }

    #[test]
    fn same_faction_bullets_pass_through() {
        let mut level = empty_level();
        let a = level
            .spawn_emitter_bullet(Vec2::new(1.0, 1.0), Vec2::ZERO)
            .unwrap();
        let b = level
            .spawn_emitter_bullet(Vec2::new(1.2, 1.0), Vec2::ZERO)
            .unwrap();

        level.contact_started(a, b);
        level.contact_started(b, a);

        assert!(level.entity(a).unwrap().is_alive());
        assert!(level.entity(b).unwrap().is_alive());
    }

    #[test]
    fn opposing_bullets_destroy_each_other() {
        let mut level = empty_level();
        let red = level
            .spawn_emitter_bullet(Vec2::new(1.0, 1.0), Vec2::ZERO)
            .unwrap();
        let yellow = level
            .spawn_player_bullet(Vec2::new(1.2, 1.0), Vec2::ZERO, false)
            .unwrap();

        level.contact_started(red, yellow);
        level.contact_started(yellow, red);

        assert!(!level.entity(red).unwrap().is_alive());
        assert!(!level.entity(yellow).unwrap().is_alive());
    }

    #[test]
    fn exploding_bullet_queues_explosion_and_double_shake() {
        let mut level = empty_level();
        let wall = level.add_wall(Vec2::new(5.0, 5.0)).unwrap();
        let bullet = level
            .spawn_player_bullet(Vec2::new(4.0, 5.0), Vec2::ZERO, true)
            .unwrap();

        level.contact_started(bullet, wall);

        let explosions = level
            .commands
            .iter()
            .filter(|c| matches!(c, Command::Explode { .. }))
            .count();
        let shakes = level
            .commands
            .iter()
            .filter(|c| matches!(c, Command::Shake { .. }))
            .count();
        assert_eq!(explosions, 1);
        assert_eq!(shakes, 2);
    }

    #[test]
    fn diamond_pickup_scores_and_restores_health() {
        let (mut level, player) = level_with_player();
        if let Some(p) = level.entity_mut(player).and_then(Entity::as_player_mut) {
            p.health = 1;
        }
        let diamond = level
            .spawn_diamond(Vec2::new(2.0, 5.0), Vec2::ZERO)
            .unwrap();

        level.contact_started(diamond, player);
        level.contact_started(player, diamond);

        let p = level.entity(player).unwrap().as_player().unwrap();
        assert_eq!(p.score, 1);
        assert_eq!(p.health, MAX_HP);
        assert!(!level.entity(diamond).unwrap().is_alive());
    }

    #[test]
    fn game_ends_exactly_on_the_tick_the_player_dies() {
        let (mut level, player) = level_with_player();
        if let Some(p) = level.entity_mut(player).and_then(Entity::as_player_mut) {
            p.health = 0;
        }

        assert!(!level.update(1.0 / 60.0));
        assert!(level.is_game_over());
        assert!(level.player_id().is_none());
        assert!(level.player_entity().is_some());

        // Further updates stay inert.
        assert!(!level.update(1.0 / 60.0));
    }

    #[test]
    fn too_many_embedded_bullets_kill_the_player() {
        let (mut level, player) = level_with_player();
        if let Some(p) = level.entity_mut(player).and_then(Entity::as_player_mut) {
            p.embedded_bullets = EMBEDDED_BULLET_LIMIT + 1;
        }

        assert!(!level.update(1.0 / 60.0));
        assert!(level.is_game_over());
    }

    #[test]
    fn raycast_is_occluded_by_walls() {
        let (mut level, player) = level_with_player();
        let wall = level.add_wall(Vec2::new(5.0, 5.0)).unwrap();

        // Player at (2, 5), wall at (5, 5), probe from (8, 5) looking left.
        let hit = level.raycast(
            Vec2::new(8.0, 5.0),
            Vec2::new(-1.0, 0.0),
            10000.0,
            |e| !e.is_bullet(),
        );
        assert_eq!(hit.map(|(id, _)| id), Some(wall));

        // Clear line of sight once the wall is out of the way.
        level.entity_mut(wall).unwrap().die();
        level.update(1.0 / 60.0);
        let hit = level.raycast(
            Vec2::new(8.0, 5.0),
            Vec2::new(-1.0, 0.0),
            10000.0,
            |e| !e.is_bullet(),
        );
        assert_eq!(hit.map(|(id, _)| id), Some(player));
    }

    #[test]
    fn homing_bullet_bends_toward_the_player_at_constant_speed() {
        let (mut level, _player) = level_with_player();
        // Player at (2, 5); the bullet starts to the right, flying straight
        // down, with nothing blocking line of sight.
        let bullet = level
            .spawn_emitter_bullet(Vec2::new(6.0, 5.0), Vec2::new(0.0, 8.0))
            .unwrap();

        level.update(1.0 / 60.0);

        let velocity = level.physics.linear_velocity(bullet).unwrap();
        // Steering blends in a tenth of the offset toward the player and
        // renormalizes, so the heading bends left but the speed holds.
        assert!(velocity.x < 0.0);
        assert!((velocity.length() - 8.0).abs() < 1e-3);
    }

    #[test]
    fn raycast_predicate_skips_bullets() {
        let (mut level, player) = level_with_player();
        level
            .spawn_emitter_bullet(Vec2::new(5.0, 5.0), Vec2::ZERO)
            .unwrap();

        let hit = level.raycast(
            Vec2::new(8.0, 5.0),
            Vec2::new(-1.0, 0.0),
            10000.0,
            |e| !e.is_bullet(),
        );
        assert_eq!(hit.map(|(id, _)| id), Some(player));
    }

    #[test]
    fn grounded_requires_overlap_and_proximity() {
        let (mut level, player) = level_with_player();
        let below = level.raycast(
            Vec2::new(2.0, 5.5),
            Vec2::new(0.0, 1.0),
            100.0,
            |e| e.is_wall_like(),
        );
        let wall = below.unwrap().0;

        if let Some(p) = level.entity_mut(player).and_then(Entity::as_player_mut) {
            p.touching_walls.insert(wall);
        }

        // Directly above the touched wall: grounded.
        level.entity_mut(player).unwrap().position = Vec2::new(2.0, 6.5);
        assert!(level.is_player_grounded(player));

        // Too far sideways: airborne even while still touching.
        level.entity_mut(player).unwrap().position = Vec2::new(2.4, 6.5);
        assert!(!level.is_player_grounded(player));
    }

    #[test]
    fn player_settles_on_the_floor_and_registers_contact() {
        let (mut level, player) = level_with_player();

        for _ in 0..120 {
            level.update(1.0 / 60.0);
        }

        let entity = level.entity(player).unwrap();
        assert!(entity.position.y < 7.0);
        assert!(!entity.as_player().unwrap().touching_walls.is_empty());
        assert!(level.is_player_grounded(player));
    }

    #[test]
    fn camera_clamps_to_the_dead_zone_around_the_player() {
        let (mut level, _player) = level_with_player();

        for _ in 0..120 {
            level.update(1.0 / 60.0);
        }

        let player_pos = level.player_entity().unwrap().position;
        let camera = level.camera();
        assert!((camera.position.x - player_pos.x).abs() <= 5.0 + 1e-3);
        assert!((camera.position.y - player_pos.y).abs() <= 3.0 + 1e-3);
    }

    #[test]
    fn deferred_player_fire_spawns_from_the_player() {
        let (mut level, _player) = level_with_player();

        level.queue_command(Command::FirePlayerBullet {
            target: Vec2::new(10.0, 5.0),
            exploding: false,
        });
        level.update(1.0 / 60.0);

        let bullet = level
            .entities()
            .find(|e| e.is_bullet())
            .expect("a player bullet");
        let EntityKind::Bullet(b) = &bullet.kind else {
            unreachable!();
        };
        assert_eq!(b.faction, Faction::Player);
        assert!(!b.following);
        assert!((b.start_velocity.length() - 10.0).abs() < 1e-3);
    }

    #[test]
    fn fire_command_without_player_is_dropped() {
        let mut level = empty_level();
        level.queue_command(Command::FirePlayerBullet {
            target: Vec2::new(1.0, 1.0),
            exploding: false,
        });
        level.update(1.0 / 60.0);
        assert_eq!(level.entities().count(), 0);
    }

    #[test]
    fn same_seed_generates_the_same_volley_jitter() {
        let run = || {
            let mut level = Level::new(7);
            let mut shooter = Shooter::new(1.0, 0.0);
            shooter.add_direction(1, 0).unwrap();
            shooter.seal();
            level.add_shooter(Vec2::new(0.0, 0.0), shooter).unwrap();
            level.update(1.0);
            let velocity = level
                .entities()
                .find(|e| e.is_bullet())
                .map(|e| match &e.kind {
                    EntityKind::Bullet(b) => b.start_velocity,
                    _ => unreachable!(),
                })
                .unwrap();
            velocity
        };

        assert_eq!(run(), run());
    }
}
