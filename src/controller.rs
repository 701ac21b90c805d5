use std::collections::HashSet;

use log::debug;

use crate::entity::{EntityId, Player};
use crate::level::Command;
use crate::math::{Camera2D, Vec2};
use crate::physics::PhysicsWorld;

/// Coyote time: jumping stays possible briefly after leaving the ground.
const GROUNDED_GRACE: f32 = 0.25;
/// A jump press is buffered briefly so slightly-early input still lands.
const JUMP_BUFFER: f32 = 0.1;
const JUMP_COOLDOWN: f32 = 0.3;

const JUMP_VELOCITY: f32 = -10.0;
const PLAYER_SPEED: f32 = 0.7;

const DAMPING_STOPPING: f32 = 0.6;
const DAMPING_TURNING: f32 = 0.7;
const DAMPING_GROUNDED: f32 = 0.4;
const DAMPING_AIR_EXTRA: f32 = 0.3;

/// A spinning player fires exploding shots instead of plain ones.
const EXPLODING_SPIN_THRESHOLD: f32 = 15.0;

/// Logical player inputs, decoupled from the key bindings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    Jump,
    Left,
    Right,
}

/// Translates held actions and pointer state into physics impulses and
/// deferred fire commands.
#[derive(Clone, Debug)]
pub struct PlayerController {
    pressed: HashSet<Action>,
    pointer: Vec2,
    viewport: (u32, u32),
    camera: Camera2D,

    grounded_timer: f32,
    jump_buffer_timer: f32,
    jump_cooldown_timer: f32,
}

impl Default for PlayerController {
    fn default() -> Self {
        Self {
            pressed: HashSet::new(),
            pointer: Vec2::ZERO,
            viewport: (1, 1),
            camera: Camera2D::default(),
            grounded_timer: 0.0,
            jump_buffer_timer: 0.0,
            jump_cooldown_timer: 0.0,
        }
    }
}

impl PlayerController {
    pub fn set_pressed(&mut self, action: Action, down: bool) {
        if down {
            self.pressed.insert(action);
        } else {
            self.pressed.remove(&action);
        }
    }

    pub fn set_pointer(&mut self, position: Vec2) {
        self.pointer = position;
    }

    /// Snapshot the viewport and camera the next shot will be aimed through.
    pub fn sync_view(&mut self, viewport: (u32, u32), camera: Camera2D) {
        self.viewport = viewport;
        self.camera = camera;
    }

    fn is_pressed(&self, action: Action) -> bool {
        self.pressed.contains(&action)
    }

    pub fn update(
        &mut self,
        dt: f32,
        player: EntityId,
        grounded: bool,
        physics: &mut PhysicsWorld,
    ) {
        self.handle_jumping(dt, player, grounded, physics);
        self.handle_lateral(dt, player, grounded, physics);
    }

    fn handle_jumping(
        &mut self,
        dt: f32,
        player: EntityId,
        grounded: bool,
        physics: &mut PhysicsWorld,
    ) {
        self.grounded_timer -= dt;
        self.jump_buffer_timer -= dt;
        self.jump_cooldown_timer -= dt;

        if grounded {
            self.grounded_timer = GROUNDED_GRACE;
        }
        if self.is_pressed(Action::Jump) {
            self.jump_buffer_timer = JUMP_BUFFER;
        }

        if self.grounded_timer > 0.0 && self.jump_buffer_timer > 0.0 && self.jump_cooldown_timer < 0.0
        {
            let velocity = physics.linear_velocity(player).unwrap_or_default();
            physics.set_linear_velocity(player, Vec2::new(velocity.x, JUMP_VELOCITY));
            self.grounded_timer = 0.0;
            self.jump_buffer_timer = 0.0;
            self.jump_cooldown_timer = JUMP_COOLDOWN;
        }
    }

    fn handle_lateral(
        &mut self,
        dt: f32,
        player: EntityId,
        grounded: bool,
        physics: &mut PhysicsWorld,
    ) {
        let before = physics.linear_velocity(player).unwrap_or_default().x;

        let mut added = 0.0;
        if self.is_pressed(Action::Left) {
            added -= PLAYER_SPEED;
        }
        if self.is_pressed(Action::Right) {
            added += PLAYER_SPEED;
        }

        // The impulse is applied below the center of mass so steering also
        // imparts a slight spin.
        if let (Some(mass), Some(com)) = (physics.mass(player), physics.center_of_mass(player)) {
            let point = Vec2::new(com.x, com.y - 0.05);
            physics.apply_impulse_at_point(player, Vec2::new(added * mass, 0.0), point);
        }

        let velocity = physics.linear_velocity(player).unwrap_or_default();
        let mut vx = velocity.x;

        let rate = if added.abs() < 1e-3 {
            DAMPING_STOPPING
        } else if added.is_sign_negative() != before.is_sign_negative() {
            DAMPING_TURNING
        } else {
            DAMPING_GROUNDED
        };
        vx *= (1.0 - rate).powf(dt * 10.0);

        if !grounded {
            vx *= (1.0 - DAMPING_AIR_EXTRA).powf(dt * 10.0);
        }

        physics.set_linear_velocity(player, Vec2::new(vx, velocity.y));
    }

    /// Queue a shot at the pointer. Costs one embedded bullet up front; a
    /// fast-spinning player fires an exploding shot.
    pub fn fire(&mut self, player: &mut Player, angular_velocity: f32, commands: &mut Vec<Command>) {
        if player.embedded_bullets == 0 {
            return;
        }

        let target =
            self.camera
                .screen_to_world(self.pointer, self.viewport.0, self.viewport.1);
        let exploding = angular_velocity.abs() > EXPLODING_SPIN_THRESHOLD;

        commands.push(Command::FirePlayerBullet { target, exploding });
        player.embedded_bullets -= 1;
        debug!(
            "fired at {:?}, exploding {}, ammo left {}",
            target, exploding, player.embedded_bullets
        );
    }
}
