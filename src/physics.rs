use anyhow::{anyhow, Result};
use std::collections::HashMap;

use crate::entity::EntityId;
use crate::math::Vec2;

// Rapier is a private implementation detail: do NOT re-export it.
use rapier2d::prelude::*;

/// Engine-facing rigid body kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BodyKind {
    Dynamic,
    Fixed,
}

/// Engine-facing body descriptor, supplied by an entity kind.
#[derive(Clone, Debug)]
pub struct BodyDef {
    pub kind: BodyKind,
    pub linear_velocity: Vec2,
    pub gravity_scale: f32,
    pub angular_damping: f32,
    /// Continuous collision detection, needed for fast projectiles.
    pub ccd: bool,
    pub lock_rotation: bool,
}

impl Default for BodyDef {
    fn default() -> Self {
        Self {
            kind: BodyKind::Fixed,
            linear_velocity: Vec2::ZERO,
            gravity_scale: 1.0,
            angular_damping: 0.0,
            ccd: false,
            lock_rotation: false,
        }
    }
}

/// Engine-facing collider shape.
#[derive(Clone, Debug)]
pub enum ShapeDef {
    Circle { radius: f32 },
    Box { hx: f32, hy: f32 },
    ConvexHull(Vec<Vec2>),
}

/// Engine-facing fixture descriptor.
#[derive(Clone, Debug)]
pub struct ColliderDef {
    pub shape: ShapeDef,
    pub density: f32,
    pub friction: f32,
    pub restitution: f32,
}

/// Engine-facing contact event. Uses EntityId only.
#[derive(Clone, Copy, Debug)]
pub enum ContactEvent {
    Started(EntityId, EntityId),
    Stopped(EntityId, EntityId),
}

pub struct PhysicsWorld {
    // --- rapier internals ---
    pipeline: PhysicsPipeline,
    integration_parameters: IntegrationParameters,
    island_manager: IslandManager,
    broad_phase: BroadPhase,
    narrow_phase: NarrowPhase,
    rigid_bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,

    // Event channels
    event_recv_collision: crossbeam_channel::Receiver<CollisionEvent>,
    event_recv_contact_force: crossbeam_channel::Receiver<ContactForceEvent>,
    event_handler: ChannelEventCollector,

    // --- mappings (game <-> rapier) ---
    entity_to_body: HashMap<EntityId, RigidBodyHandle>,
    body_to_entity: HashMap<RigidBodyHandle, EntityId>,

    gravity: Vec2,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicsWorld {
    pub fn new() -> Self {
        let (send_col, recv_col) = crossbeam_channel::unbounded();
        let (send_force, recv_force) = crossbeam_channel::unbounded();
        let event_handler = ChannelEventCollector::new(send_col, send_force);

        Self {
            pipeline: PhysicsPipeline::new(),
            integration_parameters: IntegrationParameters::default(),
            island_manager: IslandManager::new(),
            broad_phase: BroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            rigid_bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),

            event_recv_collision: recv_col,
            event_recv_contact_force: recv_force,
            event_handler,

            entity_to_body: HashMap::new(),
            body_to_entity: HashMap::new(),

            gravity: Vec2::new(0.0, 20.0),
        }
    }

    /// Create a body for an entity from its descriptor. A previous body for
    /// the same entity is replaced, keeping the one-body-per-entity invariant.
    pub fn create_body(
        &mut self,
        entity: EntityId,
        def: &BodyDef,
        position: Vec2,
        rotation: f32,
    ) -> Result<()> {
        self.remove_body(entity);

        let rb_type = match def.kind {
            BodyKind::Dynamic => RigidBodyType::Dynamic,
            BodyKind::Fixed => RigidBodyType::Fixed,
        };

        let body = RigidBodyBuilder::new(rb_type)
            .translation(vector![position.x, position.y])
            .rotation(rotation)
            .linvel(vector![def.linear_velocity.x, def.linear_velocity.y])
            .gravity_scale(def.gravity_scale)
            .angular_damping(def.angular_damping)
            .ccd_enabled(def.ccd)
            .build();

        let handle = self.rigid_bodies.insert(body);
        if def.lock_rotation {
            if let Some(b) = self.rigid_bodies.get_mut(handle) {
                b.lock_rotations(true, true);
            }
        }

        self.entity_to_body.insert(entity, handle);
        self.body_to_entity.insert(handle, entity);
        Ok(())
    }

    /// Remove a body (and its colliders) for an entity. Returns whether one existed.
    pub fn remove_body(&mut self, entity: EntityId) -> bool {
        if let Some(handle) = self.entity_to_body.remove(&entity) {
            self.rigid_bodies.remove(
                handle,
                &mut self.island_manager,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                true,
            );
            self.body_to_entity.remove(&handle);
            true
        } else {
            false
        }
    }

    /// Attach a fixture to an entity's body. Every collider reports contact
    /// events so the level can dispatch collision reactions.
    pub fn add_collider(&mut self, entity: EntityId, def: &ColliderDef) -> Result<()> {
        let body = self.body_handle(entity)?;
        let shape = to_rapier_shape(&def.shape)?;

        let collider = ColliderBuilder::new(shape)
            .density(def.density)
            .friction(def.friction)
            .restitution(def.restitution)
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .build();

        self.colliders
            .insert_with_parent(collider, body, &mut self.rigid_bodies);
        self.query_pipeline
            .update(&self.island_manager, &self.rigid_bodies, &self.colliders);

        Ok(())
    }

    /// Step simulation by fixed dt (seconds).
    pub fn step(&mut self, dt: f32) {
        self.integration_parameters.dt = dt;

        let gravity = vector![self.gravity.x, self.gravity.y];
        let hooks = &();

        self.pipeline.step(
            &gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            hooks,
            &self.event_handler,
        );

        self.query_pipeline
            .update(&self.island_manager, &self.rigid_bodies, &self.colliders);
    }

    /// Drain contact events accumulated by the steps since the last call.
    pub fn drain_events(&mut self) -> Vec<ContactEvent> {
        let mut events = Vec::new();

        while let Ok(ev) = self.event_recv_collision.try_recv() {
            match ev {
                CollisionEvent::Started(c1, c2, _) => {
                    if let Some((a, b)) = self.map_pair(c1, c2) {
                        events.push(ContactEvent::Started(a, b));
                    }
                }
                CollisionEvent::Stopped(c1, c2, _) => {
                    if let Some((a, b)) = self.map_pair(c1, c2) {
                        events.push(ContactEvent::Stopped(a, b));
                    }
                }
            }
        }
        // Contact force reports are unused; keep the channel drained.
        while self.event_recv_contact_force.try_recv().is_ok() {}

        events
    }

    // ------------------------------
    // Per-entity body queries/actions
    // ------------------------------

    pub fn body_position(&self, entity: EntityId) -> Option<Vec2> {
        let b = self.body(entity)?;
        let t = b.translation();
        Some(Vec2::new(t.x, t.y))
    }

    pub fn body_rotation(&self, entity: EntityId) -> Option<f32> {
        Some(self.body(entity)?.rotation().angle())
    }

    pub fn linear_velocity(&self, entity: EntityId) -> Option<Vec2> {
        let v = self.body(entity)?.linvel();
        Some(Vec2::new(v.x, v.y))
    }

    pub fn set_linear_velocity(&mut self, entity: EntityId, vel: Vec2) {
        if let Some(b) = self.body_mut(entity) {
            b.set_linvel(vector![vel.x, vel.y], true);
        }
    }

    pub fn angular_velocity(&self, entity: EntityId) -> Option<f32> {
        Some(self.body(entity)?.angvel())
    }

    pub fn mass(&self, entity: EntityId) -> Option<f32> {
        Some(self.body(entity)?.mass())
    }

    /// World-space center of mass, the reference point for control impulses.
    pub fn center_of_mass(&self, entity: EntityId) -> Option<Vec2> {
        let b = self.body(entity)?;
        let c = b.mass_properties().world_com(b.position());
        Some(Vec2::new(c.x, c.y))
    }

    /// Apply an instantaneous impulse at a world-space point, which may
    /// impart both linear and angular momentum.
    pub fn apply_impulse_at_point(&mut self, entity: EntityId, impulse: Vec2, point: Vec2) {
        if let Some(b) = self.body_mut(entity) {
            b.apply_impulse_at_point(
                vector![impulse.x, impulse.y],
                point![point.x, point.y],
                true,
            );
        }
    }

    /// Return true if an entity currently has a physics body.
    pub fn has_body(&self, entity: EntityId) -> bool {
        self.entity_to_body.contains_key(&entity)
    }

    // ------------------------------
    // Queries
    // ------------------------------

    /// Cast a ray and return the closest hit among entities accepted by
    /// `predicate`, as `(entity, toi)` with `toi` scaled by `direction`.
    pub fn cast_ray_filtered(
        &self,
        origin: Vec2,
        direction: Vec2,
        max_toi: f32,
        predicate: impl Fn(EntityId) -> bool,
    ) -> Option<(EntityId, f32)> {
        let ray = Ray::new(
            point![origin.x, origin.y],
            vector![direction.x, direction.y],
        );

        let pred = |_handle: ColliderHandle, collider: &Collider| -> bool {
            collider
                .parent()
                .and_then(|body| self.body_to_entity.get(&body))
                .map(|&e| predicate(e))
                .unwrap_or(false)
        };
        let filter = QueryFilter::new().predicate(&pred);

        let (col_handle, toi) = self.query_pipeline.cast_ray(
            &self.rigid_bodies,
            &self.colliders,
            &ray,
            max_toi,
            true,
            filter,
        )?;

        let collider = self.colliders.get(col_handle)?;
        let body = collider.parent()?;
        let entity = *self.body_to_entity.get(&body)?;
        Some((entity, toi))
    }

    // ------------------------------
    // Private helpers
    // ------------------------------

    fn body(&self, entity: EntityId) -> Option<&RigidBody> {
        let h = *self.entity_to_body.get(&entity)?;
        self.rigid_bodies.get(h)
    }

    fn body_mut(&mut self, entity: EntityId) -> Option<&mut RigidBody> {
        let h = *self.entity_to_body.get(&entity)?;
        self.rigid_bodies.get_mut(h)
    }

    fn body_handle(&self, entity: EntityId) -> Result<RigidBodyHandle> {
        self.entity_to_body
            .get(&entity)
            .copied()
            .ok_or_else(|| anyhow!("Entity {:?} has no physics body", entity))
    }

    fn map_pair(&self, c1: ColliderHandle, c2: ColliderHandle) -> Option<(EntityId, EntityId)> {
        let b1 = self.colliders.get(c1)?.parent()?;
        let b2 = self.colliders.get(c2)?.parent()?;
        let e1 = *self.body_to_entity.get(&b1)?;
        let e2 = *self.body_to_entity.get(&b2)?;
        Some((e1, e2))
    }
}

fn to_rapier_shape(shape: &ShapeDef) -> Result<SharedShape> {
    match shape {
        ShapeDef::Circle { radius } => Ok(SharedShape::ball(*radius)),
        ShapeDef::Box { hx, hy } => Ok(SharedShape::cuboid(*hx, *hy)),
        ShapeDef::ConvexHull(points) => {
            let points: Vec<_> = points.iter().map(|p| point![p.x, p.y]).collect();
            SharedShape::convex_hull(&points)
                .ok_or_else(|| anyhow!("Degenerate convex hull with {} points", points.len()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_of_mass_is_in_world_space() {
        let mut physics = PhysicsWorld::new();
        let id = EntityId(1);

        let def = BodyDef {
            kind: BodyKind::Dynamic,
            ..BodyDef::default()
        };
        physics
            .create_body(id, &def, Vec2::new(3.0, 4.0), 0.0)
            .unwrap();
        physics
            .add_collider(
                id,
                &ColliderDef {
                    shape: ShapeDef::Box { hx: 0.5, hy: 0.5 },
                    density: 1.0,
                    friction: 0.0,
                    restitution: 0.0,
                },
            )
            .unwrap();

        // A symmetric box is balanced on the body origin, so the world
        // center of mass sits on the body position.
        let com = physics.center_of_mass(id).unwrap();
        assert!((com.x - 3.0).abs() < 1e-5);
        assert!((com.y - 4.0).abs() < 1e-5);
    }
}
