//! `PhysicsBackend` implementation on top of rapier2d
//!
//! The rest of the server works in pixel-sized world units; rapier works in meters,
//! so every value crossing this module is scaled by `pixels_per_meter`.

use std::collections::HashMap;

use parking_lot::Mutex;
use rapier2d::prelude::{
    ActiveEvents, CCDSolver, ColliderBuilder, ColliderHandle, ColliderSet,
    CollisionEvent, ContactPair, DefaultBroadPhase, EventHandler, Group, ImpulseJointSet,
    IntegrationParameters, InteractionGroups, IslandManager, MultibodyJointSet, NarrowPhase,
    PhysicsPipeline, Real, RigidBodyBuilder, RigidBodyHandle, RigidBodySet, Vector,
};
use tracing::debug;

use crate::util::vec2::Vec2;

use super::physics::{
    BodyDesc, BodyHandle, BodyKind, CollisionPair, PhysicsBackend, PhysicsError, Pose, Shape,
};

/// Avatar mass in kilograms, so a force reads as an acceleration
const AVATAR_MASS: Real = 1.0;

const ACTIVE_GROUP: Group = Group::GROUP_1;
const GHOST_GROUP: Group = Group::GROUP_2;
const GEOMETRY_GROUP: Group = Group::GROUP_3;

fn active_groups() -> InteractionGroups {
    InteractionGroups::new(ACTIVE_GROUP, ACTIVE_GROUP | GEOMETRY_GROUP)
}

fn ghost_groups() -> InteractionGroups {
    InteractionGroups::new(GHOST_GROUP, GHOST_GROUP | GEOMETRY_GROUP)
}

fn geometry_groups() -> InteractionGroups {
    InteractionGroups::new(GEOMETRY_GROUP, ACTIVE_GROUP | GHOST_GROUP)
}

/// Tunables for the rapier world
#[derive(Debug, Clone, Copy)]
pub struct RapierSettings {
    pub pixels_per_meter: f32,
    /// Velocity damping standing in for air friction
    pub linear_damping: f32,
}

impl Default for RapierSettings {
    fn default() -> Self {
        Self {
            pixels_per_meter: 50.0,
            linear_damping: 2.0,
        }
    }
}

/// Collects collision-begin events raised during a step
#[derive(Default)]
struct CollisionCollector {
    started: Mutex<Vec<(u128, u128)>>,
}

impl EventHandler for CollisionCollector {
    fn handle_collision_event(
        &self,
        _bodies: &RigidBodySet,
        colliders: &ColliderSet,
        event: CollisionEvent,
        _contact_pair: Option<&ContactPair>,
    ) {
        if !event.started() {
            return;
        }
        let a = colliders.get(event.collider1()).map(|c| c.user_data);
        let b = colliders.get(event.collider2()).map(|c| c.user_data);
        if let (Some(a), Some(b)) = (a, b) {
            self.started.lock().push((a, b));
        }
    }

    fn handle_contact_force_event(
        &self,
        _dt: Real,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        _contact_pair: &ContactPair,
        _total_force_magnitude: Real,
    ) {
    }
}

#[derive(Debug, Clone, Copy)]
struct BodyEntry {
    rigid: RigidBodyHandle,
    collider: ColliderHandle,
    kind: BodyKind,
}

/// rapier2d world with the handles it has handed out
pub struct RapierWorld {
    settings: RapierSettings,
    gravity: Vector<Real>,
    params: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    collector: CollisionCollector,
    entries: HashMap<BodyHandle, BodyEntry>,
    next_handle: u64,
}

impl RapierWorld {
    pub fn new(settings: RapierSettings) -> Result<Self, PhysicsError> {
        if !(settings.pixels_per_meter > 0.0 && settings.pixels_per_meter.is_finite()) {
            return Err(PhysicsError::InvalidParameter {
                name: "pixels_per_meter",
                value: settings.pixels_per_meter,
            });
        }
        if !(settings.linear_damping >= 0.0 && settings.linear_damping.is_finite()) {
            return Err(PhysicsError::InvalidParameter {
                name: "linear_damping",
                value: settings.linear_damping,
            });
        }

        Ok(Self {
            settings,
            gravity: Vector::new(0.0, 0.0),
            params: IntegrationParameters::default(),
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            collector: CollisionCollector::default(),
            entries: HashMap::new(),
            next_handle: 1,
        })
    }

    fn to_meters(&self, value: f32) -> Real {
        value / self.settings.pixels_per_meter
    }

    fn to_pixels(&self, value: Real) -> f32 {
        value * self.settings.pixels_per_meter
    }

    #[cfg(test)]
    pub fn body_count(&self) -> usize {
        self.entries.len()
    }
}

impl PhysicsBackend for RapierWorld {
    fn create_body(&mut self, desc: BodyDesc) -> BodyHandle {
        let handle = BodyHandle(self.next_handle);
        self.next_handle += 1;

        let translation = Vector::new(
            self.to_meters(desc.position.x),
            self.to_meters(desc.position.y),
        );
        let rigid_body = match desc.kind {
            BodyKind::Dynamic => RigidBodyBuilder::dynamic()
                .linear_damping(self.settings.linear_damping)
                .ccd_enabled(true),
            BodyKind::Static => RigidBodyBuilder::fixed(),
        }
        .translation(translation)
        .rotation(desc.rotation)
        .build();

        let collider = match desc.shape {
            Shape::Circle { radius } => ColliderBuilder::ball(self.to_meters(radius)),
            Shape::Rectangle { width, height } => {
                ColliderBuilder::cuboid(self.to_meters(width / 2.0), self.to_meters(height / 2.0))
            }
        }
        .friction(0.0)
        .restitution(0.0)
        .user_data(handle.0 as u128);

        let collider = match desc.kind {
            BodyKind::Dynamic => collider
                .mass(AVATAR_MASS)
                .collision_groups(active_groups())
                .active_events(ActiveEvents::COLLISION_EVENTS),
            BodyKind::Static => collider.collision_groups(geometry_groups()),
        }
        .build();

        let rigid = self.bodies.insert(rigid_body);
        let collider = self
            .colliders
            .insert_with_parent(collider, rigid, &mut self.bodies);

        self.entries.insert(
            handle,
            BodyEntry {
                rigid,
                collider,
                kind: desc.kind,
            },
        );
        handle
    }

    fn remove_body(&mut self, handle: BodyHandle) {
        let Some(entry) = self.entries.remove(&handle) else {
            return;
        };
        self.bodies.remove(
            entry.rigid,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
        debug!(body = handle.0, "Body removed");
    }

    fn apply_force(&mut self, handle: BodyHandle, force: Vec2) {
        if !force.is_finite() {
            return;
        }
        let Some(entry) = self.entries.get(&handle) else {
            return;
        };
        let force = Vector::new(self.to_meters(force.x), self.to_meters(force.y));
        if let Some(body) = self.bodies.get_mut(entry.rigid) {
            body.reset_forces(false);
            body.add_force(force, true);
        }
    }

    fn pose(&self, handle: BodyHandle) -> Option<Pose> {
        let entry = self.entries.get(&handle)?;
        let body = self.bodies.get(entry.rigid)?;
        let translation = body.translation();
        let velocity = body.linvel();
        Some(Pose {
            position: Vec2::new(self.to_pixels(translation.x), self.to_pixels(translation.y)),
            velocity: Vec2::new(self.to_pixels(velocity.x), self.to_pixels(velocity.y)),
            rotation: body.rotation().angle(),
        })
    }

    fn set_ghost(&mut self, handle: BodyHandle, ghost: bool) {
        let Some(entry) = self.entries.get(&handle) else {
            return;
        };
        if entry.kind == BodyKind::Static {
            return;
        }
        if let Some(collider) = self.colliders.get_mut(entry.collider) {
            collider.set_collision_groups(if ghost { ghost_groups() } else { active_groups() });
        }
    }

    fn step(&mut self, dt: f32) -> Vec<CollisionPair> {
        self.params.dt = dt;
        self.pipeline.step(
            &self.gravity,
            &self.params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            None,
            &(),
            &self.collector,
        );

        // Forces only last for the step they were applied to
        for entry in self.entries.values() {
            if entry.kind == BodyKind::Dynamic {
                if let Some(body) = self.bodies.get_mut(entry.rigid) {
                    body.reset_forces(false);
                }
            }
        }

        self.collector
            .started
            .lock()
            .drain(..)
            .map(|(a, b)| CollisionPair(BodyHandle(a as u64), BodyHandle(b as u64)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::map::Map;

    const DT: f32 = 1.0 / 60.0;

    fn world() -> RapierWorld {
        RapierWorld::new(RapierSettings::default()).unwrap()
    }

    fn involves(pairs: &[CollisionPair], a: BodyHandle, b: BodyHandle) -> bool {
        pairs
            .iter()
            .any(|p| (p.0 == a && p.1 == b) || (p.0 == b && p.1 == a))
    }

    #[test]
    fn test_rejects_bad_settings() {
        let settings = RapierSettings {
            pixels_per_meter: 0.0,
            ..RapierSettings::default()
        };
        assert!(RapierWorld::new(settings).is_err());
    }

    #[test]
    fn test_pose_reads_back_in_pixels() {
        let mut world = world();
        let body = world.create_body(BodyDesc::avatar(Vec2::new(100.0, 200.0), 75.0));
        let pose = world.pose(body).unwrap();
        assert!((pose.position.x - 100.0).abs() < 1e-3);
        assert!((pose.position.y - 200.0).abs() < 1e-3);
    }

    #[test]
    fn test_force_moves_body() {
        let mut world = world();
        let body = world.create_body(BodyDesc::avatar(Vec2::new(500.0, 500.0), 20.0));
        for _ in 0..10 {
            world.apply_force(body, Vec2::new(3000.0, 0.0));
            world.step(DT);
        }
        let pose = world.pose(body).unwrap();
        assert!(pose.position.x > 500.0);
        assert!((pose.position.y - 500.0).abs() < 1e-2);
    }

    #[test]
    fn test_reports_collision_begin() {
        let mut world = world();
        let a = world.create_body(BodyDesc::avatar(Vec2::new(100.0, 100.0), 75.0));
        let b = world.create_body(BodyDesc::avatar(Vec2::new(180.0, 100.0), 75.0));
        let pairs = world.step(DT);
        assert!(involves(&pairs, a, b));
    }

    /// Push `a` right and `b` left until they report a collision-begin
    fn drive_together(world: &mut RapierWorld, a: BodyHandle, b: BodyHandle) -> bool {
        for _ in 0..600 {
            world.apply_force(a, Vec2::new(3000.0, 0.0));
            world.apply_force(b, Vec2::new(-3000.0, 0.0));
            if involves(&world.step(DT), a, b) {
                return true;
            }
        }
        false
    }

    #[test]
    fn test_persisting_contact_is_not_reported_again() {
        let mut world = world();
        let a = world.create_body(BodyDesc::avatar(Vec2::new(100.0, 100.0), 75.0));
        let b = world.create_body(BodyDesc::avatar(Vec2::new(180.0, 100.0), 75.0));
        assert!(involves(&world.step(DT), a, b));

        // Still pressed together, so no new begin events
        for _ in 0..10 {
            world.apply_force(a, Vec2::new(3000.0, 0.0));
            world.apply_force(b, Vec2::new(-3000.0, 0.0));
            assert!(!involves(&world.step(DT), a, b));
        }
    }

    #[test]
    fn test_retouch_after_separation_is_reported() {
        let mut world = world();
        let a = world.create_body(BodyDesc::avatar(Vec2::new(100.0, 500.0), 50.0));
        let b = world.create_body(BodyDesc::avatar(Vec2::new(1300.0, 500.0), 50.0));
        assert!(drive_together(&mut world, a, b));

        for _ in 0..90 {
            world.apply_force(a, Vec2::new(-3000.0, 0.0));
            world.apply_force(b, Vec2::new(3000.0, 0.0));
            assert!(!involves(&world.step(DT), a, b));
        }
        let gap = world.pose(b).unwrap().position.x - world.pose(a).unwrap().position.x;
        assert!(gap > 200.0, "bodies did not separate: {gap}");

        assert!(drive_together(&mut world, a, b));
    }

    #[test]
    fn test_pose_reports_velocity_in_pixels() {
        let mut world = world();
        let body = world.create_body(BodyDesc::avatar(Vec2::new(500.0, 500.0), 20.0));
        assert_eq!(world.pose(body).unwrap().velocity, Vec2::ZERO);
        for _ in 0..10 {
            world.apply_force(body, Vec2::new(0.0, 3000.0));
            world.step(DT);
        }
        let velocity = world.pose(body).unwrap().velocity;
        assert!(velocity.y > 0.0);
        assert!(velocity.x.abs() < 1e-3);
    }

    #[test]
    fn test_ghost_bodies_pass_through_active_bodies() {
        let mut world = world();
        let a = world.create_body(BodyDesc::avatar(Vec2::new(100.0, 100.0), 75.0));
        let b = world.create_body(BodyDesc::avatar(Vec2::new(180.0, 100.0), 75.0));
        world.set_ghost(a, true);
        let pairs = world.step(DT);
        assert!(!involves(&pairs, a, b));
    }

    #[test]
    fn test_geometry_collides_with_avatars() {
        let mut world = world();
        let map = Map::empty(1000.0, 500.0, 20.0).unwrap();
        let walls = world.load_static_geometry(map.objects());
        assert_eq!(walls.len(), 4);

        // Overlaps the left wall
        let avatar = world.create_body(BodyDesc::avatar(Vec2::new(30.0, 250.0), 25.0));
        let pairs = world.step(DT);
        assert!(involves(&pairs, avatar, walls[2]));
    }

    #[test]
    fn test_remove_body() {
        let mut world = world();
        let body = world.create_body(BodyDesc::avatar(Vec2::new(100.0, 100.0), 10.0));
        assert_eq!(world.body_count(), 1);
        world.remove_body(body);
        world.remove_body(body);
        assert_eq!(world.body_count(), 0);
        assert!(world.pose(body).is_none());
        world.step(DT);
    }
}
