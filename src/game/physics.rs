//! Physics boundary
//!
//! Game logic only talks to a physics engine through [`PhysicsBackend`]: create and
//! remove bodies, push forces, read poses, and collect collision-begin pairs from a
//! fixed step. Everything else about the solver stays inside the backend.

use serde::Serialize;

use crate::util::vec2::Vec2;

use super::map::MapObject;

/// Opaque handle to a body owned by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// Moved by forces and collisions
    Dynamic,
    /// Immovable geometry
    Static,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Circle { radius: f32 },
    /// Full width and height
    Rectangle { width: f32, height: f32 },
}

/// Everything needed to create a body
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyDesc {
    pub kind: BodyKind,
    pub position: Vec2,
    pub rotation: f32,
    pub shape: Shape,
}

impl BodyDesc {
    pub fn avatar(position: Vec2, radius: f32) -> Self {
        Self {
            kind: BodyKind::Dynamic,
            position,
            rotation: 0.0,
            shape: Shape::Circle { radius },
        }
    }

    pub fn geometry(object: &MapObject) -> Self {
        match object {
            MapObject::Rectangle(rect) => Self {
                kind: BodyKind::Static,
                position: rect.position,
                rotation: rect.rotation,
                shape: Shape::Rectangle {
                    width: rect.size.x,
                    height: rect.size.y,
                },
            },
        }
    }
}

/// Position and rotation readout
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Pose {
    pub position: Vec2,
    pub velocity: Vec2,
    pub rotation: f32,
}

/// Two bodies that started touching during a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CollisionPair(pub BodyHandle, pub BodyHandle);

/// Physics backend parameter errors
#[derive(Debug, thiserror::Error)]
pub enum PhysicsError {
    #[error("Invalid physics parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: f32 },
}

/// Minimal capability set the simulation needs from a physics engine
pub trait PhysicsBackend: Send {
    fn create_body(&mut self, desc: BodyDesc) -> BodyHandle;

    /// Unknown handles are ignored
    fn remove_body(&mut self, handle: BodyHandle);

    /// Force applied during the next step only
    fn apply_force(&mut self, handle: BodyHandle, force: Vec2);

    fn pose(&self, handle: BodyHandle) -> Option<Pose>;

    /// Ghost bodies pass through non-ghost dynamic bodies but still hit static geometry
    fn set_ghost(&mut self, handle: BodyHandle, ghost: bool);

    /// Advance by exactly `dt` seconds, returning the collision-begin pairs of this step
    fn step(&mut self, dt: f32) -> Vec<CollisionPair>;

    fn load_static_geometry(&mut self, objects: &[MapObject]) -> Vec<BodyHandle> {
        objects
            .iter()
            .map(|object| self.create_body(BodyDesc::geometry(object)))
            .collect()
    }
}
