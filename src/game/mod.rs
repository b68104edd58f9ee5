//! Game simulation modules

pub mod arena;
pub mod map;
pub mod physics;
pub mod player;
pub mod rapier;
pub mod registry;
pub mod session;
pub mod snapshot;
pub mod timer;

pub use arena::{Arena, GameCommand};
