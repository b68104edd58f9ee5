//! Per-connection player entity

use std::time::{Duration, Instant};

use rand::Rng;
use uuid::Uuid;

use crate::util::vec2::Vec2;
use crate::ws::protocol::{MoveInput, PlayerSnapshot};

use super::physics::{BodyHandle, Pose};
use super::timer::Countdown;

/// Discrete direction key codes sent by clients
pub mod keys {
    pub const UP: u8 = 0;
    pub const DOWN: u8 = 1;
    pub const LEFT: u8 = 2;
    pub const RIGHT: u8 = 3;
}

/// Authoritative player state
#[derive(Debug, Clone)]
pub struct Player {
    pub id: Uuid,
    /// Exclusively owned; removed from the physics world when the player leaves
    pub body: BodyHandle,
    /// Pending force, overwritten by the latest input
    pub force: Vec2,
    pub name: String,
    pub color: String,
    tagger: bool,
    eliminated: bool,
    tag_cooldown: Countdown,
}

impl Player {
    pub fn new(id: Uuid, body: BodyHandle, color: String, tag_cooldown: Duration) -> Self {
        Self {
            id,
            body,
            force: Vec2::ZERO,
            name: default_name(id),
            color,
            tagger: false,
            eliminated: false,
            tag_cooldown: Countdown::new(tag_cooldown, ()),
        }
    }

    pub fn is_tagger(&self) -> bool {
        self.tagger
    }

    pub fn is_eliminated(&self) -> bool {
        self.eliminated
    }

    /// Make or unmake the tagger. Becoming tagger re-arms the tag cooldown.
    /// Returns false (and changes nothing) when an eliminated player would become tagger.
    pub fn set_tagger(&mut self, tagger: bool, now: Instant) -> bool {
        if tagger && self.eliminated {
            return false;
        }
        self.tagger = tagger;
        if tagger {
            self.tag_cooldown.start(now);
        }
        true
    }

    /// Knock the player out of the current round
    pub fn eliminate(&mut self) {
        self.tagger = false;
        self.eliminated = true;
    }

    /// Round bookkeeping reset
    pub fn clear_round_flags(&mut self) {
        self.tagger = false;
        self.eliminated = false;
        self.tag_cooldown.reset();
    }

    /// Whether the tag cooldown has run out
    pub fn can_tag(&self, now: Instant) -> bool {
        self.tag_cooldown.remaining(now).is_zero()
    }

    /// Fraction of the tag cooldown already served, 0 when not tagger
    pub fn tag_progress(&self, now: Instant) -> f32 {
        if !self.tagger {
            return 0.0;
        }
        let total = self.tag_cooldown.total().as_secs_f32();
        if total <= 0.0 {
            return 1.0;
        }
        self.tag_cooldown.elapsed(now).as_secs_f32() / total
    }

    /// Normalize client input and store it as the pending force
    pub fn apply_input(&mut self, input: &MoveInput, speed: f32) {
        let direction = match input {
            MoveInput::Keys(pressed) => pressed.iter().fold(Vec2::ZERO, |acc, key| match *key {
                keys::UP => acc + Vec2::UP,
                keys::DOWN => acc + Vec2::DOWN,
                keys::LEFT => acc + Vec2::LEFT,
                keys::RIGHT => acc + Vec2::RIGHT,
                _ => acc,
            }),
            MoveInput::Vector { x, y } => Vec2::new(*x, *y),
        };
        self.force = direction.normalize() * speed;
    }

    pub fn snapshot(&self, pose: Pose, now: Instant) -> PlayerSnapshot {
        PlayerSnapshot {
            id: self.id,
            name: self.name.clone(),
            color: self.color.clone(),
            position: pose.position,
            velocity: pose.velocity,
            rotation: pose.rotation,
            tagger: self.tagger,
            eliminated: self.eliminated,
            tag_alpha: self.tag_progress(now),
        }
    }
}

pub fn default_name(id: Uuid) -> String {
    format!("Player_{}", &id.to_string()[..8])
}

/// Random 24-bit color as six hex digits
pub fn random_color<R: Rng>(rng: &mut R) -> String {
    format!("{:06x}", rng.gen_range(0..0x100_0000u32))
}
