//! Snapshot building for network transmission

use std::time::Instant;

use crate::ws::protocol::ServerMsg;

use super::physics::PhysicsBackend;
use super::session::GameSession;

/// Decides when to broadcast and builds the broadcast batch
pub struct SnapshotBuilder {
    /// Tick counter since last snapshot
    ticks_since_snapshot: u32,
    /// Snapshot interval in ticks
    snapshot_interval: u32,
}

impl SnapshotBuilder {
    pub fn new(snapshot_interval: u32) -> Self {
        Self {
            ticks_since_snapshot: 0,
            snapshot_interval: snapshot_interval.max(1),
        }
    }

    /// Check if it's time to send a snapshot
    pub fn should_send(&mut self) -> bool {
        self.ticks_since_snapshot += 1;
        if self.ticks_since_snapshot >= self.snapshot_interval {
            self.ticks_since_snapshot = 0;
            true
        } else {
            false
        }
    }

    /// Force snapshot on next check (used for important events)
    pub fn force_next(&mut self) {
        self.ticks_since_snapshot = self.snapshot_interval;
    }

    /// One `update` per player followed by the session `state`
    pub fn build<P: PhysicsBackend>(
        &self,
        session: &GameSession,
        physics: &P,
        now: Instant,
    ) -> Vec<ServerMsg> {
        let mut batch: Vec<ServerMsg> = session
            .players()
            .iter()
            .map(|p| {
                let pose = physics.pose(p.body).unwrap_or_default();
                ServerMsg::Update(p.snapshot(pose, now))
            })
            .collect();
        batch.push(ServerMsg::State(session.snapshot()));
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_and_force() {
        let mut builder = SnapshotBuilder::new(3);
        assert!(!builder.should_send());
        assert!(!builder.should_send());
        assert!(builder.should_send());
        assert!(!builder.should_send());

        builder.force_next();
        assert!(builder.should_send());
    }

    #[test]
    fn test_zero_interval_sends_every_tick() {
        let mut builder = SnapshotBuilder::new(0);
        assert!(builder.should_send());
        assert!(builder.should_send());
    }
}
