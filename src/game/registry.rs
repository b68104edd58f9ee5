//! Player registry owned by the game session

use std::collections::HashMap;

use uuid::Uuid;

use super::physics::BodyHandle;
use super::player::Player;

/// Connection id → player
#[derive(Debug, Default)]
pub struct PlayerRegistry {
    players: HashMap<Uuid, Player>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a player, replacing any previous entry with the same id
    pub fn insert(&mut self, player: Player) -> Option<Player> {
        self.players.insert(player.id, player)
    }

    pub fn remove(&mut self, id: &Uuid) -> Option<Player> {
        self.players.remove(id)
    }

    pub fn get(&self, id: &Uuid) -> Option<&Player> {
        self.players.get(id)
    }

    pub fn get_mut(&mut self, id: &Uuid) -> Option<&mut Player> {
        self.players.get_mut(id)
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.players.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Player> {
        self.players.values_mut()
    }

    pub fn find_by_body(&self, body: BodyHandle) -> Option<&Player> {
        self.players.values().find(|p| p.body == body)
    }

    pub fn tagger(&self) -> Option<&Player> {
        self.players.values().find(|p| p.is_tagger())
    }

    pub fn non_eliminated_count(&self) -> usize {
        self.players.values().filter(|p| !p.is_eliminated()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn player(body: u64) -> Player {
        Player::new(
            Uuid::new_v4(),
            BodyHandle(body),
            "000000".into(),
            Duration::from_secs(1),
        )
    }

    #[test]
    fn test_insert_get_remove() {
        let mut registry = PlayerRegistry::new();
        let p = player(1);
        let id = p.id;
        assert!(registry.insert(p).is_none());
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&id));
        assert_eq!(registry.get(&id).map(|p| p.body), Some(BodyHandle(1)));

        assert!(registry.remove(&id).is_some());
        assert!(registry.remove(&id).is_none());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_find_by_body_and_tagger() {
        let mut registry = PlayerRegistry::new();
        let a = player(1);
        let b = player(2);
        let b_id = b.id;
        registry.insert(a);
        registry.insert(b);

        assert_eq!(registry.find_by_body(BodyHandle(2)).map(|p| p.id), Some(b_id));
        assert!(registry.find_by_body(BodyHandle(9)).is_none());
        assert!(registry.tagger().is_none());

        registry.get_mut(&b_id).unwrap().set_tagger(true, Instant::now());
        assert_eq!(registry.tagger().map(|p| p.id), Some(b_id));

        registry.get_mut(&b_id).unwrap().eliminate();
        assert_eq!(registry.non_eliminated_count(), 1);
    }
}
