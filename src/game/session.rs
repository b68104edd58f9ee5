//! Round state machine: lobby → active → end → lobby
//!
//! The session owns the player registry and the three round timers. Timers are polled
//! from [`GameSession::update`], and every state change goes through
//! [`GameSession::transition`], so all mutation happens on the tick loop in tick order.

use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::ws::protocol::SessionSnapshot;

use super::player::Player;
use super::registry::PlayerRegistry;
use super::timer::{seconds_left, Countdown};

/// Round-level phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Waiting for enough players
    Lobby,
    /// Round in progress
    Active,
    /// Round resolved, showing the result
    End,
}

/// What caused a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    StartTimerExpired,
    EliminationTimerExpired,
    EndTimerExpired,
    /// Fewer than two non-eliminated players left mid-round
    NotEnoughPlayers,
}

/// Outcomes the tick loop mirrors into physics, logs and broadcasts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    RoundStarted { tagger: Uuid },
    /// Tag passed by collision
    TagTransferred { from: Uuid, to: Uuid },
    /// Tag handed out by the session after an elimination or a departure
    TaggerAssigned { player: Uuid },
    Eliminated { player: Uuid },
    RoundEnded { winner: Option<Uuid> },
    ReturnedToLobby,
}

/// Round timing and thresholds
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub min_players: usize,
    pub start_delay: Duration,
    pub elimination_interval: Duration,
    pub end_delay: Duration,
    pub tag_cooldown: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            min_players: 2,
            start_delay: Duration::from_secs(5),
            elimination_interval: Duration::from_secs(10),
            end_delay: Duration::from_secs(5),
            tag_cooldown: Duration::from_secs(1),
        }
    }
}

/// Process-lifetime game session
pub struct GameSession {
    state: SessionState,
    message: String,
    winner: Option<Uuid>,
    players: PlayerRegistry,
    settings: SessionSettings,
    start_timer: Countdown<Trigger>,
    elimination_timer: Countdown<Trigger>,
    end_timer: Countdown<Trigger>,
    rng: ChaCha8Rng,
}

impl GameSession {
    pub fn new(settings: SessionSettings, seed: u64) -> Self {
        Self {
            state: SessionState::Lobby,
            message: "Waiting for players to join...".to_string(),
            winner: None,
            players: PlayerRegistry::new(),
            start_timer: Countdown::new(settings.start_delay, Trigger::StartTimerExpired),
            elimination_timer: Countdown::new(
                settings.elimination_interval,
                Trigger::EliminationTimerExpired,
            ),
            end_timer: Countdown::new(settings.end_delay, Trigger::EndTimerExpired),
            settings,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    #[cfg(test)]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[cfg(test)]
    pub fn winner(&self) -> Option<Uuid> {
        self.winner
    }

    pub fn players(&self) -> &PlayerRegistry {
        &self.players
    }

    pub fn player_mut(&mut self, id: &Uuid) -> Option<&mut Player> {
        self.players.get_mut(id)
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    #[cfg(test)]
    pub fn elimination_remaining(&self, now: Instant) -> Duration {
        self.elimination_timer.remaining(now)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            message: self.message.clone(),
            winner: self.winner,
        }
    }

    /// Register a newly connected player
    pub fn add_player(&mut self, player: Player, now: Instant) {
        let id = player.id;
        self.players.insert(player);
        info!(player_id = %id, players = self.players.len(), "Player added to session");

        if self.state == SessionState::Lobby
            && self.players.len() >= self.settings.min_players
            && !self.start_timer.is_running()
        {
            self.start_timer.start(now);
            info!(delay_ms = self.settings.start_delay.as_millis() as u64, "Start countdown armed");
        }
        self.refresh_message(now);
    }

    /// Drop a departing player. Returns the player (so the caller can free its body)
    /// and any round events the departure caused.
    pub fn remove_player(&mut self, id: &Uuid, now: Instant) -> (Option<Player>, Vec<SessionEvent>) {
        let Some(player) = self.players.remove(id) else {
            return (None, Vec::new());
        };
        info!(player_id = %id, players = self.players.len(), "Player removed from session");

        let mut events = Vec::new();
        match self.state {
            SessionState::Lobby => {
                if self.players.len() < self.settings.min_players {
                    self.start_timer.stop(now);
                }
            }
            SessionState::Active => {
                if self.players.non_eliminated_count() < 2 {
                    events.extend(self.transition(Trigger::NotEnoughPlayers, now));
                } else if player.is_tagger() {
                    if let Some(next) = self.select_tagger(now) {
                        events.push(SessionEvent::TaggerAssigned { player: next });
                    }
                }
            }
            SessionState::End => {}
        }
        self.refresh_message(now);

        (Some(player), events)
    }

    /// Apply the tag-transfer rule to two bodies that started touching
    pub fn handle_contact(&mut self, a: Uuid, b: Uuid, now: Instant) -> Option<SessionEvent> {
        if self.state != SessionState::Active || a == b {
            return None;
        }
        let first = self.players.get(&a)?;
        let second = self.players.get(&b)?;
        if first.is_eliminated() || second.is_eliminated() {
            return None;
        }

        let (from, to) = match (first.is_tagger(), second.is_tagger()) {
            (true, false) => (first, second),
            (false, true) => (second, first),
            _ => return None,
        };
        if !from.can_tag(now) {
            return None;
        }
        let (from, to) = (from.id, to.id);

        // The elimination timer keeps running across transfers
        self.players.get_mut(&from)?.set_tagger(false, now);
        self.players.get_mut(&to)?.set_tagger(true, now);
        info!(from = %from, to = %to, "Tag transferred");

        Some(SessionEvent::TagTransferred { from, to })
    }

    /// Poll round timers, run any transitions they trigger, refresh the status message
    pub fn update(&mut self, now: Instant) -> Vec<SessionEvent> {
        let mut events = Vec::new();

        if let Some(trigger) = self.start_timer.poll(now) {
            events.extend(self.transition(trigger, now));
        }
        if let Some(trigger) = self.elimination_timer.poll(now) {
            events.extend(self.transition(trigger, now));
        }
        if let Some(trigger) = self.end_timer.poll(now) {
            events.extend(self.transition(trigger, now));
        }

        self.refresh_message(now);
        events
    }

    /// The single place where `state` changes
    fn transition(&mut self, trigger: Trigger, now: Instant) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        let previous = self.state;

        let next = match (previous, trigger) {
            (SessionState::Lobby, Trigger::StartTimerExpired)
                if self.players.len() >= self.settings.min_players =>
            {
                self.begin_round(now, &mut events)
            }
            (SessionState::Active, Trigger::EliminationTimerExpired) => {
                self.eliminate_tagger(now, &mut events)
            }
            (SessionState::Active, Trigger::NotEnoughPlayers) => {
                self.end_round(None, now, &mut events)
            }
            (SessionState::End, Trigger::EndTimerExpired) => self.return_to_lobby(now, &mut events),
            (state, trigger) => {
                debug!(?state, ?trigger, "Trigger ignored");
                state
            }
        };

        if next != previous {
            info!(from = ?previous, to = ?next, "Session state changed");
        }
        self.state = next;
        events
    }

    fn begin_round(&mut self, now: Instant, events: &mut Vec<SessionEvent>) -> SessionState {
        self.message.clear();
        for player in self.players.iter_mut() {
            player.clear_round_flags();
        }

        let Some(tagger) = self.select_tagger(now) else {
            return SessionState::Lobby;
        };
        self.elimination_timer.start(now);
        events.push(SessionEvent::RoundStarted { tagger });
        info!(tagger = %tagger, players = self.players.len(), "Round started");

        SessionState::Active
    }

    fn eliminate_tagger(&mut self, now: Instant, events: &mut Vec<SessionEvent>) -> SessionState {
        let Some(tagger) = self.players.tagger().map(|p| p.id) else {
            debug!("Elimination fired without a tagger");
            return self.end_round(None, now, events);
        };

        if let Some(player) = self.players.get_mut(&tagger) {
            player.eliminate();
        }
        events.push(SessionEvent::Eliminated { player: tagger });
        info!(player_id = %tagger, "Tagger eliminated");

        let survivors: Vec<Uuid> = self
            .players
            .iter()
            .filter(|p| !p.is_eliminated())
            .map(|p| p.id)
            .collect();
        if let [winner] = survivors.as_slice() {
            return self.end_round(Some(*winner), now, events);
        }

        match self.select_tagger(now) {
            Some(next) => {
                events.push(SessionEvent::TaggerAssigned { player: next });
                self.elimination_timer.start(now);
                SessionState::Active
            }
            None => self.end_round(None, now, events),
        }
    }

    fn end_round(
        &mut self,
        winner: Option<Uuid>,
        now: Instant,
        events: &mut Vec<SessionEvent>,
    ) -> SessionState {
        self.elimination_timer.stop(now);
        for player in self.players.iter_mut() {
            player.clear_round_flags();
        }
        self.winner = winner;
        self.message = "Game over!".to_string();
        self.end_timer.start(now);

        events.push(SessionEvent::RoundEnded { winner });
        match winner {
            Some(id) => info!(winner = %id, "Round ended"),
            None => info!("Round ended without a winner"),
        }

        SessionState::End
    }

    fn return_to_lobby(&mut self, now: Instant, events: &mut Vec<SessionEvent>) -> SessionState {
        self.winner = None;
        if self.players.len() >= self.settings.min_players {
            self.start_timer.start(now);
        } else {
            self.start_timer.reset();
        }
        events.push(SessionEvent::ReturnedToLobby);

        SessionState::Lobby
    }

    /// Hand the tag to a uniformly random non-eliminated, non-tagger player
    fn select_tagger(&mut self, now: Instant) -> Option<Uuid> {
        let mut eligible: Vec<Uuid> = self
            .players
            .iter()
            .filter(|p| !p.is_eliminated() && !p.is_tagger())
            .map(|p| p.id)
            .collect();
        // Map order is arbitrary; sort so a seeded rng picks reproducibly
        eligible.sort_unstable();

        let chosen = *eligible.choose(&mut self.rng)?;
        self.players.get_mut(&chosen)?.set_tagger(true, now);
        Some(chosen)
    }

    fn refresh_message(&mut self, now: Instant) {
        match self.state {
            SessionState::Lobby => {
                let count = self.players.len();
                self.message = if count < self.settings.min_players {
                    format!(
                        "Waiting for {} player(s) to join...",
                        self.settings.min_players - count
                    )
                } else {
                    format!(
                        "Game starting in {} seconds",
                        seconds_left(self.start_timer.remaining(now))
                    )
                };
            }
            SessionState::Active => {
                self.message = format!(
                    "Next elimination in {} seconds",
                    seconds_left(self.elimination_timer.remaining(now))
                );
            }
            SessionState::End => {}
        }
    }
}
