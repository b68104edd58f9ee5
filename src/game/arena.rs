//! Authoritative tick loop
//!
//! One task owns the session and the physics world. Connections reach it only through
//! the command channel, which is drained at the top of every tick, so a physics step
//! never overlaps a state mutation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::util::vec2::Vec2;
use crate::ws::protocol::{ArenaConfig, ChatLine, MoveInput, PlayerSnapshot, ServerMsg};

use super::map::Map;
use super::physics::{BodyDesc, CollisionPair, PhysicsBackend};
use super::player::{random_color, Player};
use super::session::{GameSession, SessionEvent, SessionSettings, SessionState};
use super::snapshot::SnapshotBuilder;

const COMMAND_BUFFER: usize = 1024;
const BROADCAST_BUFFER: usize = 256;

/// Requests from connection tasks to the tick loop
#[derive(Debug)]
pub enum GameCommand {
    /// New connection; the welcome bundle goes to `outbound`
    Connect {
        id: Uuid,
        outbound: mpsc::UnboundedSender<ServerMsg>,
    },
    Input {
        id: Uuid,
        input: MoveInput,
    },
    Chat {
        id: Uuid,
        message: String,
    },
    Rename {
        id: Uuid,
        name: String,
    },
    Disconnect {
        id: Uuid,
    },
}

/// Loop-wide tunables
#[derive(Debug, Clone)]
pub struct ArenaSettings {
    pub tick_rate: u32,
    pub snapshot_rate: u32,
    pub player_radius: f32,
    pub player_speed: f32,
}

/// Read-only view of the loop for the health endpoint
#[derive(Debug, Clone, Copy)]
pub struct ArenaStatus {
    pub players: usize,
    pub state: SessionState,
    pub tick: u64,
}

/// Handle to the running arena
#[derive(Clone)]
pub struct ArenaHandle {
    pub command_tx: mpsc::Sender<GameCommand>,
    pub broadcast_tx: broadcast::Sender<ServerMsg>,
    status: Arc<RwLock<ArenaStatus>>,
}

impl ArenaHandle {
    pub fn status(&self) -> ArenaStatus {
        *self.status.read()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerMsg> {
        self.broadcast_tx.subscribe()
    }
}

/// The authoritative simulation
pub struct Arena<P: PhysicsBackend> {
    session: GameSession,
    physics: P,
    map: Map,
    settings: ArenaSettings,
    dt: f32,
    tick: u64,
    rng: ChaCha8Rng,
    command_rx: mpsc::Receiver<GameCommand>,
    broadcast_tx: broadcast::Sender<ServerMsg>,
    snapshot_builder: SnapshotBuilder,
    status: Arc<RwLock<ArenaStatus>>,
}

impl<P: PhysicsBackend> Arena<P> {
    pub fn new(
        settings: ArenaSettings,
        session_settings: SessionSettings,
        map: Map,
        mut physics: P,
        seed: u64,
    ) -> (Self, ArenaHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_BUFFER);

        let walls = physics.load_static_geometry(map.objects());
        info!(bodies = walls.len(), map = %map.name, "Static geometry loaded");

        let status = Arc::new(RwLock::new(ArenaStatus {
            players: 0,
            state: SessionState::Lobby,
            tick: 0,
        }));

        let handle = ArenaHandle {
            command_tx,
            broadcast_tx: broadcast_tx.clone(),
            status: status.clone(),
        };

        let tick_rate = settings.tick_rate.max(1);
        let arena = Self {
            session: GameSession::new(session_settings, seed),
            physics,
            map,
            dt: 1.0 / tick_rate as f32,
            tick: 0,
            // Derived so spawns and tagger picks don't share a stream
            rng: ChaCha8Rng::seed_from_u64(seed.wrapping_add(1)),
            command_rx,
            broadcast_tx,
            snapshot_builder: SnapshotBuilder::new(tick_rate / settings.snapshot_rate.max(1)),
            status,
            settings,
        };

        (arena, handle)
    }

    /// Run the fixed-rate loop until every command sender is gone
    pub async fn run(mut self) {
        info!(tick_rate = self.settings.tick_rate, "Arena loop started");

        let tick_duration = Duration::from_secs_f32(self.dt);
        let mut tick_interval = interval(tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let now = tick_interval.tick().await.into_std();

            if !self.process_commands(now) {
                info!("Command channel closed, stopping arena loop");
                break;
            }
            self.run_tick(now);
        }
    }

    /// Drain pending commands; false once all senders are dropped
    fn process_commands(&mut self, now: Instant) -> bool {
        loop {
            match self.command_rx.try_recv() {
                Ok(command) => self.handle_command(command, now),
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    fn handle_command(&mut self, command: GameCommand, now: Instant) {
        match command {
            GameCommand::Connect { id, outbound } => self.handle_connect(id, outbound, now),
            GameCommand::Input { id, input } => match self.session.player_mut(&id) {
                Some(player) => player.apply_input(&input, self.settings.player_speed),
                None => debug!(player_id = %id, "Input for unknown player"),
            },
            GameCommand::Chat { id, message } => {
                if self.session.players().contains(&id) {
                    self.broadcast(ServerMsg::Chat(ChatLine { id, message }));
                }
            }
            GameCommand::Rename { id, name } => self.handle_rename(id, name, now),
            GameCommand::Disconnect { id } => self.handle_disconnect(id, now),
        }
    }

    fn handle_connect(&mut self, id: Uuid, outbound: mpsc::UnboundedSender<ServerMsg>, now: Instant) {
        if self.session.players().contains(&id) {
            warn!(player_id = %id, "Duplicate connect ignored");
            return;
        }

        let position = self.spawn_position();
        let body = self
            .physics
            .create_body(BodyDesc::avatar(position, self.settings.player_radius));
        let color = random_color(&mut self.rng);
        let player = Player::new(id, body, color, self.session.settings().tag_cooldown);

        // Welcome bundle for the new connection only
        let mut welcome = vec![
            ServerMsg::Init(id),
            ServerMsg::Config(ArenaConfig {
                tick_rate: self.settings.tick_rate,
                radius: self.settings.player_radius,
                width: self.map.width,
                height: self.map.height,
            }),
            ServerMsg::Map(self.map.serialize_objects()),
        ];
        welcome.extend(
            self.session
                .players()
                .iter()
                .map(|p| ServerMsg::Join(self.player_snapshot(p, now))),
        );
        for msg in welcome {
            if outbound.send(msg).is_err() {
                debug!(player_id = %id, "Connection gone before welcome");
                break;
            }
        }

        let joined = self.player_snapshot(&player, now);
        self.session.add_player(player, now);
        let _ = outbound.send(ServerMsg::State(self.session.snapshot()));

        self.broadcast(ServerMsg::Join(joined));
        self.snapshot_builder.force_next();
        info!(player_id = %id, x = position.x, y = position.y, "Player spawned");
    }

    fn handle_rename(&mut self, id: Uuid, name: String, now: Instant) {
        if name.is_empty() {
            return;
        }
        let Some(player) = self.session.player_mut(&id) else {
            return;
        };
        player.name = name;
        debug!(player_id = %id, name = %player.name, "Player renamed");

        if let Some(player) = self.session.players().get(&id) {
            let snapshot = self.player_snapshot(player, now);
            self.broadcast(ServerMsg::Update(snapshot));
        }
    }

    fn handle_disconnect(&mut self, id: Uuid, now: Instant) {
        let (player, events) = self.session.remove_player(&id, now);
        let Some(player) = player else {
            return;
        };
        self.physics.remove_body(player.body);
        self.broadcast(ServerMsg::Leave(id));
        self.apply_events(&events);
        self.snapshot_builder.force_next();
    }

    /// One simulation step: forces, physics, collisions, timers, broadcast
    fn run_tick(&mut self, now: Instant) {
        self.tick += 1;

        for player in self.session.players().iter() {
            self.physics.apply_force(player.body, player.force);
        }

        let pairs = self.physics.step(self.dt);
        let mut events = Vec::new();
        for CollisionPair(a, b) in pairs {
            let players = self.session.players();
            let (Some(a), Some(b)) = (players.find_by_body(a), players.find_by_body(b)) else {
                continue;
            };
            let (a, b) = (a.id, b.id);
            events.extend(self.session.handle_contact(a, b, now));
        }

        events.extend(self.session.update(now));
        if !events.is_empty() {
            self.apply_events(&events);
            self.snapshot_builder.force_next();
        }

        if self.snapshot_builder.should_send() {
            for msg in self.snapshot_builder.build(&self.session, &self.physics, now) {
                self.broadcast(msg);
            }
        }

        *self.status.write() = ArenaStatus {
            players: self.session.players().len(),
            state: self.session.state(),
            tick: self.tick,
        };
    }

    /// Mirror round events into the physics world
    fn apply_events(&mut self, events: &[SessionEvent]) {
        for event in events {
            match event {
                SessionEvent::Eliminated { player } => {
                    if let Some(p) = self.session.players().get(player) {
                        self.physics.set_ghost(p.body, true);
                    }
                }
                SessionEvent::RoundStarted { .. } | SessionEvent::RoundEnded { .. } => {
                    for p in self.session.players().iter() {
                        self.physics.set_ghost(p.body, false);
                    }
                }
                SessionEvent::TagTransferred { .. }
                | SessionEvent::TaggerAssigned { .. }
                | SessionEvent::ReturnedToLobby => {}
            }
        }
    }

    fn player_snapshot(&self, player: &Player, now: Instant) -> PlayerSnapshot {
        let pose = self.physics.pose(player.body).unwrap_or_default();
        player.snapshot(pose, now)
    }

    /// Uniform point inside the boundary walls
    fn spawn_position(&mut self) -> Vec2 {
        let margin = self.map.wall_width / 2.0 + self.settings.player_radius;
        let axis = |rng: &mut ChaCha8Rng, extent: f32| {
            if extent - margin > margin {
                rng.gen_range(margin..extent - margin)
            } else {
                extent / 2.0
            }
        };
        let x = axis(&mut self.rng, self.map.width);
        let y = axis(&mut self.rng, self.map.height);
        Vec2::new(x, y)
    }

    /// Fire-and-forget fan-out; no receivers is fine
    fn broadcast(&self, msg: ServerMsg) {
        let _ = self.broadcast_tx.send(msg);
    }
}
