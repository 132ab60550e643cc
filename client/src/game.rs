//! Client-side mirror of a room: prediction, reconciliation and interpolation

use log::{debug, warn};
use shared::rumble::RumblePlayer;
use shared::volley::{update_player_physics, VolleyPlayer};
use shared::{GameStatus, RoomKind, RoomSnapshot, RumbleSnapshot, SessionId, Vec2, VolleySnapshot};
use std::collections::HashMap;

/// Fraction of the remaining gap closed per correction or interpolation step.
pub const BLEND_FACTOR: f32 = 0.3;

/// How a snapshot changed the locally predicted entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correction {
    /// No own entity in this snapshot.
    None,
    /// Close enough: eased toward the authoritative value.
    Blended,
    /// Too far off (respawn, round reset, first sighting): replaced outright.
    Snapped,
}

/// Anything else that moves and is drawn from replicated state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyKey {
    Player(SessionId),
    Ball,
}

/// Per-game hooks the reconciler needs.
///
/// The own entity is stepped with the same shared physics the server runs,
/// so in the absence of interactions prediction and authority agree.
pub trait Predictable {
    type Snapshot: Clone;
    type Entity: Clone;
    type Input: Default;

    /// Divergence beyond which the own entity is snapped instead of blended.
    const SNAP_DISTANCE: f32;

    fn own_entity(snapshot: &Self::Snapshot, id: SessionId) -> Option<&Self::Entity>;

    /// Whether the simulation is running, i.e. prediction makes sense.
    fn is_live(snapshot: &Self::Snapshot) -> bool;

    fn position(entity: &Self::Entity) -> Vec2;

    fn velocity(entity: &Self::Entity) -> Vec2;

    fn set_motion(entity: &mut Self::Entity, position: Vec2, velocity: Vec2);

    /// Advances the own entity by `dt` ms using local input.
    fn step(entity: &mut Self::Entity, input: &mut Self::Input, dt: f32);

    /// Authoritative positions of every body except the own entity.
    fn remote_bodies(snapshot: &Self::Snapshot, own: Option<SessionId>) -> Vec<(BodyKey, Vec2)>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Blend {
    position: Vec2,
    target: Vec2,
}

/// Local view of one room for one session
pub struct Reconciler<G: Predictable> {
    session_id: Option<SessionId>,
    snapshot: Option<G::Snapshot>,
    last_tick: u64,
    own: Option<G::Entity>,
    input: G::Input,
    remotes: HashMap<BodyKey, Blend>,
    pub prediction_enabled: bool,
    pub interpolation_enabled: bool,
}

impl<G: Predictable> Reconciler<G> {
    pub fn new(session_id: Option<SessionId>) -> Self {
        Self {
            session_id,
            snapshot: None,
            last_tick: 0,
            own: None,
            input: G::Input::default(),
            remotes: HashMap::new(),
            prediction_enabled: true,
            interpolation_enabled: true,
        }
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    pub fn snapshot(&self) -> Option<&G::Snapshot> {
        self.snapshot.as_ref()
    }

    pub fn last_tick(&self) -> u64 {
        self.last_tick
    }

    /// The own entity as it should be drawn: predicted when prediction is on,
    /// otherwise the last authoritative value.
    pub fn own_entity(&self) -> Option<&G::Entity> {
        self.own.as_ref()
    }

    pub fn input_mut(&mut self) -> &mut G::Input {
        &mut self.input
    }

    pub fn set_input(&mut self, input: G::Input) {
        self.input = input;
    }

    pub fn remote_position(&self, key: BodyKey) -> Option<Vec2> {
        self.remotes.get(&key).map(|b| b.position)
    }

    pub fn remote_positions(&self) -> impl Iterator<Item = (BodyKey, Vec2)> + '_ {
        self.remotes.iter().map(|(key, b)| (*key, b.position))
    }

    /// Folds an authoritative snapshot into the local view.
    ///
    /// Non-motion fields always come straight from the snapshot. Remote
    /// bodies only get a new target; they move toward it in `predict`.
    pub fn apply_snapshot(&mut self, tick: u64, snapshot: G::Snapshot) -> Correction {
        if self.snapshot.is_some() && tick < self.last_tick {
            debug!("Dropping stale snapshot {} (have {})", tick, self.last_tick);
            return Correction::None;
        }

        let bodies = G::remote_bodies(&snapshot, self.session_id);
        self.remotes
            .retain(|key, _| bodies.iter().any(|(other, _)| other == key));
        for (key, target) in bodies {
            let blend = self.remotes.entry(key).or_insert(Blend {
                position: target,
                target,
            });
            blend.target = target;
            if !self.interpolation_enabled {
                blend.position = target;
            }
        }

        let authoritative = self
            .session_id
            .and_then(|id| G::own_entity(&snapshot, id))
            .cloned();

        let correction = match authoritative {
            None => {
                self.own = None;
                Correction::None
            }
            Some(authoritative) => match self.own.as_mut() {
                Some(predicted) if self.prediction_enabled => {
                    reconcile::<G>(predicted, authoritative)
                }
                _ => {
                    self.own = Some(authoritative);
                    Correction::Snapped
                }
            },
        };

        self.snapshot = Some(snapshot);
        self.last_tick = tick;
        correction
    }

    /// Advances local state by one render frame of `dt` ms.
    pub fn predict(&mut self, dt: f32) {
        let live = self.snapshot.as_ref().is_some_and(G::is_live);
        if self.prediction_enabled && live {
            if let Some(own) = self.own.as_mut() {
                G::step(own, &mut self.input, dt);
            }
        }

        for blend in self.remotes.values_mut() {
            blend.position = blend.position.lerp(blend.target, BLEND_FACTOR);
        }
    }
}

fn reconcile<G: Predictable>(predicted: &mut G::Entity, authoritative: G::Entity) -> Correction {
    let predicted_position = G::position(predicted);
    let predicted_velocity = G::velocity(predicted);
    let divergence = predicted_position.distance(G::position(&authoritative));

    if divergence > G::SNAP_DISTANCE {
        debug!("Snapping own entity, divergence {:.1}", divergence);
        *predicted = authoritative;
        return Correction::Snapped;
    }

    let position = predicted_position.lerp(G::position(&authoritative), BLEND_FACTOR);
    let velocity = predicted_velocity.lerp(G::velocity(&authoritative), BLEND_FACTOR);
    *predicted = authoritative;
    G::set_motion(predicted, position, velocity);
    Correction::Blended
}

/// Survival game adapter
pub struct Rumble;

impl Predictable for Rumble {
    type Snapshot = RumbleSnapshot;
    type Entity = RumblePlayer;
    /// Held direction angle in radians.
    type Input = Option<f32>;

    const SNAP_DISTANCE: f32 = 30.0;

    fn own_entity(snapshot: &RumbleSnapshot, id: SessionId) -> Option<&RumblePlayer> {
        snapshot.players.iter().find(|p| p.id == id)
    }

    fn is_live(snapshot: &RumbleSnapshot) -> bool {
        snapshot.state == GameStatus::InGame
    }

    fn position(entity: &RumblePlayer) -> Vec2 {
        entity.position
    }

    fn velocity(entity: &RumblePlayer) -> Vec2 {
        entity.velocity
    }

    fn set_motion(entity: &mut RumblePlayer, position: Vec2, velocity: Vec2) {
        entity.position = position;
        entity.velocity = velocity;
    }

    fn step(entity: &mut RumblePlayer, input: &mut Option<f32>, dt: f32) {
        entity.accel_direction = *input;
        entity.step(dt);
    }

    fn remote_bodies(snapshot: &RumbleSnapshot, own: Option<SessionId>) -> Vec<(BodyKey, Vec2)> {
        snapshot
            .players
            .iter()
            .filter(|p| Some(p.id) != own)
            .map(|p| (BodyKey::Player(p.id), p.position))
            .collect()
    }
}

/// Local volleyball controls. `jump` is consumed by the next predicted step.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VolleyInput {
    pub move_direction: i8,
    pub jump: bool,
}

/// Volleyball adapter. The ball is never predicted, only interpolated.
pub struct Volley;

impl Predictable for Volley {
    type Snapshot = VolleySnapshot;
    type Entity = VolleyPlayer;
    type Input = VolleyInput;

    const SNAP_DISTANCE: f32 = 100.0;

    fn own_entity(snapshot: &VolleySnapshot, id: SessionId) -> Option<&VolleyPlayer> {
        snapshot.players.iter().find(|p| p.id == id)
    }

    fn is_live(snapshot: &VolleySnapshot) -> bool {
        snapshot.state == GameStatus::InGame
    }

    fn position(entity: &VolleyPlayer) -> Vec2 {
        entity.position
    }

    fn velocity(entity: &VolleyPlayer) -> Vec2 {
        entity.velocity
    }

    fn set_motion(entity: &mut VolleyPlayer, position: Vec2, velocity: Vec2) {
        entity.position = position;
        entity.velocity = velocity;
    }

    fn step(entity: &mut VolleyPlayer, input: &mut VolleyInput, dt: f32) {
        update_player_physics(entity, input.move_direction, input.jump, dt);
        input.jump = false;
    }

    fn remote_bodies(snapshot: &VolleySnapshot, own: Option<SessionId>) -> Vec<(BodyKey, Vec2)> {
        snapshot
            .players
            .iter()
            .filter(|p| Some(p.id) != own)
            .map(|p| (BodyKey::Player(p.id), p.position))
            .chain(std::iter::once((BodyKey::Ball, snapshot.ball.position)))
            .collect()
    }
}

/// The joined room's view, whichever game it is
pub enum GameView {
    Rumble(Reconciler<Rumble>),
    SlimeVolley(Reconciler<Volley>),
}

impl GameView {
    pub fn new(kind: RoomKind, session_id: SessionId) -> Self {
        match kind {
            RoomKind::Rumble => GameView::Rumble(Reconciler::new(Some(session_id))),
            RoomKind::SlimeVolley => GameView::SlimeVolley(Reconciler::new(Some(session_id))),
        }
    }

    pub fn kind(&self) -> RoomKind {
        match self {
            GameView::Rumble(_) => RoomKind::Rumble,
            GameView::SlimeVolley(_) => RoomKind::SlimeVolley,
        }
    }

    pub fn apply_snapshot(&mut self, tick: u64, snapshot: RoomSnapshot) -> Correction {
        match (self, snapshot) {
            (GameView::Rumble(view), RoomSnapshot::Rumble(s)) => view.apply_snapshot(tick, s),
            (GameView::SlimeVolley(view), RoomSnapshot::SlimeVolley(s)) => {
                view.apply_snapshot(tick, s)
            }
            (view, _) => {
                warn!("Snapshot for a different game than {}", view.kind());
                Correction::None
            }
        }
    }

    pub fn predict(&mut self, dt: f32) {
        match self {
            GameView::Rumble(view) => view.predict(dt),
            GameView::SlimeVolley(view) => view.predict(dt),
        }
    }

    pub fn status(&self) -> Option<GameStatus> {
        match self {
            GameView::Rumble(view) => view.snapshot().map(|s| s.state),
            GameView::SlimeVolley(view) => view.snapshot().map(|s| s.state),
        }
    }

    pub fn host_id(&self) -> Option<SessionId> {
        match self {
            GameView::Rumble(view) => view.snapshot().and_then(|s| s.host_id),
            GameView::SlimeVolley(view) => view.snapshot().and_then(|s| s.host_id),
        }
    }

    pub fn set_prediction(&mut self, enabled: bool) {
        match self {
            GameView::Rumble(view) => view.prediction_enabled = enabled,
            GameView::SlimeVolley(view) => view.prediction_enabled = enabled,
        }
    }

    pub fn set_interpolation(&mut self, enabled: bool) {
        match self {
            GameView::Rumble(view) => view.interpolation_enabled = enabled,
            GameView::SlimeVolley(view) => view.interpolation_enabled = enabled,
        }
    }

    /// One line per player for the headless client's status output.
    pub fn describe(&self) -> Vec<String> {
        match self {
            GameView::Rumble(view) => view
                .snapshot()
                .map(|s| {
                    s.players
                        .iter()
                        .map(|p| {
                            format!(
                                "{:>4} {:<12} alive={} ready={} charge={:.0}",
                                p.id, p.name, p.is_alive, p.is_ready, p.charge
                            )
                        })
                        .collect()
                })
                .unwrap_or_default(),
            GameView::SlimeVolley(view) => view
                .snapshot()
                .map(|s| {
                    s.players
                        .iter()
                        .map(|p| {
                            format!(
                                "{:>4} {:<8} {:?} ready={} score={}",
                                p.id, p.name, p.side, p.is_ready, p.score
                            )
                        })
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}
