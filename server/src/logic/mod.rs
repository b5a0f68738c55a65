use std::{collections::HashMap, sync::Arc, time::Instant};

use dashmap::DashMap;
use rocket::futures::{SinkExt, future::join_all, stream::SplitSink};
use rocket_ws::{Message, stream::DuplexStream};
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use minefield_common::{
    models::{GameParams, Level, Mode, Pos},
    protocol::{CellUpdate, ServerMessage},
};

use crate::{error::GameError, records::SharedRecords};

pub mod challenge;
pub mod clock;
pub mod field;
pub mod session;
pub mod timer;

use challenge::ChallengeController;
use clock::{Clock, Tick};
use session::{GameSession, Outcome, Step};

pub type SharedGame = Arc<Mutex<Game>>;
pub type Games = Arc<DashMap<String, SharedGame>>;

/// Rejected names a player may submit before a record offer lapses.
pub const MAX_NAME_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Copy)]
struct RecordClaim {
    mode: Mode,
    level: Level,
    score: u64,
    attempts: u32,
}

/// One player's game: the current round, its clock and the connected sockets.
pub struct Game {
    params: GameParams,
    session: GameSession,
    challenge: Option<ChallengeController>,
    clock: Clock,
    timer: Option<JoinHandle<()>>,
    generation: u64,
    claim: Option<RecordClaim>,
    records: SharedRecords,
    streams: HashMap<Uuid, SplitSink<DuplexStream, Message>>,
    last_activity: Instant,
}

fn first_round(
    params: GameParams,
) -> Result<(GameSession, Option<ChallengeController>, Clock), GameError> {
    match params.mode {
        Mode::Classic => {
            let board = params.level.board();
            let session = GameSession::new(board.rows, board.columns, board.mines)?;
            Ok((session, None, Clock::count_up()))
        }
        Mode::Challenge => {
            let controller = ChallengeController::new(params.level);
            let round = controller.parameters();
            let session = GameSession::new(round.rows, round.columns, round.mines)?;
            Ok((session, Some(controller), Clock::countdown(round.time_budget)))
        }
    }
}

async fn send(stream: &mut SplitSink<DuplexStream, Message>, message: &ServerMessage) {
    if let Ok(text) = serde_json::to_string(message) {
        let _ = stream.send(Message::Text(text)).await;
    }
}

async fn broadcast(
    streams: &mut HashMap<Uuid, SplitSink<DuplexStream, Message>>,
    message: &ServerMessage,
) {
    let futures: Vec<_> = streams
        .iter_mut()
        .map(|(_, stream)| send(stream, message))
        .collect();

    join_all(futures).await;
}

impl Game {
    #[instrument(level = "trace", skip(records))]
    pub fn new(params: GameParams, records: SharedRecords) -> Result<Self, GameError> {
        info!("Creating new {} game on {}", params.mode, params.level);
        let (session, challenge, clock) = first_round(params)?;
        Ok(Self {
            params,
            session,
            challenge,
            clock,
            timer: None,
            generation: 0,
            claim: None,
            records,
            streams: HashMap::new(),
            last_activity: Instant::now(),
        })
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn init_message(&self) -> ServerMessage {
        ServerMessage::Init {
            mode: self.params.mode,
            level: self.params.level,
            rows: self.session.rows(),
            columns: self.session.columns(),
            mines: self.session.mine_count(),
            flags: self.session.flags(),
            round: self.challenge.as_ref().map(ChallengeController::round),
            time: self.clock.reading(),
            field: self.session.view(),
        }
    }

    fn update_message(&self, updates: Vec<CellUpdate>) -> ServerMessage {
        ServerMessage::Update {
            updates,
            flags: self.session.flags(),
            won: self.session.outcome() == Outcome::Won,
            lost: self.session.outcome() == Outcome::Lost,
        }
    }

    /// Hand over the timer task started for the current round.
    pub fn attach_timer(&mut self, timer: JoinHandle<()>) {
        self.stop_timer();
        self.timer = Some(timer);
    }

    pub fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            debug!("Stopping round timer");
            timer.abort();
        }
    }

    #[instrument(level = "trace", skip(self))]
    pub async fn restart(&mut self, params: GameParams) {
        info!("Restarting game as {} on {}", params.mode, params.level);
        match first_round(params) {
            Ok((session, challenge, clock)) => {
                self.stop_timer();
                self.generation += 1;
                self.params = params;
                self.session = session;
                self.challenge = challenge;
                self.clock = clock;
                self.claim = None;
                self.last_activity = Instant::now();
                let message = self.init_message();
                broadcast(&mut self.streams, &message).await;
                info!(
                    "Game restarted and broadcasted to {} connections",
                    self.streams.len()
                );
            }
            Err(e) => {
                warn!("Refusing restart: {}", e);
                let message = ServerMessage::Notice {
                    message: e.to_string(),
                };
                broadcast(&mut self.streams, &message).await;
            }
        }
    }

    #[instrument(level = "trace", skip(self, stream))]
    pub async fn add_stream(&mut self, mut stream: SplitSink<DuplexStream, Message>) -> Uuid {
        let id = Uuid::new_v4();
        debug!("Adding stream {} to game", id);
        send(&mut stream, &self.init_message()).await;
        self.streams.insert(id, stream);
        self.last_activity = Instant::now();
        info!(
            "Stream {} added, total connections: {}",
            id,
            self.streams.len()
        );
        id
    }

    #[instrument(level = "trace", skip(self))]
    pub async fn remove_stream(&mut self, id: &Uuid) {
        if self.streams.remove(id).is_some() {
            info!(
                "Stream {} removed, remaining connections: {}",
                id,
                self.streams.len()
            );
        } else {
            warn!("Attempted to remove non-existent stream: {}", id);
        }
        self.last_activity = Instant::now()
    }

    pub fn has_active_connections(&self) -> bool {
        !self.streams.is_empty()
    }

    pub fn should_cleanup(&self, inactive_timeout_secs: u64, active_timeout_secs: u64) -> bool {
        let elapsed = Instant::now()
            .duration_since(self.last_activity)
            .as_secs();

        if self.has_active_connections() {
            return elapsed > active_timeout_secs;
        }

        elapsed > inactive_timeout_secs
    }

    #[instrument(level = "trace", skip(self), fields(row = pos.row, col = pos.col))]
    pub async fn flag(&mut self, pos: Pos) {
        if !self.session.contains(pos) {
            warn!("Invalid flag position: ({}, {})", pos.row, pos.col);
            return;
        }

        self.last_activity = Instant::now();

        match self.session.toggle_flag(pos) {
            Some(update) => {
                debug!("Cell ({}, {}) is now {:?}", pos.row, pos.col, update.value);
                let message = self.update_message(vec![update]);
                broadcast(&mut self.streams, &message).await;
            }
            None => debug!("Ignoring flag action at ({}, {})", pos.row, pos.col),
        }
    }

    /// Reveal a cell. Returns true when the caller has to start the round
    /// timer.
    #[instrument(level = "trace", skip(self), fields(row = pos.row, col = pos.col))]
    pub async fn reveal(&mut self, pos: Pos) -> bool {
        if !self.session.contains(pos) {
            warn!("Invalid reveal position: ({}, {})", pos.row, pos.col);
            return false;
        }

        self.last_activity = Instant::now();

        let step = self.session.reveal(pos);
        if step.is_empty() {
            debug!("Ignoring reveal action at ({}, {})", pos.row, pos.col);
            return false;
        }

        let start_timer = step.first_reveal();
        let outcome = self.publish(step).await;
        match outcome {
            Some(outcome) => {
                self.stop_timer();
                self.finish(outcome).await;
                false
            }
            None => start_timer,
        }
    }

    async fn publish(&mut self, step: Step) -> Option<Outcome> {
        let outcome = step.outcome();
        debug!("Revealed {} cells", step.updates.len());
        let message = self.update_message(step.updates);
        broadcast(&mut self.streams, &message).await;
        outcome
    }

    /// One second passed for the round started in `generation`. Returns
    /// false once the timer should stop.
    pub async fn tick(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.session.outcome().is_over() {
            debug!("Dropping stale tick from round {}", generation);
            return false;
        }

        match self.clock.tick() {
            Tick::Running(time) => {
                broadcast(&mut self.streams, &ServerMessage::Clock { time }).await;
                true
            }
            Tick::Expired => {
                info!("Countdown ran out");
                // Called from the timer task itself, so detach rather than abort.
                drop(self.timer.take());
                broadcast(&mut self.streams, &ServerMessage::Clock { time: 0 }).await;
                let step = self.session.expire();
                if let Some(outcome) = self.publish(step).await {
                    self.finish(outcome).await;
                }
                false
            }
        }
    }

    async fn finish(&mut self, outcome: Outcome) {
        match (self.params.mode, outcome) {
            (Mode::Classic, Outcome::Won) => {
                let elapsed = self.clock.reading();
                info!("Classic game won in {}s", elapsed);
                self.offer_record(Mode::Classic, elapsed).await;
            }
            (Mode::Challenge, Outcome::Won) => self.next_round().await,
            (Mode::Challenge, Outcome::Lost) => {
                let rounds = self
                    .challenge
                    .as_ref()
                    .map(ChallengeController::round)
                    .unwrap_or_default();
                info!("Challenge run over after {} rounds", rounds);
                self.offer_record(Mode::Challenge, rounds).await;
            }
            (Mode::Classic, Outcome::Lost) | (_, Outcome::InProgress) => {}
        }
    }

    async fn next_round(&mut self) {
        let Some(challenge) = self.challenge.as_mut() else {
            return;
        };
        let next = challenge.next_round_parameters();
        let round = challenge.round();

        match GameSession::new(next.rows, next.columns, next.mines) {
            Ok(session) => {
                info!(
                    "Challenge round {} cleared, next board {}x{} with {} mines",
                    round, next.rows, next.columns, next.mines
                );
                self.generation += 1;
                self.session = session;
                self.clock = Clock::countdown(next.time_budget);
                let message = self.init_message();
                broadcast(&mut self.streams, &message).await;
            }
            Err(e) => {
                error!("Cannot build challenge round {}: {}", round + 1, e);
                self.offer_record(Mode::Challenge, round).await;
            }
        }
    }

    async fn offer_record(&mut self, mode: Mode, score: u64) {
        let level = self.params.level;
        let qualifies = self.records.lock().await.book().qualifies(mode, level, score);
        if !qualifies {
            debug!("Score {} does not make the {} {} board", score, mode, level);
            return;
        }

        self.claim = Some(RecordClaim {
            mode,
            level,
            score,
            attempts: 0,
        });
        broadcast(
            &mut self.streams,
            &ServerMessage::RecordQualified { mode, level, score },
        )
        .await;
    }

    #[instrument(level = "trace", skip(self))]
    pub async fn claim_record(&mut self, name: String) {
        let Some(mut claim) = self.claim.take() else {
            debug!("No record waiting for a name");
            return;
        };
        self.last_activity = Instant::now();

        let mut records = self.records.lock().await;
        let inserted = records
            .book_mut()
            .insert(claim.mode, claim.level, &name, claim.score);
        match inserted {
            Ok(_) => {
                let entries = records.book().top_n(claim.mode, claim.level, usize::MAX);
                let saved = records.save();
                drop(records);
                info!(
                    "Recorded {} for {} on {} {}",
                    claim.score, name, claim.mode, claim.level
                );
                broadcast(
                    &mut self.streams,
                    &ServerMessage::RecordSaved {
                        mode: claim.mode,
                        level: claim.level,
                        entries,
                    },
                )
                .await;
                if let Err(e) = saved {
                    warn!("Could not save records: {}", e);
                    broadcast(
                        &mut self.streams,
                        &ServerMessage::Notice {
                            message: format!("Records could not be saved: {e}"),
                        },
                    )
                    .await;
                }
            }
            Err(e) => {
                drop(records);
                claim.attempts += 1;
                if !e.is_name_problem() || claim.attempts >= MAX_NAME_ATTEMPTS {
                    info!("Record offer dropped after {} attempts", claim.attempts);
                    broadcast(&mut self.streams, &ServerMessage::RecordDeclined).await;
                    return;
                }
                debug!("Record name rejected: {}", e);
                self.claim = Some(claim);
                broadcast(
                    &mut self.streams,
                    &ServerMessage::NameRejected {
                        name,
                        reason: e.to_string(),
                        attempts_left: MAX_NAME_ATTEMPTS - claim.attempts,
                    },
                )
                .await;
            }
        }
    }

    pub async fn skip_record(&mut self) {
        if self.claim.take().is_some() {
            debug!("Player skipped the record offer");
            broadcast(&mut self.streams, &ServerMessage::RecordDeclined).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{logic::field::MineField, records::RecordStore};
    use tempfile::{TempDir, tempdir};

    fn game(mode: Mode, dir: &TempDir) -> Game {
        let records = RecordStore::open(dir.path().join("records.json")).shared();
        Game::new(
            GameParams {
                mode,
                level: Level::Easy,
            },
            records,
        )
        .unwrap()
    }

    /// Swap in a 3x3 round with a single mine in the top left corner.
    fn rig_corner_mine(game: &mut Game) {
        game.session =
            GameSession::from_field(MineField::with_mines(3, 3, &[Pos::new(0, 0)]));
    }

    fn pending_claim(game: &Game) -> Option<(Mode, u64, u32)> {
        game.claim
            .map(|claim| (claim.mode, claim.score, claim.attempts))
    }

    #[tokio::test]
    async fn classic_win_offers_the_elapsed_seconds() {
        let dir = tempdir().unwrap();
        let mut game = game(Mode::Classic, &dir);
        rig_corner_mine(&mut game);

        let generation = game.generation();
        for _ in 0..42 {
            assert!(game.tick(generation).await);
        }
        assert!(!game.reveal(Pos::new(2, 2)).await);

        assert_eq!(game.session.outcome(), Outcome::Won);
        assert_eq!(pending_claim(&game), Some((Mode::Classic, 42, 0)));
        assert!(!game.tick(generation).await);
    }

    #[tokio::test]
    async fn classic_loss_offers_nothing() {
        let dir = tempdir().unwrap();
        let mut game = game(Mode::Classic, &dir);
        rig_corner_mine(&mut game);

        game.reveal(Pos::new(0, 0)).await;

        assert_eq!(game.session.outcome(), Outcome::Lost);
        assert!(game.claim.is_none());
    }

    #[tokio::test]
    async fn challenge_win_moves_to_a_harder_round() {
        let dir = tempdir().unwrap();
        let mut game = game(Mode::Challenge, &dir);
        rig_corner_mine(&mut game);

        assert!(!game.reveal(Pos::new(2, 2)).await);

        assert_eq!(game.generation(), 1);
        assert_eq!(game.challenge.as_ref().map(ChallengeController::round), Some(1));
        assert_eq!(game.session.outcome(), Outcome::InProgress);
        assert_eq!(
            (game.session.rows(), game.session.columns(), game.session.mine_count()),
            (10, 9, 11)
        );
        assert_eq!(game.clock, Clock::countdown(895));
        assert!(game.claim.is_none());

        rig_corner_mine(&mut game);
        game.reveal(Pos::new(2, 2)).await;
        rig_corner_mine(&mut game);
        game.reveal(Pos::new(2, 2)).await;

        assert_eq!(game.generation(), 3);
        assert_eq!(
            (game.session.rows(), game.session.columns(), game.session.mine_count()),
            (10, 9, 12)
        );
        assert_eq!(game.clock, Clock::countdown(885));
    }

    #[tokio::test]
    async fn countdown_expiry_ends_the_run_with_a_record_offer() {
        let dir = tempdir().unwrap();
        let mut game = game(Mode::Challenge, &dir);
        rig_corner_mine(&mut game);
        game.clock = Clock::countdown(2);

        let generation = game.generation();
        assert!(game.tick(generation).await);
        assert!(!game.tick(generation).await);

        assert_eq!(game.session.outcome(), Outcome::Lost);
        assert_eq!(game.clock.reading(), 0);
        assert_eq!(pending_claim(&game), Some((Mode::Challenge, 0, 0)));
    }

    #[tokio::test]
    async fn ticks_from_a_replaced_round_are_ignored() {
        let dir = tempdir().unwrap();
        let mut game = game(Mode::Challenge, &dir);
        let old = game.generation();

        assert!(!game.tick(old + 5).await);
        assert_eq!(game.clock, Clock::countdown(900));

        game.restart(GameParams {
            mode: Mode::Challenge,
            level: Level::Easy,
        })
        .await;
        assert!(!game.tick(old).await);
        assert_eq!(game.clock, Clock::countdown(900));
        assert!(game.tick(game.generation()).await);
        assert_eq!(game.clock, Clock::countdown(899));
    }

    #[tokio::test]
    async fn repeated_duplicate_names_decline_the_record() {
        let dir = tempdir().unwrap();
        let mut game = game(Mode::Classic, &dir);
        game.records
            .lock()
            .await
            .book_mut()
            .insert(Mode::Classic, Level::Easy, "ada", 90)
            .unwrap();
        game.offer_record(Mode::Classic, 30).await;
        assert_eq!(pending_claim(&game), Some((Mode::Classic, 30, 0)));

        game.claim_record("ada".to_string()).await;
        assert_eq!(pending_claim(&game), Some((Mode::Classic, 30, 1)));
        game.claim_record(" ada ".to_string()).await;
        assert_eq!(pending_claim(&game), Some((Mode::Classic, 30, 2)));
        game.claim_record("ada".to_string()).await;
        assert!(game.claim.is_none());

        game.claim_record("bob".to_string()).await;
        let records = game.records.lock().await;
        assert_eq!(records.book().len(Mode::Classic, Level::Easy), 1);
    }

    #[tokio::test]
    async fn accepted_name_is_saved() {
        let dir = tempdir().unwrap();
        let mut game = game(Mode::Classic, &dir);
        game.offer_record(Mode::Classic, 30).await;

        game.claim_record(String::new()).await;
        assert_eq!(pending_claim(&game), Some((Mode::Classic, 30, 1)));
        game.claim_record("eve".to_string()).await;
        assert!(game.claim.is_none());

        let saved = RecordStore::load(dir.path().join("records.json")).unwrap();
        let entries = saved.book().top_n(Mode::Classic, Level::Easy, 5);
        assert_eq!(entries.len(), 1);
        assert_eq!((entries[0].name.as_str(), entries[0].score), ("eve", 30));
    }

    #[tokio::test]
    async fn skipping_drops_the_offer() {
        let dir = tempdir().unwrap();
        let mut game = game(Mode::Challenge, &dir);
        game.offer_record(Mode::Challenge, 4).await;
        assert!(game.claim.is_some());

        game.skip_record().await;
        assert!(game.claim.is_none());
        game.claim_record("late".to_string()).await;
        assert_eq!(game.records.lock().await.book().len(Mode::Challenge, Level::Easy), 0);
    }
}
