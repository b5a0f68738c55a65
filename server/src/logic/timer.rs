use std::{sync::Arc, time::Duration};

use tokio::{
    task::JoinHandle,
    time::{self, Instant},
};
use tracing::debug;

use super::{Game, SharedGame};

pub const TICK: Duration = Duration::from_secs(1);

/// Start the one-second clock of the round numbered `generation`.
///
/// Each tick goes through the game's own lock, so it never interleaves with
/// a reveal. The task ends by itself once the round is over or replaced,
/// and the game aborts it earlier when it can.
pub fn spawn(game: SharedGame, generation: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = time::interval_at(Instant::now() + TICK, TICK);
        loop {
            interval.tick().await;
            let mut guard = game.lock().await;
            if !guard.tick(generation).await {
                break;
            }
        }
        debug!("Timer for round {} finished", generation);
    })
}

/// Start the timer for the round `game` is playing and hand it over.
///
/// `game` is the locked content of `shared`.
pub fn start(shared: &SharedGame, game: &mut Game) {
    let handle = spawn(Arc::clone(shared), game.generation());
    game.attach_timer(handle);
}
