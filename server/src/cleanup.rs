use std::{env, time::Duration};

use tokio::time;
use tracing::{debug, info};

use crate::logic::Games;

fn env_secs(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

pub async fn start_cleanup_task(games: Games) {
    let cleanup_interval_secs = env_secs("CLEANUP_INTERVAL_SECONDS", 60);
    let inactive_timeout_secs = env_secs("INACTIVE_GAME_TIMEOUT_SECONDS", 600);
    let active_timeout_secs = env_secs("ACTIVE_GAME_TIMEOUT_SECONDS", 86400);

    let mut interval = time::interval(Duration::from_secs(cleanup_interval_secs.max(1)));

    info!(
        "Started game cleanup task: checking every {}s, inactive timeout: {}s, active timeout: {}s",
        cleanup_interval_secs, inactive_timeout_secs, active_timeout_secs
    );

    loop {
        interval.tick().await;
        cleanup_games(&games, inactive_timeout_secs, active_timeout_secs).await;
    }
}

async fn cleanup_games(games: &Games, inactive_timeout_secs: u64, active_timeout_secs: u64) {
    let mut games_to_remove = Vec::new();

    for entry in games.iter() {
        let game_id = entry.key();
        let game = entry.value();

        // Games busy with a player action are checked next round.
        if let Ok(mut game_guard) = game.try_lock()
            && game_guard.should_cleanup(inactive_timeout_secs, active_timeout_secs)
        {
            // The timer task holds its own handle on the game.
            game_guard.stop_timer();
            games_to_remove.push(game_id.clone());
        }
    }

    let removed_count = games_to_remove.len();
    for game_id in games_to_remove {
        games.remove(&game_id);
        debug!("Cleaned up game: {}", game_id);
    }

    if removed_count > 0 {
        info!("Cleaned up {} inactive games", removed_count);
    }
}
