use std::sync::Arc;

use dashmap::Entry;
use nanoid::nanoid;
use rocket::{
    State, delete, futures::StreamExt, get, http::Status, post, serde::json::Json,
};
use rocket_ws::{Channel, Message, WebSocket};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use minefield_common::{
    models::{CreateResponse, GameParams, Level, Mode, RecordEntry},
    protocol::ClientMessage,
};

use crate::{
    logic::{Game, Games, timer},
    records::{MAX_ENTRIES, RecordBook, SharedRecords},
};

#[instrument(level = "trace", skip(games, game))]
fn add_game(games: &State<Games>, game: Game) -> String {
    let mut id_length = 5;
    let max_attempts_per_length = 10;

    loop {
        for _ in 0..max_attempts_per_length {
            let id = nanoid!(id_length);
            match games.entry(id.clone()) {
                Entry::Occupied(_) => {
                    debug!("Game ID collision, trying another: {}", id);
                    continue;
                }
                Entry::Vacant(entry) => {
                    entry.insert(Arc::new(Mutex::new(game)));
                    info!("Created new game with ID: {}", id);
                    return id;
                }
            }
        }

        warn!(
            "Exhausted ID attempts at length {}, increasing to {}",
            id_length,
            id_length + 1
        );
        id_length += 1;
    }
}

#[post("/create", data = "<params>")]
#[instrument(level = "trace", skip(games, records), fields(mode = %params.mode, level = %params.level))]
pub fn create_game(
    params: Json<GameParams>,
    games: &State<Games>,
    records: &State<SharedRecords>,
) -> Result<Json<CreateResponse>, Status> {
    info!(
        "Game creation request: {} on {}",
        params.mode, params.level
    );

    let game = match Game::new(params.0, Arc::clone(records.inner())) {
        Ok(game) => game,
        Err(e) => {
            warn!("Rejected game parameters: {}", e);
            return Err(Status::UnprocessableEntity);
        }
    };
    let id = add_game(games, game);

    Ok(Json(CreateResponse { id }))
}

#[get("/records")]
pub async fn all_records(records: &State<SharedRecords>) -> Json<RecordBook> {
    Json(records.lock().await.book().clone())
}

#[get("/records/<mode>/<level>")]
pub async fn level_records(
    mode: &str,
    level: &str,
    records: &State<SharedRecords>,
) -> Result<Json<Vec<RecordEntry>>, Status> {
    let (Ok(mode), Ok(level)) = (mode.parse::<Mode>(), level.parse::<Level>()) else {
        debug!("Unknown record board {}/{}", mode, level);
        return Err(Status::NotFound);
    };
    let entries = records.lock().await.book().top_n(mode, level, MAX_ENTRIES);
    Ok(Json(entries))
}

/// Wipe every record board. Needs `?confirm=true`.
#[delete("/records?<confirm>")]
pub async fn reset_records(confirm: Option<bool>, records: &State<SharedRecords>) -> Status {
    if confirm != Some(true) {
        debug!("Record reset requested without confirmation");
        return Status::PreconditionRequired;
    }

    let mut store = records.lock().await;
    store.book_mut().reset();
    info!("All records reset");
    match store.save() {
        Ok(()) => Status::NoContent,
        Err(e) => {
            error!(
                "Records reset in memory but not saved to {}: {}",
                store.path().display(),
                e
            );
            Status::InternalServerError
        }
    }
}

#[get("/ws?<id>")]
#[instrument(level = "trace", skip(ws, games), fields(game_id = %id))]
pub fn websocket_handler(
    ws: WebSocket,
    games: &State<Games>,
    id: String,
) -> Result<Channel<'static>, Status> {
    let game = match games.get(&id) {
        None => {
            warn!("WebSocket connection attempt for non-existent game: {}", id);
            return Err(Status::NotFound);
        }
        Some(value) => {
            info!("WebSocket connection established for game: {}", id);
            value.value().clone()
        }
    };

    Ok(ws.channel(move |stream| {
        let game_id = id.clone();
        Box::pin(async move {
            let (write, mut read) = stream.split();

            let stream_id = {
                let mut game = game.lock().await;
                game.add_stream(write).await
            };

            info!(
                "Client connected to game {} (stream: {})",
                game_id, stream_id
            );

            while let Some(message) = read.next().await {
                match message {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(message) => {
                            debug!("Received message from game {}: {:?}", game_id, message);
                            let mut guard = game.lock().await;
                            match message {
                                ClientMessage::Reveal { pos } => {
                                    if guard.reveal(pos).await {
                                        timer::start(&game, &mut guard);
                                    }
                                }
                                ClientMessage::Flag { pos } => guard.flag(pos).await,
                                ClientMessage::Restart { params } => guard.restart(params).await,
                                ClientMessage::ClaimRecord { name } => {
                                    guard.claim_record(name).await
                                }
                                ClientMessage::SkipRecord => guard.skip_record().await,
                            }
                        }
                        Err(e) => {
                            warn!(
                                "Invalid message format in game {}: {} - Error: {}",
                                game_id, text, e
                            );
                        }
                    },
                    Ok(Message::Close(_)) => {
                        info!(
                            "WebSocket connection closed for game {} (stream: {})",
                            game_id, stream_id
                        );
                        break;
                    }
                    Err(e) => {
                        error!(
                            "WebSocket error in game {} (stream: {}): {}",
                            game_id, stream_id, e
                        );
                        break;
                    }
                    _ => {
                        debug!("Received non-text message in game {}, ignoring", game_id);
                    }
                }
            }

            {
                let mut game = game.lock().await;
                game.remove_stream(&stream_id).await;
            }

            info!(
                "Client disconnected from game {} (stream: {})",
                game_id, stream_id
            );
            Ok(())
        })
    }))
}
