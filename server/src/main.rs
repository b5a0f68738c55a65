use dashmap::DashMap;
use minefield_server::{
    cleanup::start_cleanup_task,
    cors::create_cors,
    logic::Games,
    records::{RecordStore, records_path},
    routes::{all_records, create_game, level_records, reset_records, websocket_handler},
};
use rocket::{
    Build, Rocket,
    fairing::{Fairing, Info, Kind},
    routes,
};
use std::sync::Arc;
use tracing::{info, warn};

struct CleanupFairing;

#[rocket::async_trait]
impl Fairing for CleanupFairing {
    fn info(&self) -> Info {
        Info {
            name: "Cleanup Task",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        if let Some(games) = rocket.state::<Games>() {
            info!("Starting cleanup task for game management");
            let games_for_cleanup = games.clone();
            tokio::spawn(async move {
                start_cleanup_task(games_for_cleanup).await;
            });
        } else {
            warn!("Failed to get games state for cleanup task");
        }
        Ok(rocket)
    }
}

#[rocket::launch]
fn rocket() -> Rocket<Build> {
    tracing_subscriber::fmt::init();
    info!("Starting minefield server");

    let games: Games = Arc::new(DashMap::new());
    let records = RecordStore::open(records_path()).shared();

    info!("Initialized game storage and record book");

    let rocket = rocket::build()
        .attach(CleanupFairing)
        .manage(games)
        .manage(records)
        .mount(
            "/",
            routes![
                create_game,
                websocket_handler,
                all_records,
                level_records,
                reset_records
            ],
        );

    let rocket = match create_cors() {
        Ok(cors) => rocket.attach(cors),
        Err(_) => {
            warn!("Serving without CORS headers");
            rocket
        }
    };

    info!("Endpoints: POST /create, GET /ws, GET /records, GET /records/<mode>/<level>, DELETE /records");

    rocket
}
