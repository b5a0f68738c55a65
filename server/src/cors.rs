use rocket::http::Method;
use rocket_cors::{AllowedOrigins, CorsOptions};
use std::env;
use tracing::{error, info};

pub fn create_cors() -> Result<rocket_cors::Cors, rocket_cors::Error> {
    let allowed_origins_env =
        env::var("CORS_ALLOWED_ORIGINS").unwrap_or_else(|_| "http://localhost:5173".to_string());

    let allowed_origins: Vec<String> = allowed_origins_env
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    info!("CORS allowed origins: {:?}", allowed_origins);

    CorsOptions {
        allowed_origins: AllowedOrigins::some_exact(&allowed_origins),
        allowed_methods: vec![Method::Get, Method::Post, Method::Delete, Method::Options]
            .into_iter()
            .map(|m| m.into())
            .collect(),
        allowed_headers: rocket_cors::AllowedHeaders::some(&["Accept", "Content-Type"]),
        allow_credentials: false,
        ..Default::default()
    }
    .to_cors()
    .inspect_err(|e| error!("Invalid CORS configuration: {}", e))
}
