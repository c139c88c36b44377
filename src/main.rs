mod chat;
mod config;
mod model;
mod quota;
mod store;
mod web;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web::Data, App, HttpServer};
use dotenv::dotenv;
use log::{error, info};
use std::sync::Arc;

use chat::ChatService;
use config::Settings;
use quota::QuotaGate;
use store::SqliteStore;
use web::routes;

// App state structure
pub struct AppState {
    chat: ChatService,
}

fn cors(settings: &Settings) -> Cors {
    let cors = Cors::default()
        .allow_any_method()
        .allow_any_header()
        .supports_credentials()
        .max_age(3600);

    if settings.cors_allowed_origins.is_empty() {
        cors.allow_any_origin()
    } else {
        settings
            .cors_allowed_origins
            .iter()
            .fold(cors, |cors, origin| cors.allowed_origin(origin))
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize environment
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let settings = Settings::from_env();
    info!("Starting chat relay (free questions per session: {})", settings.free_question_limit);

    let store = match SqliteStore::connect(&settings.database_url, settings.database_max_connections).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Failed to open chat store: {}", e);
            std::process::exit(1);
        }
    };

    let generator = match model::build_generator(&settings) {
        Ok(generator) => generator,
        Err(e) => {
            error!("Failed to initialize reply generator: {}", e);
            std::process::exit(1);
        }
    };

    let app_state = Data::new(AppState {
        chat: ChatService::new(
            store.clone(),
            store.clone(),
            generator,
            QuotaGate::new(settings.free_question_limit),
            settings.payment_url.clone(),
        ),
    });

    let bind = (settings.host.clone(), settings.port);
    info!("Listening on {}:{}", bind.0, bind.1);

    // Start web server
    let result = HttpServer::new(move || {
        App::new()
            .wrap(cors(&settings))
            .wrap(Logger::default())
            .app_data(app_state.clone())
            .configure(routes::configure)
    })
    .bind(bind)?
    .run()
    .await;

    store.pool().close().await;
    info!("Chat store closed");
    result
}
