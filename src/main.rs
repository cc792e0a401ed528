mod config;
mod document;
mod model;
mod session;
mod text;
mod web;

use actix_files as fs;
use actix_web::{web::Data, web::PayloadConfig, App, HttpServer};
use dotenv::dotenv;
use log::{error, info};
use tera::Tera;

use config::AppConfig;
use model::CompletionClient;
use session::SessionStore;
use web::routes;

// App state structure
struct AppState {
    tera: Tera,
    model: CompletionClient,
    sessions: SessionStore,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize environment
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting PDF chat application");

    let config = AppConfig::from_env();

    // Initialize template engine
    let mut tera = match Tera::new(&format!("{}/**/*", config.templates_dir)) {
        Ok(t) => t,
        Err(e) => {
            error!("Template parsing error: {}", e);
            std::process::exit(1);
        }
    };
    tera.autoescape_on(vec![".html"]);

    // Create app state
    let app_state = Data::new(AppState {
        tera,
        model: CompletionClient::from_config(&config),
        sessions: SessionStore::new(),
    });

    let static_dir = config.static_dir.clone();
    let max_upload_bytes = config.max_upload_bytes;

    // Start web server
    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .app_data(PayloadConfig::new(max_upload_bytes))
            .configure(routes::configure)
            .service(fs::Files::new("/static", &static_dir))
    })
    .bind((config.bind_address.as_str(), config.port))?
    .run()
    .await
}
