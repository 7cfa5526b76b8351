use actix_web::{App, HttpServer, web};
use pneumoscan::config::AppConfig;
use pneumoscan::pipeline::DiagnosisService;
use pneumoscan::routes::configure_routes;
use pneumoscan::session::SessionService;
use std::env;

fn startup_error(context: &str, err: impl std::fmt::Display) -> std::io::Error {
    log::error!("{}: {}", context, err);
    std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {}", context, err))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    }

    let config = AppConfig::load().map_err(|e| startup_error("Invalid configuration", e))?;

    let sessions = if config.session_secret.is_empty() {
        log::warn!("SESSION_SECRET is not set; using a random secret, sessions will not survive a restart");
        SessionService::ephemeral()
    } else {
        SessionService::new(&config.session_secret)
    };

    let service = DiagnosisService::from_config(&config)
        .await
        .map_err(|e| startup_error("Failed to initialise diagnosis pipeline", e))?;
    let uploads_dir = service.sink().local_dir().map(|dir| dir.to_path_buf());
    if let Some(dir) = &uploads_dir {
        log::info!("Serving local uploads from {}", dir.display());
    }

    let service = web::Data::new(service);
    let sessions = web::Data::new(sessions);

    let bind_address = format!("{}:{}", config.bind_address, config.port);
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .app_data(service.clone())
            .app_data(sessions.clone())
            .configure(|cfg| configure_routes(cfg, uploads_dir.clone()))
    })
    .bind(&bind_address)?
    .run()
    .await
}
