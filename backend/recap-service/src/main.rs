use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use recap_service::clients::TautulliClient;
use recap_service::handlers::{self, AppState};
use recap_service::jobs::{run_pregenerate_job, PregenerateConfig};
use recap_service::storage::RecapStore;
use std::io;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Recap Service
///
/// Builds yearly watch-history recaps for every user of a media server
/// and serves them read-only over HTTP.
///
/// # Modes
///
/// - `recap-service` - start the HTTP read surface
/// - `recap-service --pregenerate [--force] [--data-only|--cards-only] [username]`
///   - run the offline pipeline and exit
///
/// # Routes
///
/// - `/api/health` - upstream connectivity
/// - `/api/users` - media-server users for the recap picker
/// - `/api/recap/{username}` - pregenerated recap
/// - `/api/recap-by-token/{token}` - recap via share token
/// - `/api/token/{username}` - share token for an existing recap

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match recap_service::Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("Configuration loading failed: {:#}", e);
            eprintln!("ERROR: Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Starting recap-service v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {}", config.app.env);

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|arg| arg == "--pregenerate") {
        let mut job_config = PregenerateConfig::from_env();
        let rest: Vec<String> = args
            .into_iter()
            .filter(|arg| arg != "--pregenerate")
            .collect();
        if let Err(e) = job_config.apply_args(&rest) {
            eprintln!("ERROR: {}", e);
            eprintln!(
                "Usage: recap-service --pregenerate [--force] [--data-only|--cards-only] [username]"
            );
            std::process::exit(2);
        }

        if let Err(e) = run_pregenerate_job(config, job_config).await {
            tracing::error!("Pregeneration failed: {:#}", e);
            std::process::exit(1);
        }
        return Ok(());
    }

    let store = RecapStore::new(&config.storage.data_dir).map_err(|e| {
        io::Error::new(
            io::ErrorKind::Other,
            format!("Failed to open data directory {}: {e}", config.storage.data_dir),
        )
    })?;
    let tautulli = Arc::new(TautulliClient::new(config.tautulli.clone()));
    let app_state = web::Data::new(AppState { tautulli, store });

    let bind_address = format!("{}:{}", config.app.host, config.app.port);
    tracing::info!("Starting HTTP server at {}", bind_address);

    HttpServer::new(move || {
        // Build CORS configuration
        let mut cors = Cors::default();
        for origin in config.cors.allowed_origins.split(',') {
            let origin = origin.trim();
            if origin == "*" {
                cors = cors.allow_any_origin();
            } else {
                cors = cors.allowed_origin(origin);
            }
        }
        cors = cors.allow_any_method().allow_any_header().max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .wrap(cors)
            .wrap(Logger::default())
            .wrap(tracing_actix_web::TracingLogger::default())
            // Health check endpoints
            .route("/health/live", web::get().to(handlers::health_live))
            .route("/health/ready", web::get().to(handlers::health_ready))
            .service(
                web::scope("/api")
                    .route("/health", web::get().to(handlers::api_health))
                    .route("/users", web::get().to(handlers::list_users))
                    .route("/recap/{username}", web::get().to(handlers::get_recap))
                    .route(
                        "/recap-by-token/{token}",
                        web::get().to(handlers::get_recap_by_token),
                    )
                    .route("/token/{username}", web::get().to(handlers::get_token)),
            )
    })
    .bind(&bind_address)?
    .workers(4)
    .run()
    .await
}
