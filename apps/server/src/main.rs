//! TARA Assistant server - Main entry point.
//!
//! Starts the Actix-web server with configured routes and middleware.

use std::io;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::http::header::{self, HeaderName};
use actix_web::{App, HttpServer, web};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tara_assistant_lib::api::{self, ApiDoc};
use tara_assistant_lib::config::Config;
use tara_assistant_lib::db::DbPool;
use tara_assistant_lib::error::set_verbose_errors;
use tara_assistant_lib::middleware;
use tara_assistant_lib::services::chat::ChatSettings;
use tara_assistant_lib::services::{LlmClient, PythonTestRunner, TestRunner};

/// Perform health check (for Docker healthcheck).
async fn health_check() -> bool {
    // Simple check - just verify we can load config
    Config::from_env().is_ok()
}

fn startup_error(context: &str, err: impl std::fmt::Display) -> io::Error {
    error!("{}: {}", context, err);
    io::Error::other(format!("{}: {}", context, err))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Check for --health-check flag (used by Docker HEALTHCHECK)
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|arg| arg == "--health-check") {
        dotenvy::dotenv().ok();
        if health_check().await {
            std::process::exit(0);
        } else {
            std::process::exit(1);
        }
    }

    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize logging (RUST_LOG overrides the INFO default)
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| io::Error::other(format!("Failed to set tracing subscriber: {}", e)))?;

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            error!("");
            error!("Please check your environment variables:");
            error!("  - RUST_ENV must be set to 'development' or 'production'");
            error!("  - In production, DATABASE_URL and LLM_API_KEY must be set");
            error!("  - In production, DATABASE_URL must not match the development default");
            std::process::exit(1);
        }
    };

    info!("========================================");
    info!("  TARA Assistant Server");
    info!("  Environment: {}", config.environment);
    info!("========================================");

    if config.is_development() {
        warn!("Running in DEVELOPMENT mode - do not use in production!");
        info!("Error responses include internal details");
    }
    set_verbose_errors(config.is_development());

    // Create data directory
    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .map_err(|e| startup_error("Failed to create data directory", e))?;

    // Initialize database
    let pool = DbPool::new(&config)
        .await
        .map_err(|e| startup_error("Failed to initialize database", e))?;
    info!("Database connection established");

    pool.run_migrations()
        .await
        .map_err(|e| startup_error("Failed to run migrations", e))?;
    info!("Database migrations complete");

    // LLM client
    let llm = LlmClient::new(config.llm.clone())
        .map_err(|e| startup_error("Failed to build LLM client", e))?;
    info!(
        "LLM provider: {} (model {}, timeout {}s)",
        llm.provider(),
        llm.model(),
        config.llm.timeout.as_secs()
    );
    if !llm.is_configured() {
        warn!("No LLM API key configured - generation, chat and transcription requests will fail");
    }

    // Prepare shared state
    let bind_address = config.bind_address();
    let is_development = config.is_development();
    let max_upload_size = config.max_upload_size;
    let runner: Arc<dyn TestRunner> = Arc::new(PythonTestRunner::new(config.runner.clone()));
    let chat_settings = ChatSettings {
        history_limit: config.chat_history_limit,
        secure_cookies: !is_development,
    };

    info!(
        "Upload limit: {}MB, chat history limit: {}",
        max_upload_size / 1024 / 1024,
        chat_settings
            .history_limit
            .map_or_else(|| "unlimited".to_string(), |limit| limit.to_string())
    );

    let pool = web::Data::new(pool);
    let llm = web::Data::new(llm);
    let runner = web::Data::from(runner);
    let chat_settings = web::Data::new(chat_settings);
    let openapi = ApiDoc::openapi();

    let worker_count = if is_development {
        info!(
            "Starting server at http://{} (4 workers - development mode)",
            bind_address
        );
        4
    } else {
        let cpus = num_cpus::get();
        info!(
            "Starting server at http://{} ({} workers)",
            bind_address, cpus
        );
        cpus
    };
    info!("API documentation at http://{}/api/docs/", bind_address);

    // Start HTTP server
    let server = HttpServer::new(move || {
        // Chat session header (X-Session-Id)
        let session_header = HeaderName::from_static("x-session-id");

        // Configure CORS
        let cors = if is_development {
            // Permissive CORS for development
            Cors::default()
                .allowed_origin("http://localhost:3000")
                .allowed_origin("http://127.0.0.1:3000")
                .allowed_methods(vec!["GET", "POST", "DELETE", "OPTIONS"])
                .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE, session_header])
                .supports_credentials()
                .max_age(3600)
        } else {
            // Restrictive CORS for production (same-origin only)
            Cors::default()
                .allowed_methods(vec!["GET", "POST", "DELETE", "OPTIONS"])
                .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE, session_header])
                .max_age(3600)
        };

        App::new()
            // Add CORS middleware (must be before other middleware)
            .wrap(cors)
            // Add request logging middleware
            .wrap(middleware::RequestLogger)
            // Add shared state
            .app_data(pool.clone())
            .app_data(llm.clone())
            .app_data(runner.clone())
            .app_data(chat_settings.clone())
            .app_data(web::Data::new(max_upload_size))
            .app_data(api::json_config())
            .app_data(api::path_config())
            .app_data(api::query_config())
            // Multipart overhead on top of the image itself
            .app_data(web::PayloadConfig::new(max_upload_size + 64 * 1024))
            // Swagger UI must be registered before the /api scope
            .service(SwaggerUi::new("/api/docs/{_:.*}").url("/api/openapi.json", openapi.clone()))
            // Configure API routes
            .service(web::scope("/api").configure(api::configure_routes))
    });

    // Set worker count
    server
        .workers(worker_count)
        .bind(&bind_address)?
        .run()
        .await
}
