//! Docark server entry point.
//!
//! 1. Load configuration from environment
//! 2. Connect the user store (Postgres or in-memory)
//! 3. Create the default admin account on first start
//! 4. Build the router with API, archive and static routes
//! 5. Serve

use docark::{
    archive::Archive, search::MeiliSearchIndex, AppState, AuthConfig, MemoryUserStore,
    PgUserStore, ServerConfig, SigningSecret, UserStore,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

fn print_banner() {
    println!("  ____             _            _    ");
    println!(" |  _ \\  ___   ___/ \\   _ __ | | __");
    println!(" | | | |/ _ \\ / __/ _ \\ | '__|| |/ /");
    println!(" | |_| | (_) | (_/ ___ \\| |   |   < ");
    println!(" |____/ \\___/ \\__/_/  \\_\\_|   |_|\\_\\");
    println!();
}

#[tokio::main]
async fn main() {
    print_banner();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let auth_config = AuthConfig::from_env();
    auth_config.validate().expect("Invalid auth configuration");
    let config = ServerConfig::from_env().expect("Invalid server configuration");

    // Fatal if no secret is configured and entropy is unavailable
    let secret = SigningSecret::from_config(&auth_config).expect("Failed to create signing secret");

    let store: Arc<dyn UserStore> = match &config.database_url {
        Some(url) => {
            let pool = sqlx::PgPool::connect(url)
                .await
                .expect("Failed to connect to database");
            let store = PgUserStore::new(pool);
            store.migrate().await.expect("Failed to run migrations");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, users are kept in memory");
            Arc::new(MemoryUserStore::new())
        }
    };

    let search = Arc::new(MeiliSearchIndex::new(
        config.meili_host.clone(),
        config.meili_index.clone(),
        config.meili_api_key.clone(),
        config.search_page_size,
    ));

    let archive = Archive::new(&config.archive_dir);
    archive.init().await.expect("Failed to create archive directory");

    let state = AppState::new(&auth_config, &secret, store, search, archive)
        .expect("Failed to initialize services");

    if let Some(password) = state
        .sessions
        .ensure_default_admin()
        .await
        .expect("Failed to create default admin")
    {
        println!("=== Default administrator account ===");
        println!("Username: {}", docark::service::DEFAULT_ADMIN);
        println!("Password: {}", password);
        println!("=====================================");
    }

    let mut app = docark::create_routes(state)
        .nest_service("/static", ServeDir::new(&config.static_dir))
        .layer(axum::extract::DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http());

    if config.debug {
        tracing::info!("Debug mode: permissive CORS enabled");
        app = app.layer(CorsLayer::very_permissive());
    }

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .expect("Failed to bind");
    tracing::info!("Listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
