use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use anyhow::Context;
use tracing::{info, warn};
use tracing_appender::rolling;
use utoipa::OpenApi; // ← needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use hr_portal::auth::permissions::{AccessControl, MySqlGrantStore};
use hr_portal::cache::QueryCache;
use hr_portal::config::Config;
use hr_portal::db::init_db;
use hr_portal::docs::ApiDoc;
use hr_portal::routes::{self, Limiters};
use hr_portal::utils::username_index::UsernameIndex;

#[get("/")]
async fn index() -> impl Responder {
    "HR Portal API"
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let level = tracing::Level::from_str(&config.log_level).unwrap_or(tracing::Level::DEBUG);
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(level)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    info!(addr = %config.server_addr, "Server starting...");

    let pool = init_db(&config.database_url).await?;
    let limiters = Limiters::from_config(&config)?;

    let list_cache = Data::new(QueryCache::new(
        config.list_cache_capacity,
        Duration::from_secs(config.list_cache_ttl_secs),
    ));
    let access = Data::new(AccessControl::new(Arc::new(MySqlGrantStore::new(
        pool.clone(),
    ))));
    let usernames = Data::new(UsernameIndex::new());

    {
        let usernames = usernames.clone();
        let pool = pool.clone();
        actix_web::rt::spawn(async move {
            // Warm up last 30 days of recent users in batches of 250
            if let Err(e) = usernames.warmup(&pool, 30, 250).await {
                warn!(error = %e, "Failed to warm up username index");
            }
        });
    }

    let server_addr = config.server_addr.clone();
    let pool = Data::new(pool);
    let config_data = Data::new(config.clone());

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // ← wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(pool.clone())
            .app_data(config_data.clone())
            .app_data(list_cache.clone())
            .app_data(access.clone())
            .app_data(usernames.clone())
            .service(index)
            .configure(|cfg| routes::configure(cfg, &config, &limiters))
    })
    .bind(&server_addr)
    .with_context(|| format!("failed to bind {server_addr}"))?
    .run()
    .await?;

    info!("Server stopped");
    Ok(())
}
