use actix_web::{middleware::Logger, web, App, HttpServer};
use futures::executor::block_on;
use sqlx::sqlite::SqlitePool;
use tera::Tera;
use tracing_subscriber::EnvFilter;

use std::path::PathBuf;
use std::time::Duration;

mod database;
mod error;
mod message_database;
mod rate_limit;
mod routes;
mod settings;
mod visitor_database;

use message_database::MessageStore;
use rate_limit::RateGovernor;
use routes::AppState;
use settings::Settings;
use visitor_database::VisitorTracker;

const PURGE_EVERY: Duration = Duration::from_secs(60);

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let settings = Settings::load()?;
    let pool = database::connect(&settings.database).await?;

    // The pool is closed however serving ends.
    let result = serve(&settings, pool.clone()).await;
    pool.close().await;
    tracing::info!("database closed. Bye!");
    result
}

async fn serve(settings: &Settings, pool: SqlitePool) -> anyhow::Result<()> {
    let tera = Tera::new(&settings.server.templates)?;

    let governor = RateGovernor::from_settings(&settings.rate_limit);
    governor.spawn_purger(PURGE_EVERY);

    let app_data = web::Data::new(AppState {
        tera,
        messages: MessageStore::with_capacity(pool.clone(), settings.guestbook.max_messages),
        visitors: VisitorTracker::new(pool.clone()),
        pool,
        governor,
        trust_proxy_headers: settings.rate_limit.trust_proxy_headers,
        static_dir: PathBuf::from(&settings.server.static_dir),
    });

    let mut server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(app_data.clone())
            .app_data(routes::json_config())
            .configure(routes::configure)
            .default_service(web::to(routes::fallback))
    });
    if let Some(workers) = settings.server.workers {
        server = server.workers(workers);
    }
    let server = server
        .bind((settings.server.host.as_str(), settings.server.port))?
        .disable_signals()
        .run();

    let handle = server.handle();
    ctrlc::set_handler(move || {
        tracing::info!("interrupted, shutting down");
        block_on(handle.stop(true));
    })?;

    tracing::info!(
        "listening on http://{}:{}",
        settings.server.host,
        settings.server.port
    );
    server.await?;
    Ok(())
}
