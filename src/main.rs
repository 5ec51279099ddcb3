use std::{env, sync::Arc};

use lockstep_collab::{ArcedDatabase, Collab, MemoryDatabase, PgDatabase};
use lockstep_server::{run_server, ServerConfig, DEFAULT_PORT};
use log::{info, warn};

mod logging;

#[tokio::main]
async fn main() {
    logging::init_logger();

    let database = connect_database().await;
    let youtube_api_key = env::var("YOUTUBE_API_KEY").ok();

    let collab = Arc::new(Collab::new(database, youtube_api_key));

    let config = ServerConfig {
        port: env::var("LOCKSTEP_SERVER_PORT")
            .map(|x| x.parse().expect("Port must be a number"))
            .unwrap_or(DEFAULT_PORT),
        redis_url: env::var("REDIS_URL").ok(),
        session_secret: env::var("SESSION_SECRET").ok(),
    };

    run_server(collab, config).await
}

/// Connects to postgres when DATABASE_URL is set, otherwise serves everything
/// from memory
async fn connect_database() -> ArcedDatabase {
    match env::var("DATABASE_URL") {
        Ok(url) => {
            info!("Connecting to postgres...");

            let database = PgDatabase::new(&url)
                .await
                .expect("database connection succeeds");

            Arc::new(database)
        }
        Err(_) => {
            warn!("DATABASE_URL is not set, state will not survive a restart");
            Arc::new(MemoryDatabase::new())
        }
    }
}
