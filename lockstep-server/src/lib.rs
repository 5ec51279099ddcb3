use std::{
    net::{Ipv6Addr, SocketAddr},
    sync::Arc,
    thread,
};

use axum_extra::extract::cookie::Key;
use lockstep_collab::Collab;
use log::{info, warn};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

mod context;
mod errors;
mod fanout;
mod rooms;
mod schemas;
mod search;
mod serialized;
mod session;

pub mod gateway;

pub use context::ServerContext;

use fanout::Fanout;
use gateway::RoomGateway;

/// The default port the server will listen on.
pub const DEFAULT_PORT: u16 = 3333;

pub type Router = axum::Router<ServerContext>;

/// Everything the server needs besides the collab system itself
pub struct ServerConfig {
    pub port: u16,
    /// Enables cross-instance room fanout when set
    pub redis_url: Option<String>,
    /// Secret the session cookies are signed with. A missing or short secret
    /// falls back to an ephemeral key, invalidating sessions on restart.
    pub session_secret: Option<String>,
}

/// Starts the lockstep server, running until interrupted
pub async fn run_server(collab: Arc<Collab>, config: ServerConfig) {
    let fanout = match &config.redis_url {
        Some(url) => Fanout::connect(url),
        None => Fanout::disabled(),
    };

    let gateway = RoomGateway::new(collab.clone(), fanout.clone());
    fanout.start(gateway.clone());

    // Pump domain events into room broadcasts
    let events = collab.events();
    let pump_gateway = gateway.clone();

    thread::spawn(move || {
        while let Ok(event) = events.recv() {
            pump_gateway.dispatch_event(event);
        }
    });

    let context = ServerContext {
        collab,
        gateway: gateway.clone(),
        cookie_key: cookie_key(config.session_secret.as_deref()),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let version_one_router = Router::new()
        .merge(session::router())
        .merge(rooms::router())
        .merge(search::router())
        .merge(gateway::router());

    let root_router = axum::Router::new()
        .nest("/v1", version_one_router)
        .layer(cors)
        .with_state(context);

    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, config.port).into();
    let listener = TcpListener::bind(&addr).await.expect("listens on address");

    info!("Listening on port {}", config.port);

    axum::serve(listener, root_router.into_make_service())
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await
        .expect("server runs");

    gateway.shutdown();
}

fn cookie_key(secret: Option<&str>) -> Key {
    match secret {
        Some(secret) if secret.len() >= 32 => Key::derive_from(secret.as_bytes()),
        Some(_) => {
            warn!("Session secret is shorter than 32 bytes, using an ephemeral key");
            Key::generate()
        }
        None => {
            warn!("No session secret configured, sessions won't survive a restart");
            Key::generate()
        }
    }
}
