//! Example: accounts API
//!
//! Serves the accounts API from the crate root with a couple of seeded
//! accounts:
//! - `POST /signup`, `POST /login` (anonymous only)
//! - `POST /logout`, `GET /users?page=N` (logged in only)
//! - `GET /admin/stats` (XHR superusers only)
//! - `GET|POST /ping`
//!
//! Run with: cargo run --bin accounts-api
//! Log filter: RUST_LOG=common_api=trace,common_api_examples=debug

use common_api_examples::{Account, AppState, app};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,common_api=debug")),
        )
        .init();

    let state = Arc::new(AppState::with_accounts([
        Account::new("admin.root", "555-123-4567").superuser(),
        Account::new("alice_01", "(555) 222-3333"),
    ]));
    let router = app(state).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = "0.0.0.0:3000".parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    println!("=== Example: accounts API ===");
    println!("Server listening on http://{}", addr);
    println!();
    println!("Test with:");
    println!("  curl -X POST http://localhost:3000/login \\");
    println!("    -H 'Content-Type: application/json' \\");
    println!("    -d '{{\"username\": \"alice_01\"}}'");
    println!("  curl http://localhost:3000/users -H 'Cookie: sessionid=session-1'");

    axum::serve(listener, router).await?;
    Ok(())
}
