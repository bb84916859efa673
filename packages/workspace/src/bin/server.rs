use std::sync::Arc;

use tower_http::cors::CorsLayer;

use renscript_common::identity::{TokenIdentity, User};
use renscript_common::store::{MemoryStore, ScriptStore};
use renscript_editor::CollabEngine;
use renscript_workspace::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let mut port: u16 = 8000;
    let mut dev_mode = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    port = args[i + 1].parse().expect("Invalid port number");
                    i += 2;
                } else {
                    eprintln!("--port requires a value");
                    std::process::exit(1);
                }
            }
            "--dev" => {
                dev_mode = true;
                i += 1;
            }
            "--help" | "-h" => {
                println!("Usage: renscript-server [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -p, --port <PORT>   Port to listen on (default: 8000)");
                println!("      --dev           Seed a dev user and print its token");
                println!("  -h, --help          Show this help message");
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                std::process::exit(1);
            }
        }
    }

    let identity = TokenIdentity::new();
    let store = MemoryStore::new();

    if dev_mode {
        // An in-memory store starts empty, so the dev flag seeds a usable
        // account and project.
        identity.insert(
            "dev-token",
            User {
                id: "user-dev".to_string(),
                username: "dev".to_string(),
            },
        );
        let project = store.create_project("Dev Project", "user-dev")?;
        println!("Dev mode: token=dev-token project={}", project);
    }

    let state = Arc::new(AppState {
        engine: CollabEngine::new(),
        store: Arc::new(store),
        identity: Arc::new(identity),
    });

    let app = router(state).layer(CorsLayer::permissive());

    println!("Starting renscript workspace server...");
    println!("HTTP listening on 127.0.0.1:{}", port);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
