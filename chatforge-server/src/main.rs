use std::sync::Arc;

use chatforge_core::store::{
    InMemoryTenantStore, InMemoryVectorStore, PgTenantStore, PgVectorStore, TenantStore,
    VectorStore,
};
use chatforge_core::ChatforgeConfig;
use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use chatforge_server::http::{start_http_server, HttpState};
use chatforge_server::subsystems::embedder;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "chatforge.toml")]
    config: String,

    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present; real deployments set the environment directly
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match ChatforgeConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging; RUST_LOG wins over service.log_level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    // Stores
    let (pool, tenants, vectors) = if config.database.enabled {
        let pool = match chatforge_core::db::create_pool(&config.database).await {
            Ok(p) => p,
            Err(e) => {
                eprintln!("Failed to connect to database: {}", e);
                std::process::exit(1);
            }
        };
        chatforge_core::db::run_migrations(&pool).await?;
        (
            Some(pool.clone()),
            Arc::new(PgTenantStore::new(pool.clone())) as Arc<dyn TenantStore>,
            Arc::new(PgVectorStore::new(pool, &config.store)) as Arc<dyn VectorStore>,
        )
    } else {
        tracing::warn!("Database disabled; using in-memory stores (data is lost on exit)");
        (
            None,
            Arc::new(InMemoryTenantStore::new()) as Arc<dyn TenantStore>,
            Arc::new(InMemoryVectorStore::new()) as Arc<dyn VectorStore>,
        )
    };

    if args.health {
        let Some(pool) = &pool else {
            println!("✅ In-memory stores (database disabled)");
            return Ok(());
        };

        match chatforge_core::db::health_check(pool).await {
            Ok(v) => println!("✅ PostgreSQL connected: {}", v),
            Err(e) => {
                println!("❌ PostgreSQL connection failed: {}", e);
                std::process::exit(1);
            }
        }

        match chatforge_core::db::check_pgvector(pool).await {
            Ok(v) => println!("✅ pgvector version: {}", v),
            Err(e) => {
                println!("❌ pgvector check failed: {}", e);
                std::process::exit(1);
            }
        }

        println!("✅ Chatforge DB health check passed");
        return Ok(());
    }

    // Provider clients
    let embedding = embedder::create_backend_from_config(&config)?;
    let gateway = embedder::create_gateway_from_config(&config)?;

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    let state = HttpState::new(config, pool, tenants, vectors, embedding, gateway);
    start_http_server(state, tx.subscribe()).await?;

    Ok(())
}
