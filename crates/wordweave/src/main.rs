use std::time::Duration;

use tracing_subscriber::EnvFilter;

use wordweave::{ServerError, WordweaveServer};
use wordweave_engine::{Engine, EngineConfig, LexiconProvider};
use wordweave_store::MemoryStore;

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("wordweave=info")),
        )
        .init();

    let addr = std::env::var("WORDWEAVE_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:9090".to_string());

    let engine = Engine::new(
        MemoryStore::new(),
        LexiconProvider::new(),
        EngineConfig::default(),
    );

    // Expiry is otherwise lazy; reclaim memory on a slow loop.
    let sweeper = engine.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            sweeper.store().sweep().await;
        }
    });

    let server = WordweaveServer::bind(&addr, engine).await?;
    server.run().await
}
