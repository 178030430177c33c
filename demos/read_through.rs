//! Read-through caching with `get_set`.
//!
//! Runs against memcached when `MEMCACHE_SERVERS` is set, otherwise against
//! the in-process store. Set `RUST_LOG=memcache_getset=debug` to see the
//! miss/populate trace.

use memcache_getset::{
    Client, ClientBuilder, ClientConfig, Computed, MemoryStore, MemoryStoreConfig,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct User {
    id: String,
    name: String,
    email: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct ApiKey {
    key: String,
    user_id: String,
    created_at: i64,
}

#[derive(Debug)]
struct NotInDatabase(String);

impl std::fmt::Display for NotInDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "no row for {}", self.0)
    }
}

impl std::error::Error for NotInDatabase {}

async fn load_user(id: &str) -> Result<Computed<User>, NotInDatabase> {
    println!("Loading user from database: {}", id);
    tokio::time::sleep(Duration::from_millis(20)).await;
    match id {
        "chronark" => Ok(Computed::cache(User {
            id: id.to_string(),
            name: "Andreas".to_string(),
            email: "andreas@example.com".to_string(),
        })),
        // Placeholder rows are returned but never cached
        "guest" => Ok(Computed::skip(User {
            id: id.to_string(),
            name: "Guest".to_string(),
            email: String::new(),
        })),
        _ => Err(NotInDatabase(id.to_string())),
    }
}

async fn open(namespace: &str) -> Result<Client, Box<dyn std::error::Error>> {
    if env::var("MEMCACHE_SERVERS").is_ok() {
        let mut config = ClientConfig::from_env();
        config.namespace = namespace.to_string();
        return Ok(Client::connect(&config).await?);
    }
    Ok(ClientBuilder::new()
        .namespace(namespace)
        .build(MemoryStore::new(MemoryStoreConfig::default()))?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let users = open("users_").await?;
    let api_keys = open("apikeys_").await?;

    // First call misses and loads from the database
    let user: User = users
        .get_or_compute("chronark", 60, || load_user("chronark"))
        .await?;
    println!("User: {:?}", user);

    // Second call is served from the cache
    let user: User = users
        .get_or_compute("chronark", 60, || async {
            println!("This won't be called - using cached value");
            Ok::<_, NotInDatabase>(Computed::empty())
        })
        .await?;
    println!("User (cached): {:?}", user);

    // Skipped values reach the caller but not the store
    let guest: User = users.get_or_compute("guest", 60, || load_user("guest")).await?;
    println!("Guest: {:?}, cached: {}", guest, users.exists("guest").await?);

    // Callback failures come back as errors and nothing is written
    if let Err(err) = users
        .get_or_compute::<User, _, _, _>("nobody", 60, || load_user("nobody"))
        .await
    {
        println!("Lookup failed: {}", err);
    }

    api_keys
        .set(
            "key_123",
            &ApiKey {
                key: "sk_test_123".to_string(),
                user_id: "chronark".to_string(),
                created_at: 1234567890,
            },
            120,
        )
        .await?;
    let api_key: ApiKey = api_keys.get("key_123").await?;
    println!("ApiKey: {:?}", api_key);

    // Same key name, different namespace
    println!("key_123 in users: {}", users.exists("key_123").await?);

    let views = users.inc("views:chronark", 1, 0).await?;
    println!("Views: {}", views);

    users.delete(&["chronark", "views:chronark"]).await?;
    api_keys.delete(&["key_123"]).await?;

    users.close().await?;
    api_keys.close().await?;
    Ok(())
}
