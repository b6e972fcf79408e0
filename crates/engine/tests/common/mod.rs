#![allow(dead_code)]

use std::sync::Arc;

use sea_orm::{Database, DatabaseConnection};

use engine::{Engine, User};
use migration::MigratorTrait;

pub async fn engine_with_db() -> (Engine, DatabaseConnection) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = Engine::builder()
        .database(db.clone())
        .build()
        .await
        .unwrap();
    (engine, db)
}

pub async fn shared_engine() -> Arc<Engine> {
    let (engine, _db) = engine_with_db().await;
    Arc::new(engine)
}

/// Register `username` and fund the wallet with `balance_minor`.
pub async fn user_with_balance(engine: &Engine, username: &str, balance_minor: i64) -> User {
    let user = engine.register_user(username, "password").await.unwrap();
    if balance_minor > 0 {
        engine.credit(&user.id, balance_minor, None).await.unwrap();
    }
    engine.user(&user.id).await.unwrap()
}
