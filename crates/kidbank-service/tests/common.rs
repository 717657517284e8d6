//! Common test utilities for kidbank integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use chrono::Duration;
use tempfile::TempDir;

use kidbank_core::{Actor, Child, Family, Parent};
use kidbank_service::{create_router, sign_token, AppState, ServiceConfig};
use kidbank_store::{AccountStore, SqliteStore, Store};

/// Secret the harness signs tokens with.
pub const JWT_SECRET: &str = "test-jwt-secret";

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Direct store access for seeding and assertions.
    pub store: Arc<SqliteStore>,
    /// Temporary directory for the database (kept alive for test duration).
    pub _temp_dir: TempDir,
    /// The seeded family.
    pub family: Family,
    /// A parent of the family.
    pub parent: Parent,
    /// A child of the family, starting at zero balance and rate.
    pub child: Child,
}

/// Configuration pointing at `database_url`.
pub fn test_config(database_url: String) -> ServiceConfig {
    ServiceConfig {
        server_port: 0,
        database_url,
        database_max_connections: 2,
        jwt_secret: Some(JWT_SECRET.into()),
        frontend_url: "http://localhost:3000".into(),
        cors_origins: vec!["*".into()],
        max_body_bytes: 1024 * 1024,
        request_timeout_seconds: 30,
        allowance_tick_seconds: 60,
        interest_tick_seconds: 60,
    }
}

impl TestHarness {
    /// Create a new test harness with a fresh on-disk database.
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let url = format!("sqlite://{}", temp_dir.path().join("kidbank.db").display());
        let store = Arc::new(
            SqliteStore::connect(&url, 2)
                .await
                .expect("Failed to open store"),
        );

        let family = Family::new("Lovelace");
        let parent = Parent::new(family.id, "Ada");
        let child = Child::new(family.id, "Byron", 0);
        store.create_family(&family).await.expect("seed family");
        store.create_parent(&parent).await.expect("seed parent");
        store.create_child(&child).await.expect("seed child");

        let dyn_store: Arc<dyn Store> = store.clone();
        let state = AppState::new(dyn_store, test_config(url)).expect("valid config");
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            store,
            _temp_dir: temp_dir,
            family,
            parent,
            child,
        }
    }

    /// Bearer header for `actor`.
    pub fn auth_header(actor: &Actor) -> String {
        let token = sign_token(JWT_SECRET, actor, Duration::hours(1)).expect("sign token");
        format!("Bearer {token}")
    }

    /// Bearer header for the seeded parent.
    pub fn parent_auth_header(&self) -> String {
        Self::auth_header(&Actor::parent(self.family.id, self.parent.id))
    }

    /// Bearer header for the seeded child.
    pub fn child_auth_header(&self) -> String {
        Self::auth_header(&Actor::child(self.family.id, self.child.id))
    }

    /// Seed another family with one parent and one child; returns the
    /// parent's header and the child.
    pub async fn other_family(&self) -> (String, Child) {
        let family = Family::new("Babbage");
        let parent = Parent::new(family.id, "Charles");
        let child = Child::new(family.id, "Benjamin", 0);
        self.store.create_family(&family).await.expect("seed family");
        self.store.create_parent(&parent).await.expect("seed parent");
        self.store.create_child(&child).await.expect("seed child");
        (Self::auth_header(&Actor::parent(family.id, parent.id)), child)
    }

    /// Seed a sibling of the seeded child.
    pub async fn sibling(&self, name: &str) -> Child {
        let child = Child::new(self.family.id, name, 0);
        self.store.create_child(&child).await.expect("seed child");
        child
    }

    /// `/api/children/{id}{suffix}` for the seeded child.
    pub fn child_path(&self, suffix: &str) -> String {
        format!("/api/children/{}{suffix}", self.child.id)
    }
}
