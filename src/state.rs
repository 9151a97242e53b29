use std::sync::Arc;

use tracing::info;

use crate::{
    auth::{PasswordHasher, SessionStore},
    clock::Clock,
    error::AppResult,
    ledger::RuntimeLedger,
    models::NewUser,
    store::{DocumentStore, ItemStore, RuntimePeriodStore, StoreError, UserStore},
};

pub const DEMO_USERNAME: &str = "test";
pub const DEMO_PASSWORD: &str = "password";
pub const DEMO_NAME: &str = "Test User";

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub items: Arc<dyn ItemStore>,
    pub sessions: Arc<SessionStore>,
    pub hasher: PasswordHasher,
    pub ledger: RuntimeLedger,
}

impl AppState {
    /// State backed by a single document store for all three collections.
    pub fn new(store: Arc<DocumentStore>, clock: Arc<dyn Clock>, hasher: PasswordHasher) -> Self {
        Self::with_stores(store.clone(), store.clone(), store, clock, hasher)
    }

    pub fn with_stores(
        users: Arc<dyn UserStore>,
        items: Arc<dyn ItemStore>,
        periods: Arc<dyn RuntimePeriodStore>,
        clock: Arc<dyn Clock>,
        hasher: PasswordHasher,
    ) -> Self {
        Self {
            users,
            items,
            sessions: Arc::new(SessionStore::new()),
            hasher,
            ledger: RuntimeLedger::new(periods, clock),
        }
    }

    /// Creates the `test` / `password` account unless the username is taken.
    pub async fn ensure_demo_user(&self) -> AppResult<bool> {
        if self.users.find_user_by_username(DEMO_USERNAME).await?.is_some() {
            return Ok(false);
        }

        let password_hash = self.hasher.hash(DEMO_PASSWORD).await?;
        let created = self
            .users
            .insert_user(NewUser {
                username: DEMO_USERNAME.to_string(),
                password_hash,
                name: DEMO_NAME.to_string(),
            })
            .await;

        match created {
            Ok(user) => {
                info!(user_id = %user.id, username = DEMO_USERNAME, "demo user created");
                Ok(true)
            }
            Err(StoreError::Duplicate(_)) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}
