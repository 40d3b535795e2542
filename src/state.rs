use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use crate::{
    auth::{jwt::TokenKeys, password::Credentials, AuthService},
    clock::{Clock, SystemClock},
    config::{AppConfig, StoreBackend},
    contact::ContactService,
    mail::{LogRelay, MailRelay, WebhookRelay},
    store::{DocumentStore, MemoryStore, PgDocumentStore},
};

/// Everything a request needs. Built once at startup, read-only afterwards.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn DocumentStore>,
    pub auth: AuthService,
    pub contact: ContactService,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let store: Arc<dyn DocumentStore> = match config.store_backend {
            StoreBackend::Postgres => Arc::new(
                PgDocumentStore::connect(
                    &config.database_url,
                    config.max_connections,
                    clock.clone(),
                )
                .await?,
            ),
            StoreBackend::Memory => {
                warn!("using in-memory document store; data is lost on exit");
                Arc::new(MemoryStore::new(clock.clone()))
            }
        };

        let relay: Arc<dyn MailRelay> = match &config.mail.webhook_url {
            Some(url) => Arc::new(WebhookRelay::new(url.clone())),
            None => {
                warn!("MAIL_WEBHOOK_URL not set; contact emails will only be logged");
                Arc::new(LogRelay)
            }
        };

        Self::from_parts(Arc::new(config), store, clock, relay)
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        relay: Arc<dyn MailRelay>,
    ) -> anyhow::Result<Self> {
        let credentials = Credentials::new(&config.password).context("argon2 parameters")?;
        let keys = TokenKeys::new(&config.jwt, clock);
        let auth = AuthService::new(store.clone(), credentials, keys);
        let contact = ContactService::new(store.clone(), relay, config.mail.clone());
        Ok(Self {
            config,
            store,
            auth,
            contact,
        })
    }

    pub async fn shutdown(&self) {
        self.store.close().await;
        info!("document store closed");
    }
}

#[cfg(test)]
impl AppState {
    pub fn fake() -> Self {
        use crate::clock::ManualClock;

        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(MemoryStore::new(clock.clone()));
        Self::fake_with(clock, store, Arc::new(LogRelay))
    }

    pub fn fake_with(
        clock: Arc<crate::clock::ManualClock>,
        store: Arc<MemoryStore>,
        relay: Arc<dyn MailRelay>,
    ) -> Self {
        use crate::config::{JwtConfig, MailConfig, PasswordConfig};

        let config = Arc::new(AppConfig {
            database_url: "memory://".into(),
            database_name: "app_db".into(),
            store_backend: StoreBackend::Memory,
            max_connections: 1,
            jwt: JwtConfig {
                secret: "test".into(),
                issuer: "test-issuer".into(),
                audience: "test-aud".into(),
                ttl_minutes: 5,
            },
            password: PasswordConfig::cheap(),
            mail: MailConfig {
                recipient: "owner@example.com".into(),
                sender: None,
                webhook_url: None,
            },
        });
        Self::from_parts(config, store, clock, relay).expect("fake state builds")
    }
}
