use std::sync::Arc;

use argon2::Argon2;

use super::{
    accounts::hash_password,
    auth::TokenSigner,
    config::{Config, StoreBackend},
    gate::BootstrapGate,
    store::{MemoryStore, RecordStore, RedisStore, StoreError},
    utils::random_secret,
};

const DUMMY_SECRET_LEN: usize = 32;

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn RecordStore>,
    pub gate: BootstrapGate,
    pub tokens: TokenSigner,
    pub hasher: Argon2<'static>,
    /// Verified against on logins with an unknown email, so misses cost the
    /// same argon2 work as hits.
    pub dummy_hash: String,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Arc<Self>, StoreError> {
        let store: Arc<dyn RecordStore> = match config.store_backend {
            StoreBackend::Redis => Arc::new(RedisStore::connect(&config.redis_url).await?),
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
        };

        Ok(Self::assemble(config, store, Argon2::default()))
    }

    pub fn assemble(
        config: Config,
        store: Arc<dyn RecordStore>,
        hasher: Argon2<'static>,
    ) -> Arc<Self> {
        let gate = BootstrapGate::new(store.clone())
            .with_hasher(hasher.clone())
            .with_lock_timeout(config.gate_lock_timeout);
        let tokens = TokenSigner::new(&config.token_secret);
        let dummy_hash =
            hash_password(&hasher, &random_secret(DUMMY_SECRET_LEN)).unwrap_or_default();

        Arc::new(Self {
            config,
            store,
            gate,
            tokens,
            hasher,
            dummy_hash,
        })
    }
}
