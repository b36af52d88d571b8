use std::sync::Arc;

use tracing::{info, warn};

use crate::auth::TokenKeys;
use crate::chat::{ChatPipeline, PipelineOptions};
use crate::config::Config;
use crate::db::Database;
use crate::error::ServerError;
use crate::llm::{openai::OpenAiConfig, ChatCompleter, Provider};

/// Everything a request handler needs, built once at startup.
pub struct AppState {
    pub config: Config,
    pub db: Arc<Database>,
    pub tokens: TokenKeys,
    pub chat: ChatPipeline,
}

impl AppState {
    pub fn new(config: Config) -> Result<Arc<Self>, ServerError> {
        std::fs::create_dir_all(&config.upload_dir)?;
        let db = Arc::new(Database::new(&config.database_path)?);

        let provider = Provider::new(
            OpenAiConfig {
                api_key: config.groq_api_key.clone(),
                base_url: config.groq_base_url.clone(),
                model: config.groq_model.clone(),
            },
            config.provider_timeout,
        )?;

        Ok(Self::from_parts(config, db, Arc::new(provider)))
    }

    /// Assemble state around an existing store and completer.
    pub fn from_parts(
        config: Config,
        db: Arc<Database>,
        completer: Arc<dyn ChatCompleter>,
    ) -> Arc<Self> {
        let options = PipelineOptions {
            fallback_mode: config.fallback_mode,
            match_direction: config.faq_match,
            model: Some(config.groq_model.clone()),
            public_url: config.public_url.clone(),
        };
        let chat = ChatPipeline::new(db.clone(), completer, options);
        let tokens = TokenKeys::new(&config.jwt_secret, config.token_ttl);

        Arc::new(Self {
            config,
            db,
            tokens,
            chat,
        })
    }

    /// Close the database once no handler holds the state any more.
    pub fn shutdown(self: Arc<Self>) {
        let state = match Arc::try_unwrap(self) {
            Ok(state) => state,
            Err(_) => {
                warn!("State still shared at shutdown, skipping explicit close");
                return;
            }
        };
        // The pipeline holds the other reference to the database.
        drop(state.chat);
        match Arc::try_unwrap(state.db) {
            Ok(db) => match db.close() {
                Ok(()) => info!("Database closed"),
                Err(e) => warn!("Failed to close database cleanly: {e}"),
            },
            Err(_) => warn!("Database still shared at shutdown, skipping explicit close"),
        }
    }
}
