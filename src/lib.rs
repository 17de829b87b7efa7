//! Tastemap core
//!
//! Backend core for a social restaurant-discovery app: users collect, like
//! and dislike restaurants, curate them into maps, post diaries about their
//! visits, and follow each other. Every read is viewer-aware, so listings
//! carry both global engagement counts and this-viewer flags in one query.
//! A recommendation bot ties the places provider and a text-completion
//! model together into a conversational search.

pub mod config;
pub mod infrastructure;
pub mod operations;
pub mod shared;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use tracing::info;

use crate::config::AppConfig;
use crate::infrastructure::auth::{AuthService, GoogleTokenVerifier, LoginInfo, TokenVerifier};
use crate::infrastructure::completion::{OpenAiClient, TextCompletion};
use crate::infrastructure::database::entities::{user, User};
use crate::infrastructure::database::Database;
use crate::infrastructure::places::{GeoSearch, GooglePlacesClient, PlacesService};
use crate::infrastructure::storage::{BlobStore, LocalBlobStore};
use crate::operations::bot::{BotPolicy, RecommendationBot};
use crate::operations::diaries::DiaryService;
use crate::operations::maps::MapService;
use crate::operations::restaurants::RestaurantService;
use crate::operations::users::UserService;
use crate::shared::Viewer;

/// Install the global tracing subscriber. `RUST_LOG` overrides the
/// configured level. Call once; embedding hosts with their own subscriber
/// skip this.
pub fn init_logging(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}

/// External collaborators behind the core, swappable for tests
pub struct Collaborators {
    pub verifier: Arc<dyn TokenVerifier>,
    pub geo: Arc<dyn GeoSearch>,
    pub completion: Arc<dyn TextCompletion>,
    pub blobs: Arc<dyn BlobStore>,
}

/// The assembled core: one instance per process
pub struct Core {
    pub config: AppConfig,
    pub auth: AuthService,
    pub restaurants: Arc<RestaurantService>,
    pub maps: Arc<MapService>,
    pub diaries: Arc<DiaryService>,
    pub users: Arc<UserService>,
    pub bot: RecommendationBot,
    db: Arc<DatabaseConnection>,
}

impl Core {
    /// Open or create a core at the given data directory with the real
    /// upstream clients
    pub async fn new(data_dir: &Path) -> Result<Self> {
        let config = AppConfig::load_or_create(data_dir)?;

        let collaborators = Collaborators {
            verifier: Arc::new(GoogleTokenVerifier::new(Duration::from_secs(
                config.places.timeout_secs,
            ))?),
            geo: Arc::new(GooglePlacesClient::new(
                config.places.api_key.clone(),
                Duration::from_secs(config.places.timeout_secs),
            )?),
            completion: Arc::new(OpenAiClient::new(
                config.completion.api_key.clone(),
                config.completion.model.clone(),
                Duration::from_secs(config.completion.timeout_secs),
            )?),
            blobs: Arc::new(LocalBlobStore::new(config.data_dir.join("blobs"))),
        };

        Self::with_collaborators(config, collaborators).await
    }

    /// Assemble a core from explicit collaborators. Tests inject fakes here.
    pub async fn with_collaborators(
        config: AppConfig,
        collaborators: Collaborators,
    ) -> Result<Self> {
        let database = Database::create(&config.database_path()).await?;
        database.migrate().await?;
        let db = Arc::new(database.conn().clone());

        Ok(Self::wire(config, db, collaborators))
    }

    /// Core over an in-memory database, for tests
    pub async fn in_memory(config: AppConfig, collaborators: Collaborators) -> Result<Self> {
        let database = Database::in_memory().await?;
        database.migrate().await?;
        let db = Arc::new(database.conn().clone());

        Ok(Self::wire(config, db, collaborators))
    }

    fn wire(config: AppConfig, db: Arc<DatabaseConnection>, collaborators: Collaborators) -> Self {
        let auth = AuthService::new(
            db.clone(),
            collaborators.verifier,
            Duration::from_secs(config.cache.token_ttl_secs),
        );
        let places = Arc::new(PlacesService::new(
            collaborators.geo,
            Duration::from_secs(config.cache.geo_dedup_ttl_secs),
        ));
        let restaurants = Arc::new(RestaurantService::new(db.clone(), places.clone()));
        let maps = Arc::new(MapService::new(db.clone(), restaurants.clone()));
        let diaries = Arc::new(DiaryService::new(db.clone()));
        let users = Arc::new(UserService::new(db.clone(), collaborators.blobs));
        let bot = RecommendationBot::new(
            collaborators.completion,
            places,
            restaurants.clone(),
            BotPolicy {
                max_attempts: config.bot.max_attempts,
                search_radius_m: config.bot.search_radius_m,
            },
        );

        info!("core assembled");
        Self {
            config,
            auth,
            restaurants,
            maps,
            diaries,
            users,
            bot,
            db,
        }
    }

    /// Verify a credential and get-or-create the user. A first login also
    /// creates the user's personal default map.
    pub async fn login(&self, token: &str) -> shared::Result<LoginInfo> {
        let login = self.auth.login(token).await?;
        if login.is_new {
            self.provision_default_map(login.user_id).await?;
        }
        Ok(login)
    }

    async fn provision_default_map(&self, user_id: i32) -> shared::Result<()> {
        let Some(row) = User::find_by_id(user_id).one(&*self.db).await? else {
            return Ok(());
        };
        if row.map_id.is_some() {
            return Ok(());
        }

        let map_id = self.maps.create_default_for(user_id, &row.name).await?;
        let mut active: user::ActiveModel = row.into();
        active.map_id = Set(Some(map_id));
        active.update(&*self.db).await?;
        info!(user_id, map_id, "provisioned default map");
        Ok(())
    }

    /// Resolve an optional credential for read paths
    pub async fn viewer(&self, token: Option<&str>) -> Viewer {
        self.auth.resolve_optional(token).await
    }
}
