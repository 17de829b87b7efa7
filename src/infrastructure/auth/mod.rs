//! Viewer resolution against the external identity provider
//!
//! A bearer credential resolves to a [`Viewer`] via the injected
//! [`TokenVerifier`]. Resolved identities are cached for a bounded time so
//! the provider is not re-queried on every request.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use mini_moka::sync::Cache;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::infrastructure::database::entities::{user, User, UserActive};
use crate::shared::{CoreError, Result, Viewer};

/// Claims the identity provider vouches for
#[derive(Clone, Debug, Deserialize)]
pub struct VerifiedToken {
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

/// External identity provider
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verify a bearer credential, failing with `Unauthenticated` when it
    /// is missing, expired or forged
    async fn verify(&self, token: &str) -> Result<VerifiedToken>;
}

const TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

/// Google tokeninfo implementation of [`TokenVerifier`]
pub struct GoogleTokenVerifier {
    http: reqwest::Client,
    endpoint: String,
}

impl GoogleTokenVerifier {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                warn!("failed to build tokeninfo http client: {e}");
                CoreError::UpstreamUnavailable("identity provider unavailable")
            })?;
        Ok(Self {
            http,
            endpoint: TOKENINFO_URL.to_string(),
        })
    }

    /// Point the verifier somewhere else, used by tests with a local server
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl TokenVerifier for GoogleTokenVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedToken> {
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("id_token", token)])
            .send()
            .await
            .map_err(|e| {
                warn!("tokeninfo request failed: {e}");
                CoreError::UpstreamUnavailable("identity provider unavailable")
            })?;

        if !response.status().is_success() {
            return Err(CoreError::Unauthenticated);
        }

        response.json::<VerifiedToken>().await.map_err(|e| {
            warn!("tokeninfo returned malformed body: {e}");
            CoreError::Unauthenticated
        })
    }
}

/// Result of a login: the resolved user id and whether the row was created
/// on this call
#[derive(Copy, Clone, Debug, Serialize)]
pub struct LoginInfo {
    pub user_id: i32,
    pub is_new: bool,
}

/// Resolves bearer credentials to viewers, creating user rows on first sight
/// of an email
pub struct AuthService {
    db: Arc<DatabaseConnection>,
    verifier: Arc<dyn TokenVerifier>,
    cache: Cache<String, Viewer>,
}

impl AuthService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        verifier: Arc<dyn TokenVerifier>,
        token_ttl: Duration,
    ) -> Self {
        Self {
            db,
            verifier,
            cache: Cache::builder().time_to_live(token_ttl).build(),
        }
    }

    /// Verify the credential and get-or-create the user row
    pub async fn login(&self, token: &str) -> Result<LoginInfo> {
        let claims = self.verifier.verify(token).await?;

        let existing = User::find()
            .filter(user::Column::Email.eq(claims.email.as_str()))
            .one(&*self.db)
            .await?;

        let (user_id, is_new) = match existing {
            Some(row) => (row.id, false),
            None => {
                let display_name = claims
                    .name
                    .clone()
                    .unwrap_or_else(|| claims.email.split('@').next().unwrap_or("user").to_string());
                let row = UserActive {
                    name: Set(display_name),
                    email: Set(claims.email.clone()),
                    avatar_url: Set(claims.picture.clone()),
                    created: Set(Utc::now()),
                    ..Default::default()
                }
                .insert(&*self.db)
                .await?;
                debug!(user_id = row.id, "created user on first login");
                (row.id, true)
            }
        };

        self.cache.insert(token.to_string(), Viewer::user(user_id));
        Ok(LoginInfo { user_id, is_new })
    }

    /// Resolve a credential to a viewer, required (mutation paths)
    pub async fn resolve(&self, token: &str) -> Result<Viewer> {
        if let Some(viewer) = self.cache.get(&token.to_string()) {
            return Ok(viewer);
        }
        let info = self.login(token).await?;
        Ok(Viewer::user(info.user_id))
    }

    /// Resolve an optional credential for read paths: absence or a failed
    /// verification degrade to the anonymous sentinel instead of erroring
    pub async fn resolve_optional(&self, token: Option<&str>) -> Viewer {
        match token {
            Some(token) => self.resolve(token).await.unwrap_or(Viewer::ANONYMOUS),
            None => Viewer::ANONYMOUS,
        }
    }
}
