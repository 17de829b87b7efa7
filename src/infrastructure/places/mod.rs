//! Geo-search collaborator
//!
//! [`GeoSearch`] is the injected interface to the external places provider;
//! [`GooglePlacesClient`] is the production implementation. [`PlacesService`]
//! wraps any client with short-lived dedup caches so repeated searches for
//! the same rounded coordinate (and repeated detail fetches for the same
//! place id) within the configured window never hit the provider twice.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mini_moka::sync::Cache;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::shared::{CoreError, Result};

/// A nearby-search hit, denormalized enough to be both persisted and shown
/// to the recommendation model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaceCandidate {
    pub place_id: String,
    pub name: String,
    pub rating: f64,
    pub user_ratings_total: Option<i32>,
    pub types: Vec<String>,
    pub price_level: Option<i32>,
    pub lat: f64,
    pub lng: f64,
    pub photo_url: Option<String>,
}

/// Full detail record for a single place
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaceDetails {
    pub place_id: String,
    pub name: String,
    pub address: Option<String>,
    pub telephone: Option<String>,
    pub rating: f64,
    pub lat: f64,
    pub lng: f64,
    pub photo_url: Option<String>,
}

/// External nearby-search provider
#[async_trait]
pub trait GeoSearch: Send + Sync {
    /// Bounded list of open restaurants around a position matching a keyword
    async fn nearby(
        &self,
        keyword: &str,
        lat: f64,
        lng: f64,
        radius_m: u32,
    ) -> Result<Vec<PlaceCandidate>>;

    /// Detail lookup for one place id; `None` when the provider does not
    /// know the id
    async fn details(&self, place_id: &str) -> Result<Option<PlaceDetails>>;
}

/// Google Places implementation of [`GeoSearch`]
pub struct GooglePlacesClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

const PLACES_BASE_URL: &str = "https://maps.googleapis.com/maps/api/place";

impl GooglePlacesClient {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                warn!("failed to build places http client: {e}");
                CoreError::UpstreamUnavailable("geo search unavailable")
            })?;
        Ok(Self {
            http,
            api_key,
            base_url: PLACES_BASE_URL.to_string(),
        })
    }

    /// Point the client somewhere else, used by tests with a local server
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Deserialize)]
struct NearbyResponse {
    #[serde(default)]
    results: Vec<NearbyResult>,
}

#[derive(Deserialize)]
struct NearbyResult {
    place_id: String,
    name: String,
    #[serde(default)]
    rating: f64,
    user_ratings_total: Option<i32>,
    #[serde(default)]
    types: Vec<String>,
    price_level: Option<i32>,
    geometry: Geometry,
    #[serde(default)]
    photos: Vec<Photo>,
}

#[derive(Deserialize)]
struct Geometry {
    location: Location,
}

#[derive(Deserialize)]
struct Location {
    lat: f64,
    lng: f64,
}

#[derive(Deserialize)]
struct Photo {
    #[serde(default)]
    photo_reference: String,
}

#[derive(Deserialize)]
struct DetailsResponse {
    result: Option<DetailsResult>,
}

#[derive(Deserialize)]
struct DetailsResult {
    place_id: String,
    #[serde(default)]
    name: String,
    formatted_address: Option<String>,
    formatted_phone_number: Option<String>,
    #[serde(default)]
    rating: f64,
    geometry: Geometry,
    #[serde(default)]
    photos: Vec<Photo>,
}

#[async_trait]
impl GeoSearch for GooglePlacesClient {
    async fn nearby(
        &self,
        keyword: &str,
        lat: f64,
        lng: f64,
        radius_m: u32,
    ) -> Result<Vec<PlaceCandidate>> {
        let url = format!("{}/nearbysearch/json", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("keyword", keyword),
                ("language", "zh-TW"),
                ("location", &format!("{lat},{lng}")),
                ("radius", &radius_m.to_string()),
                ("type", "restaurant"),
                ("opennow", "true"),
                ("key", &self.api_key),
            ])
            .send()
            .await
            .map_err(|e| {
                warn!("nearby search request failed: {e}");
                CoreError::UpstreamUnavailable("geo search failed")
            })?;

        if !response.status().is_success() {
            warn!("nearby search returned status {}", response.status());
            return Err(CoreError::UpstreamUnavailable("geo search failed"));
        }

        let body: NearbyResponse = response.json().await.map_err(|e| {
            warn!("nearby search returned malformed body: {e}");
            CoreError::UpstreamUnavailable("geo search failed")
        })?;

        Ok(body
            .results
            .into_iter()
            .map(|hit| PlaceCandidate {
                place_id: hit.place_id,
                name: hit.name,
                rating: hit.rating,
                user_ratings_total: hit.user_ratings_total,
                types: hit.types,
                price_level: hit.price_level,
                lat: hit.geometry.location.lat,
                lng: hit.geometry.location.lng,
                photo_url: hit
                    .photos
                    .into_iter()
                    .next()
                    .map(|photo| photo.photo_reference)
                    .filter(|r| !r.is_empty()),
            })
            .collect())
    }

    async fn details(&self, place_id: &str) -> Result<Option<PlaceDetails>> {
        let url = format!("{}/details/json", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("place_id", place_id),
                ("language", "zh-TW"),
                ("key", &self.api_key),
            ])
            .send()
            .await
            .map_err(|e| {
                warn!("place details request failed: {e}");
                CoreError::UpstreamUnavailable("geo search failed")
            })?;

        if !response.status().is_success() {
            warn!("place details returned status {}", response.status());
            return Err(CoreError::UpstreamUnavailable("geo search failed"));
        }

        let body: DetailsResponse = response.json().await.map_err(|e| {
            warn!("place details returned malformed body: {e}");
            CoreError::UpstreamUnavailable("geo search failed")
        })?;

        Ok(body.result.map(|place| PlaceDetails {
            place_id: place.place_id,
            name: place.name,
            address: place.formatted_address,
            telephone: place.formatted_phone_number,
            rating: place.rating,
            lat: place.geometry.location.lat,
            lng: place.geometry.location.lng,
            photo_url: place
                .photos
                .into_iter()
                .next()
                .map(|photo| photo.photo_reference)
                .filter(|r| !r.is_empty()),
        }))
    }
}

/// Dedup wrapper over a [`GeoSearch`] client.
///
/// Keys round coordinates to two decimals (roughly a city block) and include
/// the keyword so a cached candidate list is always valid for the request
/// that hits it.
pub struct PlacesService {
    client: Arc<dyn GeoSearch>,
    nearby_cache: Cache<String, Arc<Vec<PlaceCandidate>>>,
    details_cache: Cache<String, Arc<PlaceDetails>>,
}

impl PlacesService {
    pub fn new(client: Arc<dyn GeoSearch>, dedup_ttl: Duration) -> Self {
        Self {
            client,
            nearby_cache: Cache::builder().time_to_live(dedup_ttl).build(),
            details_cache: Cache::builder().time_to_live(dedup_ttl).build(),
        }
    }

    fn position_key(keyword: &str, lat: f64, lng: f64) -> String {
        format!("query:{lat:.2}:{lng:.2}:{keyword}")
    }

    pub async fn nearby(
        &self,
        keyword: &str,
        lat: f64,
        lng: f64,
        radius_m: u32,
    ) -> Result<Arc<Vec<PlaceCandidate>>> {
        let key = Self::position_key(keyword, lat, lng);
        if let Some(hit) = self.nearby_cache.get(&key) {
            debug!(%key, "nearby search served from dedup cache");
            return Ok(hit);
        }

        let candidates = Arc::new(self.client.nearby(keyword, lat, lng, radius_m).await?);
        self.nearby_cache.insert(key, candidates.clone());
        Ok(candidates)
    }

    pub async fn details(&self, place_id: &str) -> Result<Option<Arc<PlaceDetails>>> {
        let key = format!("query:{place_id}");
        if let Some(hit) = self.details_cache.get(&key) {
            debug!(%place_id, "place details served from dedup cache");
            return Ok(Some(hit));
        }

        match self.client.details(place_id).await? {
            Some(details) => {
                let details = Arc::new(details);
                self.details_cache.insert(key, details.clone());
                Ok(Some(details))
            }
            None => Ok(None),
        }
    }
}
