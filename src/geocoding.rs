use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

use crate::models::Geometry;

/// Mapbox forward-geocoding endpoint (mapbox.places dataset).
pub const MAPBOX_GEOCODING_URL: &str = "https://api.mapbox.com/geocoding/v5/mapbox.places";

/// GeocodingError
///
/// Forward geocoding is not retried and has no fallback, so every variant ends the request.
#[derive(Debug, Error)]
pub enum GeocodingError {
    #[error("geocoding request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("geocoding service answered with status {0}")]
    Status(u16),

    #[error("no coordinates found for {0:?}")]
    NoMatch(String),

    #[error("invalid geocoding endpoint: {0}")]
    Endpoint(String),
}

/// Geocoder
///
/// Turns a free-text location into a point. Swappable so handler tests never touch the network.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn forward(&self, query: &str) -> Result<Geometry, GeocodingError>;
}

pub type GeocoderState = Arc<dyn Geocoder>;

#[derive(Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    geometry: Geometry,
}

/// MapboxGeocoder
///
/// `Geocoder` backed by the Mapbox Geocoding API. Asks for a single best match.
#[derive(Clone)]
pub struct MapboxGeocoder {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl MapboxGeocoder {
    pub fn new(access_token: &str) -> Self {
        Self::with_base_url(MAPBOX_GEOCODING_URL, access_token)
    }

    pub fn with_base_url(base_url: &str, access_token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
        }
    }

    /// Builds `{base}/{query}.json?limit=1&access_token=..`, percent-encoding the query.
    pub fn request_url(&self, query: &str) -> Result<Url, GeocodingError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| GeocodingError::Endpoint(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| GeocodingError::Endpoint(self.base_url.clone()))?
            .push(&format!("{query}.json"));
        url.query_pairs_mut()
            .append_pair("limit", "1")
            .append_pair("access_token", &self.access_token);
        Ok(url)
    }
}

#[async_trait]
impl Geocoder for MapboxGeocoder {
    async fn forward(&self, query: &str) -> Result<Geometry, GeocodingError> {
        let url = self.request_url(query)?;
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(GeocodingError::Status(response.status().as_u16()));
        }

        let collection = response.json::<FeatureCollection>().await?;
        let geometry = collection
            .features
            .into_iter()
            .next()
            .map(|feature| feature.geometry)
            .ok_or_else(|| GeocodingError::NoMatch(query.to_string()))?;

        tracing::debug!(%query, lng = geometry.longitude(), lat = geometry.latitude(), "geocoded location");
        Ok(geometry)
    }
}

/// MockGeocoder
///
/// Test double returning a fixed point, or failing on demand.
#[derive(Clone)]
pub struct MockGeocoder {
    pub point: Geometry,
    pub should_fail: bool,
}

impl MockGeocoder {
    pub fn new() -> Self {
        Self {
            point: Geometry::point(-104.9903, 39.7392),
            should_fail: false,
        }
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::new()
        }
    }
}

impl Default for MockGeocoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Geocoder for MockGeocoder {
    async fn forward(&self, query: &str) -> Result<Geometry, GeocodingError> {
        if self.should_fail {
            return Err(GeocodingError::NoMatch(query.to_string()));
        }
        Ok(self.point.clone())
    }
}
