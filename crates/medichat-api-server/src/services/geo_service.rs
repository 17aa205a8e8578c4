use crate::config::GeoConfig;
use crate::services::conversation::manager::{FacilityCandidate, GeoPoint, GeoProvider};
use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

/// Amenity classes treated as medical facilities.
const MEDICAL_AMENITIES: &str = "hospital|clinic|doctors|pharmacy";

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    lat: Option<f64>,
    lon: Option<f64>,
    #[serde(default)]
    tags: std::collections::HashMap<String, String>,
}

/// OpenStreetMap clients: Nominatim for geocoding, Overpass for medical
/// point-of-interest search.
#[derive(Clone)]
pub struct GeoService {
    client: Client,
    nominatim_url: String,
    overpass_url: String,
    user_agent: String,
}

impl GeoService {
    pub fn new(config: GeoConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(config.timeout_seconds))
                .build()
                .unwrap_or_else(|_| Client::new()),
            nominatim_url: config.nominatim_url,
            overpass_url: config.overpass_url,
            user_agent: config.user_agent,
        }
    }

    async fn geocode_internal(&self, query: &str) -> Result<Option<GeoPoint>> {
        let url = format!("{}/search", self.nominatim_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", query),
                ("format", "jsonv2"),
                ("addressdetails", "1"),
                ("limit", "1"),
            ])
            .header("User-Agent", &self.user_agent)
            .send()
            .await
            .context("Failed to connect to geocoding service")?;

        if !response.status().is_success() {
            anyhow::bail!("Geocoding service error: {}", response.status());
        }

        let places: Vec<NominatimPlace> = response
            .json()
            .await
            .context("Failed to parse geocoding response")?;

        let Some(place) = places.first() else {
            debug!("Geocoding returned no results for '{}'", query);
            return Ok(None);
        };

        let lat: f64 = place.lat.parse().context("Invalid latitude in geocoding response")?;
        let lon: f64 = place.lon.parse().context("Invalid longitude in geocoding response")?;

        Ok(Some(GeoPoint { lat, lon }))
    }

    fn build_overpass_query(origin: GeoPoint, radius_meters: u32) -> String {
        format!(
            "[out:json];\nnode[\"amenity\"~\"{}\"](around:{},{},{});\nout body;",
            MEDICAL_AMENITIES, radius_meters, origin.lat, origin.lon
        )
    }

    async fn search_facilities_internal(
        &self,
        origin: GeoPoint,
        radius_meters: u32,
    ) -> Result<Vec<FacilityCandidate>> {
        let query = Self::build_overpass_query(origin, radius_meters);
        debug!("Overpass query within {}m of {:?}", radius_meters, origin);

        let response = self
            .client
            .post(&self.overpass_url)
            .header("User-Agent", &self.user_agent)
            .body(query)
            .send()
            .await
            .context("Failed to connect to facility search service")?;

        if !response.status().is_success() {
            anyhow::bail!("Facility search error: {}", response.status());
        }

        let body: OverpassResponse = response
            .json()
            .await
            .context("Failed to parse facility search response")?;

        let candidates = body
            .elements
            .into_iter()
            .filter_map(|element| {
                // Nodes without coordinates are unusable for ranking
                let (lat, lon) = (element.lat?, element.lon?);
                let tags = element.tags;
                Some(FacilityCandidate {
                    name: tags.get("name").cloned(),
                    category: tags.get("amenity").cloned(),
                    lat,
                    lon,
                    housenumber: tags.get("addr:housenumber").cloned(),
                    street: tags.get("addr:street").cloned(),
                    city: tags.get("addr:city").cloned(),
                })
            })
            .collect();

        Ok(candidates)
    }
}

#[async_trait::async_trait]
impl GeoProvider for GeoService {
    async fn geocode(&self, query: &str) -> Result<Option<GeoPoint>> {
        self.geocode_internal(query).await
    }

    async fn search_facilities(
        &self,
        origin: GeoPoint,
        radius_meters: u32,
    ) -> Result<Vec<FacilityCandidate>> {
        self.search_facilities_internal(origin, radius_meters).await
    }
}
