use crate::services::conversation::manager::{FacilityCandidate, GeoPoint, GeoProvider};
use crate::services::conversation::types::HandlerResult;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const PROMPT_FOR_LOCATION: &str =
    "Please provide your location so I can find nearby medical facilities.";
const LOCATION_NOT_FOUND: &str = "Location not found. Please try a different location.";
const NO_FACILITIES_FOUND: &str = "No medical facilities found in this area";
const FACILITIES_FOUND: &str = "I found these medical facilities near you:";

/// A ranked medical facility in the handler payload.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Facility {
    pub name: String,
    #[serde(rename = "type")]
    pub category: String,
    pub lat: f64,
    pub lon: f64,
    pub address: String,
}

#[derive(Debug, Serialize)]
struct FacilityPayload {
    response: String,
    clinics: Vec<Facility>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Location handler: geocodes a free-text location and ranks nearby medical
/// facilities. Every failure mode is folded into the payload; this handler
/// never returns an error past its boundary.
pub struct ClinicLocator {
    geo_provider: Arc<dyn GeoProvider>,
    radius_meters: u32,
    max_results: usize,
    /// Fixed pause before geocoding, per the map provider's usage policy.
    rate_limit: Duration,
}

impl ClinicLocator {
    pub fn new(
        geo_provider: Arc<dyn GeoProvider>,
        radius_meters: u32,
        max_results: usize,
        rate_limit: Duration,
    ) -> Self {
        Self {
            geo_provider,
            radius_meters,
            max_results,
            rate_limit,
        }
    }

    pub async fn locate(&self, location: Option<&str>) -> HandlerResult {
        let Some(location) = location.filter(|l| !l.trim().is_empty()) else {
            // Valid terminal outcome, not an error
            return Self::payload(PROMPT_FOR_LOCATION, Vec::new(), None);
        };

        tokio::time::sleep(self.rate_limit).await;
        debug!("Geocoding: {}", location);

        let origin = match self.geo_provider.geocode(location).await {
            Ok(Some(point)) => point,
            Ok(None) => {
                info!("Geocoding miss for '{}'", location);
                return Self::payload(
                    &format!("Error finding clinics: {}", LOCATION_NOT_FOUND),
                    Vec::new(),
                    Some(LOCATION_NOT_FOUND.to_string()),
                );
            }
            Err(e) => {
                warn!("Geocoding failed for '{}': {}", location, e);
                return Self::payload(
                    &format!("Error finding clinics: Location service error: {}", e),
                    Vec::new(),
                    Some(format!("Location service error: {}", e)),
                );
            }
        };

        debug!("Coordinates: lat={}, lon={}", origin.lat, origin.lon);

        let candidates = match self
            .geo_provider
            .search_facilities(origin, self.radius_meters)
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("Facility search failed: {}", e);
                return Self::payload(
                    "Error finding clinics: Medical facility search failed",
                    Vec::new(),
                    Some("Medical facility search failed".to_string()),
                );
            }
        };

        let facilities = Self::rank_facilities(
            candidates.into_iter().map(Facility::from).collect(),
            origin,
            self.max_results,
        );

        if facilities.is_empty() {
            return Self::payload(
                &format!("Error finding clinics: {}", NO_FACILITIES_FOUND),
                Vec::new(),
                Some(NO_FACILITIES_FOUND.to_string()),
            );
        }

        info!("Found {} facilities near '{}'", facilities.len(), location);
        Self::payload(FACILITIES_FOUND, facilities, None)
    }

    fn payload(response: &str, clinics: Vec<Facility>, error: Option<String>) -> HandlerResult {
        let payload = FacilityPayload {
            response: response.to_string(),
            clinics,
            error,
        };
        HandlerResult {
            response: response.to_string(),
            // Serialization of a plain struct cannot fail
            data: serde_json::to_value(&payload).unwrap_or_default(),
        }
    }

    /// Squared planar distance in raw (lat, lon) space. Inaccurate at scale
    /// but consistent at the 5 km search radius, and it preserves the
    /// ordering existing clients observe.
    fn squared_distance(facility: &Facility, origin: GeoPoint) -> f64 {
        let dlat = facility.lat - origin.lat;
        let dlon = facility.lon - origin.lon;
        dlat * dlat + dlon * dlon
    }

    /// Sort ascending by squared distance from the origin, keep the nearest
    /// `max_results`.
    fn rank_facilities(
        mut facilities: Vec<Facility>,
        origin: GeoPoint,
        max_results: usize,
    ) -> Vec<Facility> {
        facilities.sort_by(|a, b| {
            Self::squared_distance(a, origin)
                .partial_cmp(&Self::squared_distance(b, origin))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        facilities.truncate(max_results);
        facilities
    }

    /// Join address fragments with ", ", dropping empty ones so missing
    /// fragments never produce stray separators.
    fn compose_address(fragments: &[&str]) -> String {
        fragments
            .iter()
            .filter(|f| !f.trim().is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl From<FacilityCandidate> for Facility {
    fn from(candidate: FacilityCandidate) -> Self {
        let address = ClinicLocator::compose_address(&[
            candidate.housenumber.as_deref().unwrap_or(""),
            candidate.street.as_deref().unwrap_or(""),
            candidate.city.as_deref().unwrap_or(""),
        ]);

        Self {
            name: candidate
                .name
                .unwrap_or_else(|| "Unnamed Facility".to_string()),
            category: candidate.category.unwrap_or_default(),
            lat: candidate.lat,
            lon: candidate.lon,
            address,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::conversation::manager::MockGeoProvider;

    fn locator(geo: MockGeoProvider) -> ClinicLocator {
        ClinicLocator::new(Arc::new(geo), 5000, 10, Duration::ZERO)
    }

    fn facility(name: &str, lat: f64, lon: f64) -> Facility {
        Facility {
            name: name.to_string(),
            category: "clinic".to_string(),
            lat,
            lon,
            address: String::new(),
        }
    }

    #[test]
    fn test_compose_address_drops_empty_fragments() {
        assert_eq!(
            ClinicLocator::compose_address(&["", "Main St", "Springfield"]),
            "Main St, Springfield"
        );
        assert_eq!(
            ClinicLocator::compose_address(&["12", "Main St", "Springfield"]),
            "12, Main St, Springfield"
        );
        assert_eq!(ClinicLocator::compose_address(&["", "", ""]), "");
        assert_eq!(
            ClinicLocator::compose_address(&["12", "", "Springfield"]),
            "12, Springfield"
        );
    }

    #[test]
    fn test_ranking_is_non_decreasing_and_truncated() {
        let origin = GeoPoint { lat: 0.0, lon: 0.0 };
        let mut candidates = Vec::new();
        for i in 0..15 {
            candidates.push(facility(&format!("f{}", i), 0.001 * (15 - i) as f64, 0.0));
        }

        let ranked = ClinicLocator::rank_facilities(candidates, origin, 10);

        assert_eq!(ranked.len(), 10);
        for pair in ranked.windows(2) {
            assert!(
                ClinicLocator::squared_distance(&pair[0], origin)
                    <= ClinicLocator::squared_distance(&pair[1], origin)
            );
        }
        // Nearest candidate first
        assert_eq!(ranked[0].name, "f14");
    }

    #[tokio::test]
    async fn test_no_location_prompts_for_one() {
        let result = locator(MockGeoProvider::new()).locate(None).await;

        assert_eq!(result.response, PROMPT_FOR_LOCATION);
        assert_eq!(result.data["clinics"], serde_json::json!([]));
        assert!(result.data.get("error").is_none());
    }

    #[tokio::test]
    async fn test_geocoding_miss_yields_not_found_payload() {
        let mut geo = MockGeoProvider::new();
        geo.expect_geocode().returning(|_| Ok(None));

        let result = locator(geo).locate(Some("xyzzy nowhere")).await;

        assert_eq!(result.data["error"], serde_json::json!(LOCATION_NOT_FOUND));
        assert_eq!(result.data["clinics"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_geocoding_error_is_absorbed_into_payload() {
        let mut geo = MockGeoProvider::new();
        geo.expect_geocode()
            .returning(|_| anyhow::bail!("connection refused"));

        let result = locator(geo).locate(Some("Springfield")).await;

        assert!(result.data["error"]
            .as_str()
            .unwrap()
            .contains("Location service error"));
        assert_eq!(result.data["clinics"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_facility_search_error_is_absorbed_into_payload() {
        let mut geo = MockGeoProvider::new();
        geo.expect_geocode()
            .returning(|_| Ok(Some(GeoPoint { lat: 39.8, lon: -89.6 })));
        geo.expect_search_facilities()
            .returning(|_, _| anyhow::bail!("overpass timeout"));

        let result = locator(geo).locate(Some("Springfield")).await;

        assert_eq!(
            result.data["error"],
            serde_json::json!("Medical facility search failed")
        );
    }

    #[tokio::test]
    async fn test_happy_path_ranks_and_composes_addresses() {
        let mut geo = MockGeoProvider::new();
        geo.expect_geocode()
            .returning(|_| Ok(Some(GeoPoint { lat: 0.0, lon: 0.0 })));
        geo.expect_search_facilities().returning(|_, _| {
            Ok(vec![
                FacilityCandidate {
                    name: Some("Far Clinic".to_string()),
                    category: Some("clinic".to_string()),
                    lat: 0.02,
                    lon: 0.0,
                    housenumber: None,
                    street: Some("Main St".to_string()),
                    city: Some("Springfield".to_string()),
                },
                FacilityCandidate {
                    name: None,
                    category: Some("hospital".to_string()),
                    lat: 0.001,
                    lon: 0.001,
                    housenumber: Some("12".to_string()),
                    street: Some("Elm St".to_string()),
                    city: Some("Springfield".to_string()),
                },
            ])
        });

        let result = locator(geo).locate(Some("Springfield")).await;

        let clinics = result.data["clinics"].as_array().unwrap();
        assert_eq!(clinics.len(), 2);
        // Nearest first; missing name replaced with placeholder
        assert_eq!(clinics[0]["name"], "Unnamed Facility");
        assert_eq!(clinics[0]["address"], "12, Elm St, Springfield");
        assert_eq!(clinics[1]["name"], "Far Clinic");
        assert_eq!(clinics[1]["address"], "Main St, Springfield");
        assert!(result.data.get("error").is_none());
    }
}
