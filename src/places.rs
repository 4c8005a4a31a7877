use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::errors::{AppError, AppResult};
use crate::model::{PlaceRecord, PriceTier};
use crate::resolver::PlaceLookup;

const DETAIL_FIELDS: &str =
    "name,formatted_address,website,price_level,address_component,photos,url";
const LOCALITY: &str = "locality";
const COUNTRY: &str = "country";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPlaceDetails {
    pub name: Option<String>,
    pub website: Option<String>,
    pub price_level: Option<serde_json::Value>,
    pub formatted_address: Option<String>,
    pub url: Option<String>,
    #[serde(default)]
    pub address_components: Vec<AddressComponent>,
    #[serde(default)]
    pub photos: Vec<PhotoRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddressComponent {
    pub long_name: Option<String>,
    #[serde(default)]
    pub types: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PhotoRef {
    pub photo_reference: Option<String>,
}

#[async_trait]
pub trait PlaceProvider: Send + Sync {
    async fn details(&self, place_id: &str) -> AppResult<Option<RawPlaceDetails>>;
    async fn find_place_id(&self, query: &str) -> AppResult<Option<String>>;
}

#[derive(Clone)]
pub struct PlaceNormalizer {
    provider: Arc<dyn PlaceProvider>,
}

impl PlaceNormalizer {
    pub fn new(provider: Arc<dyn PlaceProvider>) -> Self {
        Self { provider }
    }

    pub async fn lookup(&self, lookup: &PlaceLookup, identifier: &str) -> AppResult<PlaceRecord> {
        if let Some(place_id) = lookup.place_id.as_deref() {
            match self.provider.details(place_id).await {
                Ok(Some(raw)) => {
                    debug!(place_id, "resolved place details by identifier");
                    return Ok(normalize_details(raw, identifier));
                }
                Ok(None) => {
                    warn!(place_id, "no details for identifier; falling back to text search")
                }
                Err(err) => {
                    warn!(?err, place_id, "details by identifier failed; falling back to text search")
                }
            }
        }

        let place_id = self
            .provider
            .find_place_id(&lookup.query)
            .await?
            .ok_or_else(|| AppError::NotFound(lookup.query.clone()))?;
        let raw = self
            .provider
            .details(&place_id)
            .await?
            .ok_or_else(|| AppError::NotFound(lookup.query.clone()))?;
        info!(place_id = %place_id, query = %lookup.query, "resolved place details by text search");
        Ok(normalize_details(raw, identifier))
    }
}

pub fn normalize_details(raw: RawPlaceDetails, identifier: &str) -> PlaceRecord {
    let city = first_component(&raw.address_components, LOCALITY);
    let country = first_component(&raw.address_components, COUNTRY);
    let price = PriceTier::from_level(raw.price_level.as_ref().and_then(|v| v.as_i64()));
    let photo_reference = raw
        .photos
        .into_iter()
        .next()
        .and_then(|photo| photo.photo_reference)
        .and_then(non_blank);

    PlaceRecord {
        name: raw
            .name
            .and_then(non_blank)
            .unwrap_or_else(|| identifier.to_string()),
        website: raw.website.and_then(non_blank),
        price,
        city,
        country,
        map_link: raw.url.and_then(non_blank),
        address: raw.formatted_address.and_then(non_blank),
        photo_reference,
        cuisine: None,
    }
}

fn first_component(components: &[AddressComponent], kind: &str) -> Option<String> {
    components
        .iter()
        .find(|component| component.types.iter().any(|t| t == kind))
        .and_then(|component| component.long_name.clone())
        .and_then(non_blank)
}

fn non_blank(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

pub struct GooglePlacesClient {
    http: Client,
    api_key: SecretString,
    base_url: String,
    photo_max_width: u32,
}

#[derive(Deserialize)]
struct ApiEnvelope<T> {
    status: Option<String>,
    error_message: Option<String>,
    #[serde(flatten)]
    body: T,
}

#[derive(Deserialize)]
struct DetailsBody {
    result: Option<RawPlaceDetails>,
}

#[derive(Deserialize)]
struct FindPlaceBody {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct TextSearchBody {
    #[serde(default)]
    results: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    place_id: Option<String>,
}

impl<T> ApiEnvelope<T> {
    fn into_body(self) -> AppResult<T> {
        if let Some(message) = self.error_message {
            return Err(AppError::Provider(format!("google places: {message}")));
        }
        match self.status.as_deref() {
            None | Some("OK") | Some("ZERO_RESULTS") | Some("NOT_FOUND") => Ok(self.body),
            Some(other) => Err(AppError::Provider(format!("google places status {other}"))),
        }
    }
}

impl GooglePlacesClient {
    pub fn new(http: Client, api_key: SecretString, base_url: &str, photo_max_width: u32) -> Self {
        Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            photo_max_width,
        }
    }

    pub(crate) fn photo_request(&self, reference: &str) -> reqwest::RequestBuilder {
        let max_width = self.photo_max_width.to_string();
        self.http.get(format!("{}/photo", self.base_url)).query(&[
            ("maxwidth", max_width.as_str()),
            ("photoreference", reference),
            ("key", self.api_key.expose_secret()),
        ])
    }

    async fn first_text_search_hit(&self, query: &str) -> AppResult<Option<String>> {
        let response = self
            .http
            .get(format!("{}/textsearch/json", self.base_url))
            .query(&[("query", query), ("key", self.api_key.expose_secret())])
            .send()
            .await?
            .error_for_status()?;
        let envelope: ApiEnvelope<TextSearchBody> = response.json().await?;
        Ok(envelope
            .into_body()?
            .results
            .into_iter()
            .find_map(|candidate| candidate.place_id))
    }
}

// Feature ids from expanded share links look like `0x…:0x…`.
fn id_param(place_id: &str) -> &'static str {
    if place_id.starts_with("0x") {
        "ftid"
    } else {
        "place_id"
    }
}

#[async_trait]
impl PlaceProvider for GooglePlacesClient {
    async fn details(&self, place_id: &str) -> AppResult<Option<RawPlaceDetails>> {
        let response = self
            .http
            .get(format!("{}/details/json", self.base_url))
            .query(&[
                (id_param(place_id), place_id),
                ("fields", DETAIL_FIELDS),
                ("key", self.api_key.expose_secret()),
            ])
            .send()
            .await?
            .error_for_status()?;
        let envelope: ApiEnvelope<DetailsBody> = response.json().await?;
        Ok(envelope.into_body()?.result)
    }

    async fn find_place_id(&self, query: &str) -> AppResult<Option<String>> {
        let response = self
            .http
            .get(format!("{}/findplacefromtext/json", self.base_url))
            .query(&[
                ("input", query),
                ("inputtype", "textquery"),
                ("fields", "place_id"),
                ("key", self.api_key.expose_secret()),
            ])
            .send()
            .await?
            .error_for_status()?;
        let envelope: ApiEnvelope<FindPlaceBody> = response.json().await?;
        let found = envelope
            .into_body()?
            .candidates
            .into_iter()
            .find_map(|candidate| candidate.place_id);
        if found.is_some() {
            return Ok(found);
        }

        debug!(query, "find place returned no candidates; trying text search");
        self.first_text_search_hit(query).await
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct TestPlacesProvider {
        details: Mutex<Vec<AppResult<Option<RawPlaceDetails>>>>,
        found: Mutex<Vec<AppResult<Option<String>>>>,
        detail_calls: Mutex<Vec<String>>,
        search_calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PlaceProvider for TestPlacesProvider {
        async fn details(&self, place_id: &str) -> AppResult<Option<RawPlaceDetails>> {
            self.detail_calls.lock().push(place_id.to_string());
            self.details.lock().pop().unwrap_or(Ok(None))
        }

        async fn find_place_id(&self, query: &str) -> AppResult<Option<String>> {
            self.search_calls.lock().push(query.to_string());
            self.found.lock().pop().unwrap_or(Ok(None))
        }
    }

    fn raw(value: serde_json::Value) -> RawPlaceDetails {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn extracts_all_fields() {
        let record = normalize_details(
            raw(json!({
                "name": "Rose's Luxury",
                "website": "https://rosesluxury.com",
                "price_level": 2,
                "formatted_address": "717 8th St SE, Washington, DC 20003, USA",
                "url": "https://maps.google.com/?cid=1",
                "address_components": [
                    {"long_name": "Washington", "types": ["locality", "political"]},
                    {"long_name": "United States", "types": ["country", "political"]}
                ],
                "photos": [{"photo_reference": "ref-1"}, {"photo_reference": "ref-2"}]
            })),
            "input",
        );

        assert_eq!(record.name, "Rose's Luxury");
        assert_eq!(record.website.as_deref(), Some("https://rosesluxury.com"));
        assert_eq!(record.price.render(), "💵💵");
        assert_eq!(record.city.as_deref(), Some("Washington"));
        assert_eq!(record.country.as_deref(), Some("United States"));
        assert_eq!(record.map_link.as_deref(), Some("https://maps.google.com/?cid=1"));
        assert_eq!(record.photo_reference.as_deref(), Some("ref-1"));
        assert!(record.cuisine.is_none());
    }

    #[test]
    fn first_locality_wins() {
        let record = normalize_details(
            raw(json!({
                "name": "Twin Cities Diner",
                "address_components": [
                    {"long_name": "Minneapolis", "types": ["locality"]},
                    {"long_name": "Saint Paul", "types": ["locality"]}
                ]
            })),
            "input",
        );
        assert_eq!(record.city.as_deref(), Some("Minneapolis"));
        assert!(record.country.is_none());
    }

    #[test]
    fn missing_data_stays_absent_and_name_falls_back_to_identifier() {
        let record = normalize_details(
            raw(json!({
                "price_level": "expensive",
                "address_components": [{"long_name": "Ontario", "types": ["administrative_area_level_1"]}]
            })),
            "Rose's Luxury",
        );
        assert_eq!(record.name, "Rose's Luxury");
        assert_eq!(record.price, PriceTier::Unknown);
        assert!(record.city.is_none());
        assert!(record.website.is_none());
        assert!(record.photo_reference.is_none());
    }

    #[tokio::test]
    async fn identifier_lookup_skips_text_search() {
        let provider = Arc::new(TestPlacesProvider::default());
        provider
            .details
            .lock()
            .push(Ok(Some(raw(json!({"name": "By Id"})))));
        let normalizer = PlaceNormalizer::new(provider.clone());

        let record = normalizer
            .lookup(
                &PlaceLookup {
                    place_id: Some("0x1:0x2".into()),
                    query: "By Id".into(),
                },
                "By Id",
            )
            .await
            .unwrap();
        assert_eq!(record.name, "By Id");
        assert_eq!(provider.detail_calls.lock().as_slice(), ["0x1:0x2".to_string()]);
        assert!(provider.search_calls.lock().is_empty());
    }

    #[tokio::test]
    async fn failed_identifier_lookup_falls_back_to_text_search() {
        let provider = Arc::new(TestPlacesProvider::default());
        {
            let mut details = provider.details.lock();
            details.push(Ok(Some(raw(json!({"name": "By Search"})))));
            details.push(Err(AppError::Provider("INVALID_REQUEST".into())));
        }
        provider.found.lock().push(Ok(Some("ChIJsearch".into())));
        let normalizer = PlaceNormalizer::new(provider.clone());

        let record = normalizer
            .lookup(
                &PlaceLookup {
                    place_id: Some("0xbad".into()),
                    query: "By Search".into(),
                },
                "By Search",
            )
            .await
            .unwrap();
        assert_eq!(record.name, "By Search");
        assert_eq!(
            provider.detail_calls.lock().as_slice(),
            ["0xbad".to_string(), "ChIJsearch".to_string()]
        );
        assert_eq!(provider.search_calls.lock().as_slice(), ["By Search".to_string()]);
    }

    #[tokio::test]
    async fn no_candidates_yields_not_found() {
        let provider = Arc::new(TestPlacesProvider::default());
        let normalizer = PlaceNormalizer::new(provider.clone());

        let err = normalizer
            .lookup(&PlaceLookup::query_only("Nowhere"), "Nowhere")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(provider.detail_calls.lock().is_empty());
    }

    #[test]
    fn feature_ids_use_ftid_parameter() {
        assert_eq!(id_param("0x89b7c7:0x1a2b"), "ftid");
        assert_eq!(id_param("ChIJ123"), "place_id");
    }
}
