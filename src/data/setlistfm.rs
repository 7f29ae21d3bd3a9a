//! setlist.fm client for concerts a user attended

use chrono::NaiveDate;
use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

use super::http::{require_credential, require_param, Upstream};
use super::{non_empty, Show};
use crate::error::{ApiError, ConfigError};
use crate::pagination::{clamp_page, UpstreamEnvelope};
use crate::schema::{
    validate_collection, CollectionSchema, Field, FieldKind, Schema, ValidationFailure,
};

/// Environment variable holding the API key
pub const API_KEY_VAR: &str = "SETLISTFM_API_KEY";

const SETLISTFM_BASE_URL: &str = "https://api.setlist.fm/rest/1.0";

const SERVICE: &str = "setlist.fm";

/// Page size setlist.fm uses for attended lists
const ITEMS_PER_PAGE: u32 = 20;

/// setlist.fm event dates are day-first
const EVENT_DATE_FORMAT: &str = "%d-%m-%Y";

const ATTENDED: CollectionSchema = CollectionSchema {
    envelope: Schema {
        name: "setlistfm.attended",
        fields: &[
            Field::required("/page", FieldKind::Numeric),
            Field::required("/total", FieldKind::Numeric),
            Field::required("/itemsPerPage", FieldKind::Numeric),
        ],
    },
    items: "/setlist",
    item: Schema {
        name: "setlistfm.setlist",
        fields: &[
            Field::required("/id", FieldKind::Text),
            Field::required("/eventDate", FieldKind::Date(EVENT_DATE_FORMAT)),
            Field::required("/artist/name", FieldKind::Text),
            Field::required("/venue/name", FieldKind::Text),
            Field::required("/venue/city/name", FieldKind::Text),
            Field::required("/venue/city/country/name", FieldKind::Text),
            Field::optional("/venue/city/country/code", FieldKind::Text),
            Field::optional("/tour", FieldKind::Object),
            Field::optional("/tour/name", FieldKind::Text),
            Field::optional("/url", FieldKind::Text),
        ],
    },
};

/// Parameters for an attended shows request
///
/// setlist.fm fixes its own page size, so only the page number is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendedShowsQuery {
    pub user: String,
    pub page: u32,
}

impl AttendedShowsQuery {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            page: 1,
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEnvelope {
    total: u64,
    items_per_page: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSetlist {
    id: String,
    event_date: String,
    artist: RawNamed,
    venue: RawVenue,
    #[serde(default)]
    tour: Option<RawOptionalNamed>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawNamed {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawOptionalNamed {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawVenue {
    name: String,
    city: RawCity,
}

#[derive(Debug, Deserialize)]
struct RawCity {
    name: String,
    country: RawCountry,
}

#[derive(Debug, Deserialize)]
struct RawCountry {
    name: String,
    #[serde(default)]
    code: Option<String>,
}

/// Client for the setlist.fm attended shows feed
#[derive(Debug, Clone)]
pub struct SetlistClient {
    upstream: Upstream,
    api_key: String,
    base_url: String,
}

impl SetlistClient {
    /// Creates a client, failing immediately if the API key is absent
    pub fn new(api_key: Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            upstream: Upstream::new(SERVICE),
            api_key: require_credential(API_KEY_VAR, api_key)?,
            base_url: SETLISTFM_BASE_URL.to_string(),
        })
    }

    /// Points the client at a different API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Fetches one page of shows the user marked as attended
    ///
    /// setlist.fm answers 404 when the requested page holds no setlists,
    /// which is reported as an empty page.
    pub async fn attended_shows(
        &self,
        query: &AttendedShowsQuery,
    ) -> Result<UpstreamEnvelope<Show>, ApiError> {
        let user = require_param("user", &query.user)?;
        let url = self.attended_url(user)?;
        let page = clamp_page(query.page).to_string();

        let request = self
            .upstream
            .get(url.as_str())
            .header("x-api-key", self.api_key.as_str())
            .header("Accept", "application/json")
            .query(&[("p", page.as_str())]);

        let payload = match self.upstream.fetch_json(request, ATTENDED.envelope.name).await {
            Ok(payload) => payload,
            Err(err) if err.status() == Some(404) => {
                debug!(service = SERVICE, page = %page, "no attended setlists on page");
                return Ok(UpstreamEnvelope::page(Vec::new()).with_page_size(Some(ITEMS_PER_PAGE)));
            }
            Err(err) => return Err(err),
        };
        let collection =
            validate_collection(payload, &ATTENDED).map_err(|f| self.upstream.mismatch(f))?;
        let degraded = collection.degraded_count();
        if degraded > 0 {
            debug!(service = SERVICE, degraded, "optional fields nulled");
        }

        let envelope: RawEnvelope = self
            .upstream
            .decode(ATTENDED.envelope.name, collection.envelope)?;

        let shows = collection
            .items
            .into_iter()
            .map(|record| {
                let raw: RawSetlist = self.upstream.decode(ATTENDED.item.name, record)?;
                self.to_show(raw)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(UpstreamEnvelope::page(shows)
            .with_total(Some(envelope.total))
            .with_page_size(Some(envelope.items_per_page)))
    }

    /// `{base}/user/{user}/attended` with the user name path-encoded
    fn attended_url(&self, user: &str) -> Result<Url, ApiError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidRequest(format!("unusable base URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(["user", user, "attended"]);
        Ok(url)
    }

    fn to_show(&self, raw: RawSetlist) -> Result<Show, ApiError> {
        let event_date = NaiveDate::parse_from_str(&raw.event_date, EVENT_DATE_FORMAT)
            .map_err(|_| {
                self.upstream.mismatch(ValidationFailure::unreadable(
                    ATTENDED.item.name,
                    "unparseable eventDate",
                ))
            })?;

        Ok(Show {
            id: raw.id,
            artist: raw.artist.name,
            venue: raw.venue.name,
            city: raw.venue.city.name,
            country: raw.venue.city.country.name,
            country_code: non_empty(raw.venue.city.country.code),
            event_date,
            tour: non_empty(raw.tour.and_then(|tour| tour.name)),
            url: non_empty(raw.url),
        })
    }
}
