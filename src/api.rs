use crate::config::DEFAULT_API_URL;
use crate::scrobble::{Scrobble, ScrobblePage};
use crate::{HeatmapError, Result};
use async_trait::async_trait;
use http_client::{HttpClient, Request};
use http_types::{Method, Url};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// LastFmApiClient trait and implementation
// =============================================================================

/// Access to one page of `user.getRecentTracks`.
///
/// This is the seam the fetch layer is written against, so tests can swap in
/// a fake or a `mockall` mock instead of a real HTTP client.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait LastFmApiClient: Send + Sync {
    /// Fetch and parse a single page of the user's recent tracks.
    async fn get_recent_tracks_page(
        &self,
        query: &RecentTracksQuery,
        page: u32,
    ) -> Result<ScrobblePage>;
}

/// Request parameters shared by every page of one fetch run.
#[derive(Clone, PartialEq, Eq)]
pub struct RecentTracksQuery {
    pub user: String,
    pub api_key: String,
    pub limit: u32,
}

impl RecentTracksQuery {
    pub fn new(user: impl Into<String>, api_key: impl Into<String>, limit: u32) -> Self {
        Self {
            user: user.into(),
            api_key: api_key.into(),
            limit,
        }
    }

    /// URL-encoded query string for the given page.
    pub fn to_query_string(&self, page: u32) -> String {
        format!(
            "method=user.getrecenttracks&user={}&api_key={}&format=json&limit={}&page={}",
            urlencoding::encode(&self.user),
            urlencoding::encode(&self.api_key),
            self.limit,
            page
        )
    }
}

impl fmt::Debug for RecentTracksQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecentTracksQuery")
            .field("user", &self.user)
            .field("api_key", &"<redacted>")
            .field("limit", &self.limit)
            .finish()
    }
}

/// [`LastFmApiClient`] backed by any [`HttpClient`].
///
/// The HTTP client sits behind an `Arc`, so clones are cheap and all
/// concurrent page requests of a run share one connection pool.
#[derive(Clone, Debug)]
pub struct LastFmApiClientImpl {
    client: Arc<dyn HttpClient + Send + Sync>,
    base_url: Url,
}

impl LastFmApiClientImpl {
    /// Create a client for the public Last.fm endpoint.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use lastfm_heatmap::LastFmApiClientImpl;
    ///
    /// let http_client = http_client::native::NativeClient::new();
    /// let client = LastFmApiClientImpl::new(Box::new(http_client));
    /// ```
    pub fn new(client: Box<dyn HttpClient + Send + Sync>) -> Self {
        Self {
            client: Arc::from(client),
            base_url: default_api_url(),
        }
    }

    /// Create a client for a custom endpoint, e.g. a local test server.
    pub fn with_base_url(
        client: Box<dyn HttpClient + Send + Sync>,
        base_url: &str,
    ) -> Result<Self> {
        let base_url = base_url
            .parse::<Url>()
            .map_err(|e| HeatmapError::Config(format!("Invalid API URL '{base_url}': {e}")))?;
        Ok(Self {
            client: Arc::from(client),
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Full request URL for one page.
    pub fn recent_tracks_url(&self, query: &RecentTracksQuery, page: u32) -> Url {
        let mut url = self.base_url.clone();
        url.set_query(Some(&query.to_query_string(page)));
        url
    }
}

fn default_api_url() -> Url {
    Url::parse(DEFAULT_API_URL).expect("default API URL is valid")
}

#[async_trait]
impl LastFmApiClient for LastFmApiClientImpl {
    async fn get_recent_tracks_page(
        &self,
        query: &RecentTracksQuery,
        page: u32,
    ) -> Result<ScrobblePage> {
        let url = self.recent_tracks_url(query, page);
        let request_start = std::time::Instant::now();

        let request = Request::new(Method::Get, url);
        let mut response = self
            .client
            .send(request)
            .await
            .map_err(|e| HeatmapError::Http(e.to_string()))?;

        let status = response.status();
        log::debug!(
            "GET recent tracks page {} for '{}': {} in {}ms",
            page,
            query.user,
            status,
            request_start.elapsed().as_millis()
        );

        let body = response
            .body_string()
            .await
            .map_err(|e| HeatmapError::Http(e.to_string()))?;

        if !status.is_success() {
            let api_code = match parse_api_error(&body) {
                Some(HeatmapError::Api { code, message }) => {
                    log::debug!("Last.fm error {code} for page {page}: {message}");
                    Some(code)
                }
                _ => None,
            };
            return Err(HeatmapError::Status {
                status: status.into(),
                api_code,
            });
        }

        parse_recent_tracks_response(&body, page)
    }
}

// =============================================================================
// Response parsing
// =============================================================================

#[derive(Deserialize)]
pub struct ApiRecentTracksResponse {
    pub recenttracks: Option<ApiRecentTracks>,
    pub error: Option<i64>,
    pub message: Option<String>,
}

#[derive(Deserialize)]
pub struct ApiRecentTracks {
    pub track: Option<OneOrMany<ApiTrack>>,
    #[serde(rename = "@attr")]
    pub attr: Option<ApiPaginationAttr>,
}

/// Last.fm collapses a one-element `track` list into a bare object.
#[derive(Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

#[derive(Deserialize)]
pub struct ApiTrack {
    #[serde(default)]
    pub name: String,
    pub artist: Option<ApiTextField>,
    pub album: Option<ApiTextField>,
    pub date: Option<ApiDate>,
    #[serde(rename = "@attr")]
    pub attr: Option<ApiTrackAttr>,
}

#[derive(Deserialize)]
pub struct ApiTextField {
    #[serde(rename = "#text", default)]
    pub text: String,
}

#[derive(Deserialize)]
pub struct ApiDate {
    pub uts: Option<String>,
    #[serde(rename = "#text")]
    pub text: Option<String>,
}

#[derive(Deserialize)]
pub struct ApiTrackAttr {
    pub nowplaying: Option<String>,
}

#[derive(Deserialize)]
pub struct ApiPaginationAttr {
    pub page: Option<String>,
    #[serde(rename = "totalPages")]
    pub total_pages: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: i64,
    #[serde(default)]
    message: String,
}

/// Decode a Last.fm error payload, if the body is one.
pub fn parse_api_error(body: &str) -> Option<HeatmapError> {
    let error: ApiErrorBody = serde_json::from_str(body).ok()?;
    Some(HeatmapError::Api {
        code: error.error,
        message: error.message,
    })
}

/// Parse a `user.getRecentTracks` JSON body into a [`ScrobblePage`].
///
/// A body without `recenttracks.track` yields
/// [`HeatmapError::MalformedResponse`]. Now-playing entries are dropped since
/// they have not been scrobbled yet.
pub fn parse_recent_tracks_response(json: &str, requested_page: u32) -> Result<ScrobblePage> {
    let response: ApiRecentTracksResponse =
        serde_json::from_str(json).map_err(|e| HeatmapError::Parse(e.to_string()))?;

    if let Some(code) = response.error {
        return Err(HeatmapError::Api {
            code,
            message: response.message.unwrap_or_default(),
        });
    }

    let recenttracks = response
        .recenttracks
        .ok_or_else(|| HeatmapError::MalformedResponse("missing 'recenttracks'".to_string()))?;
    let tracks = recenttracks
        .track
        .ok_or_else(|| HeatmapError::MalformedResponse("missing 'recenttracks.track'".to_string()))?
        .into_vec();

    let attr = recenttracks.attr;
    let page_number = attr
        .as_ref()
        .and_then(|a| a.page.as_deref())
        .and_then(|p| p.parse().ok())
        .unwrap_or(requested_page);
    let total_pages = attr
        .as_ref()
        .and_then(|a| a.total_pages.as_deref())
        .and_then(|p| p.parse().ok());

    let scrobbles = tracks
        .into_iter()
        .filter(|t| {
            t.attr
                .as_ref()
                .and_then(|attr| attr.nowplaying.as_deref())
                != Some("true")
        })
        .map(|t| Scrobble {
            name: t.name,
            artist: t.artist.map(|a| a.text).unwrap_or_default(),
            album: t.album.map(|a| a.text).filter(|a| !a.is_empty()),
            date_text: t.date.as_ref().and_then(|d| d.text.clone()),
            uts: t
                .date
                .as_ref()
                .and_then(|d| d.uts.as_deref())
                .and_then(|uts| uts.parse().ok()),
            page: requested_page,
        })
        .collect();

    Ok(ScrobblePage {
        scrobbles,
        page_number,
        total_pages,
    })
}
