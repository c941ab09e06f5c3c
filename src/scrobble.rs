use serde::{Deserialize, Serialize};

/// One logged play of a track.
///
/// The timestamp is kept exactly as Last.fm rendered it (`date["#text"]`,
/// e.g. `"01 Jan 2024, 12:34"`); it is parsed later by the daily counter so
/// that a malformed value only affects that one scrobble.
///
/// # Examples
///
/// ```rust
/// use lastfm_heatmap::Scrobble;
///
/// let scrobble = Scrobble {
///     name: "Paranoid Android".to_string(),
///     artist: "Radiohead".to_string(),
///     album: Some("OK Computer".to_string()),
///     date_text: Some("01 Jan 2024, 12:34".to_string()),
///     uts: Some(1704112440),
///     page: 1,
/// };
///
/// println!("{} by {} at {:?}", scrobble.name, scrobble.artist, scrobble.date_text);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scrobble {
    /// The track name/title
    pub name: String,
    /// The artist name
    pub artist: String,
    /// The album name (if available)
    pub album: Option<String>,
    /// Display text of the scrobble time, as returned by the API
    pub date_text: Option<String>,
    /// Unix timestamp of the scrobble, when the API provided one
    pub uts: Option<i64>,
    /// Page of the listening history this scrobble came from (1-indexed)
    pub page: u32,
}

/// One page of a user's recent tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrobblePage {
    /// The scrobbles on this page, newest first as served by the API
    pub scrobbles: Vec<Scrobble>,
    /// Current page number (1-indexed)
    pub page_number: u32,
    /// Total number of pages, if known
    ///
    /// Only relied on for the first page.
    pub total_pages: Option<u32>,
}

impl ScrobblePage {
    pub fn len(&self) -> usize {
        self.scrobbles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scrobbles.is_empty()
    }
}
