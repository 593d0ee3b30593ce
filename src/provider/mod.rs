//! Streaming providers
//!
//! A provider knows how to log in to one streaming site, list a show's
//! episodes, resolve an episode's stream, download it and hand out the
//! encrypted subtitle payloads. The episode pipeline drives every provider
//! through the same [`Provider`] trait.
mod crunchyroll;
mod daisuki;
mod http;

pub use crunchyroll::CrunchyrollProvider;
pub use daisuki::DaisukiProvider;

use crate::media::MediaToolError;
use crate::model::{Episode, Show};
use crate::session::Session;
use crate::subtitle::{Subtitle, SubtitleError, SubtitleListing};
use std::fmt;
use std::path::Path;
use thiserror::Error;
use url::Url;

/// Errors that can occur while talking to a provider
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Request to the provider failed
    #[error("Request failed: {0}")]
    RequestError(String),

    /// The provider answered with an unexpected HTTP status
    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    /// The provider rejected the credentials
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Failed to parse the provider's response
    #[error("Failed to parse provider response: {0}")]
    ParseError(String),

    /// The provider has nothing for the requested item
    #[error("Not found: {0}")]
    NotFound(String),

    /// A subtitle document could not be read
    #[error(transparent)]
    Subtitle(#[from] SubtitleError),

    /// The stream download tool failed
    #[error("Stream download failed: {0}")]
    Download(#[from] MediaToolError),
}

/// The providers this crate can rip from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Crunchyroll,
    Daisuki,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Crunchyroll, ProviderKind::Daisuki];

    /// Lowercase name, also the token matched against hosts and names
    pub fn name(self) -> &'static str {
        match self {
            ProviderKind::Crunchyroll => "crunchyroll",
            ProviderKind::Daisuki => "daisuki",
        }
    }

    /// Finds a provider whose token is contained in `value`, ignoring case
    fn match_token(value: &str) -> Option<Self> {
        let value = value.to_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| value.contains(kind.name()))
    }

    /// Selects a provider from the host of a show URL
    pub fn from_url(show_url: &str) -> Option<Self> {
        let url = Url::parse(show_url).ok()?;
        Self::match_token(url.host_str()?)
    }

    /// Selects a provider from an explicit name such as `crunchyroll`
    pub fn from_name(name: &str) -> Option<Self> {
        Self::match_token(name)
    }

    /// Creates the provider implementation for this kind
    pub fn create(self) -> Box<dyn Provider> {
        match self {
            ProviderKind::Crunchyroll => Box::new(CrunchyrollProvider::new()),
            ProviderKind::Daisuki => Box::new(DaisukiProvider::new()),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderKind::Crunchyroll => "Crunchyroll",
            ProviderKind::Daisuki => "Daisuki",
        };
        f.write_str(name)
    }
}

/// The capability set every streaming provider implements
///
/// All calls that need authenticated access take the session by reference;
/// providers never mutate it.
pub trait Provider {
    /// Which provider this is
    fn kind(&self) -> ProviderKind;

    /// Logs in and returns the authenticated session
    fn login(&self, username: &str, password: &str) -> Result<Session, ProviderError>;

    /// Lists a show's seasons and episodes
    fn list_episodes(&self, show_url: &str, session: &Session) -> Result<Show, ProviderError>;

    /// Resolves the stream of an episode at the requested quality
    ///
    /// Fills in `episode.download`.
    fn fetch_episode_info(
        &self,
        episode: &mut Episode,
        quality: &str,
        session: &Session,
    ) -> Result<(), ProviderError>;

    /// Downloads the resolved stream to `destination`
    fn fetch_video(
        &self,
        episode: &Episode,
        destination: &Path,
        session: &Session,
    ) -> Result<(), ProviderError>;

    /// Lists the subtitle tracks available for an episode
    fn subtitle_listing(
        &self,
        episode: &Episode,
        session: &Session,
    ) -> Result<SubtitleListing, ProviderError>;

    /// Fetches the encrypted payload of one subtitle track
    fn subtitle_payload(
        &self,
        episode: &Episode,
        track: &Subtitle,
        session: &Session,
    ) -> Result<Subtitle, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_url_matches_host() {
        assert_eq!(
            ProviderKind::from_url("http://www.crunchyroll.com/sword-art-online"),
            Some(ProviderKind::Crunchyroll)
        );
        assert_eq!(
            ProviderKind::from_url("https://www.DAISUKI.net/anime/detail.GUNDAM.html"),
            Some(ProviderKind::Daisuki)
        );
    }

    #[test]
    fn test_from_url_ignores_path() {
        assert_eq!(
            ProviderKind::from_url("https://example.com/crunchyroll/show"),
            None
        );
    }

    #[test]
    fn test_from_url_rejects_garbage() {
        assert_eq!(ProviderKind::from_url("not a url"), None);
    }

    #[test]
    fn test_from_name() {
        assert_eq!(
            ProviderKind::from_name("Crunchyroll"),
            Some(ProviderKind::Crunchyroll)
        );
        assert_eq!(ProviderKind::from_name("daisuki"), Some(ProviderKind::Daisuki));
        assert_eq!(ProviderKind::from_name("funimation"), None);
    }

    #[test]
    fn test_create_matches_kind() {
        for kind in ProviderKind::ALL {
            assert_eq!(kind.create().kind(), kind);
        }
    }
}
