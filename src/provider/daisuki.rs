/// Daisuki provider implementation.
use super::http::{HttpClient, stream_headers};
use super::{Provider, ProviderError, ProviderKind};
use crate::media;
use crate::model::{DownloadState, Episode, Show};
use crate::session::Session;
use crate::subtitle::{self, Subtitle, SubtitleListing};
use log::debug;
use regex::Regex;
use serde::Deserialize;
use std::path::Path;

/// The cookie Daisuki sets only for a successful login
const USER_COOKIE: &str = "dsk_user";

/// Daisuki releases are not split into seasons
const SEASON: u32 = 1;

/// Episode list of a product as returned by the JSON API
#[derive(Debug, Deserialize)]
struct ProductResponse {
    title: String,
    #[serde(default)]
    episodes: Vec<ProductEpisode>,
}

#[derive(Debug, Deserialize)]
struct ProductEpisode {
    /// Episode number, sent as a string
    num: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(rename = "mediaId")]
    media_id: String,
    url: String,
}

/// Player initialization data of one episode
#[derive(Debug, Deserialize)]
struct PlayerInit {
    #[serde(rename = "playUrl")]
    play_url: Option<String>,
}

/// Provider for daisuki.net
///
/// Listings and stream info come from the site's JSON API, subtitles from the
/// player's caption endpoints.
pub struct DaisukiProvider {
    http: HttpClient,
    base_url: String,
}

impl DaisukiProvider {
    pub fn new() -> Self {
        Self {
            http: HttpClient::new(),
            base_url: "https://www.daisuki.net".to_string(),
        }
    }

    fn api(&self, path: &str) -> String {
        format!("{}/fastAPI/{}/", self.base_url, path)
    }
}

impl Default for DaisukiProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Extracts the product code from a show URL like `.../detail.GUNDAM.html`
fn product_code(show_url: &str) -> Option<String> {
    let regex = Regex::new(r"detail\.([A-Za-z0-9_-]+)\.html").ok()?;
    regex
        .captures(show_url)
        .map(|captures| captures[1].to_string())
}

/// Converts a product response into a show
///
/// Episodes keep the order the API lists them in.
fn parse_product(json: &str, base_url: &str) -> Result<Show, ProviderError> {
    let product: ProductResponse =
        serde_json::from_str(json).map_err(|e| ProviderError::ParseError(e.to_string()))?;

    if product.episodes.is_empty() {
        return Err(ProviderError::ParseError(format!(
            "no episodes found for {}",
            product.title
        )));
    }

    let episodes = product
        .episodes
        .into_iter()
        .map(|episode| {
            let number = episode.num.trim().parse().unwrap_or(0);
            let title = episode
                .title
                .map(|title| nanohtml2text::html2text(&title).trim().to_string())
                .filter(|title| !title.is_empty())
                .unwrap_or_else(|| format!("Episode {}", number));
            let url = if episode.url.starts_with('/') {
                format!("{}{}", base_url, episode.url)
            } else {
                episode.url
            };
            Episode::new(SEASON, number, title, episode.media_id, url)
        })
        .collect();

    Ok(Show::from_episodes(product.title, episodes))
}

fn parse_player_init(json: &str, media_id: &str) -> Result<String, ProviderError> {
    let init: PlayerInit =
        serde_json::from_str(json).map_err(|e| ProviderError::ParseError(e.to_string()))?;
    init.play_url
        .filter(|url| !url.is_empty())
        .ok_or_else(|| ProviderError::NotFound(format!("stream for media {}", media_id)))
}

impl Provider for DaisukiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Daisuki
    }

    fn login(&self, username: &str, password: &str) -> Result<Session, ProviderError> {
        let cookies = self.http.post_login(
            &self.api("login"),
            &[("emailAddress", username), ("password", password)],
        )?;

        let mut session = Session::new(self.kind().name(), username);
        for cookie in cookies {
            session.set_cookie(cookie.name, cookie.value);
        }

        if session.cookie(USER_COOKIE).is_none() {
            return Err(ProviderError::AuthenticationFailed(format!(
                "Daisuki did not accept the credentials for {}",
                username
            )));
        }

        Ok(session)
    }

    fn list_episodes(&self, show_url: &str, session: &Session) -> Result<Show, ProviderError> {
        let code = product_code(show_url).ok_or_else(|| {
            ProviderError::ParseError(format!("no product code in {}", show_url))
        })?;

        let json = self
            .http
            .get_text(&self.api("product"), &[("code", code.as_str())], session)?;
        let show = parse_product(&json, &self.base_url)?;
        debug!("{}: {} episodes", show.title, show.episode_count());
        Ok(show)
    }

    fn fetch_episode_info(
        &self,
        episode: &mut Episode,
        quality: &str,
        session: &Session,
    ) -> Result<(), ProviderError> {
        let json = self.http.post_form_text(
            &self.api("bgn/init"),
            &[("mediaId", episode.media_id.as_str()), ("quality", quality)],
            session,
        )?;
        let stream_url = parse_player_init(&json, &episode.media_id)?;

        episode.download = Some(DownloadState {
            quality: quality.to_string(),
            stream_url,
        });
        Ok(())
    }

    fn fetch_video(
        &self,
        episode: &Episode,
        destination: &Path,
        session: &Session,
    ) -> Result<(), ProviderError> {
        let download = episode.download.as_ref().ok_or_else(|| {
            ProviderError::NotFound(format!("stream info for {}", episode.title))
        })?;
        media::download_stream(&download.stream_url, &stream_headers(session), destination)?;
        Ok(())
    }

    fn subtitle_listing(
        &self,
        episode: &Episode,
        session: &Session,
    ) -> Result<SubtitleListing, ProviderError> {
        let xml = self.http.get_text(
            &self.api("caption/list"),
            &[("mediaId", episode.media_id.as_str())],
            session,
        )?;
        Ok(subtitle::parse_listing(&xml)?)
    }

    fn subtitle_payload(
        &self,
        episode: &Episode,
        track: &Subtitle,
        session: &Session,
    ) -> Result<Subtitle, ProviderError> {
        let script_id = track.id.to_string();
        let xml = self.http.get_text(
            &self.api("caption/script"),
            &[
                ("mediaId", episode.media_id.as_str()),
                ("scriptId", script_id.as_str()),
            ],
            session,
        )?;

        let mut payload = subtitle::parse_payload(&xml)?;
        if payload.title.is_empty() {
            payload.title = track.title.clone();
        }
        if payload.id == 0 {
            payload.id = track.id;
        }
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_code() {
        assert_eq!(
            product_code("https://www.daisuki.net/us/en/anime/detail.GUNDAMUC.html").as_deref(),
            Some("GUNDAMUC")
        );
        assert_eq!(product_code("https://www.daisuki.net/us/en/top.html"), None);
    }

    #[test]
    fn test_parse_product() {
        let json = r#"{
            "title": "Mobile Suit Gundam Unicorn",
            "episodes": [
                {"num": "1", "title": "Day of the Unicorn", "mediaId": "a1", "url": "/anime/watch.GUNDAMUC.1.html"},
                {"num": "2", "title": null, "mediaId": "a2", "url": "https://cdn.daisuki.net/watch/2"}
            ]
        }"#;

        let show = parse_product(json, "https://www.daisuki.net").unwrap();
        assert_eq!(show.title, "Mobile Suit Gundam Unicorn");
        assert_eq!(show.seasons.len(), 1);

        let episodes = &show.seasons[0].episodes;
        assert_eq!(episodes[0].season_number, 1);
        assert_eq!(episodes[0].title, "Day of the Unicorn");
        assert_eq!(
            episodes[0].url,
            "https://www.daisuki.net/anime/watch.GUNDAMUC.1.html"
        );
        assert_eq!(episodes[1].title, "Episode 2");
        assert_eq!(episodes[1].media_id, "a2");
        assert_eq!(episodes[1].url, "https://cdn.daisuki.net/watch/2");
    }

    #[test]
    fn test_parse_product_rejects_empty_listing() {
        let json = r#"{"title": "Nothing", "episodes": []}"#;
        assert!(matches!(
            parse_product(json, ""),
            Err(ProviderError::ParseError(_))
        ));
        assert!(parse_product("not json", "").is_err());
    }

    #[test]
    fn test_parse_player_init() {
        assert_eq!(
            parse_player_init(r#"{"playUrl": "https://cdn/master.m3u8"}"#, "a1").unwrap(),
            "https://cdn/master.m3u8"
        );
        assert!(matches!(
            parse_player_init(r#"{"playUrl": ""}"#, "a1"),
            Err(ProviderError::NotFound(_))
        ));
        assert!(matches!(
            parse_player_init("{}", "a1"),
            Err(ProviderError::NotFound(_))
        ));
    }
}
