/// Crunchyroll provider implementation.
use super::http::{HttpClient, stream_headers};
use super::{Provider, ProviderError, ProviderKind};
use crate::media;
use crate::model::{DownloadState, Episode, Show};
use crate::session::Session;
use crate::subtitle::{self, Subtitle, SubtitleListing};
use log::debug;
use regex::Regex;
use std::path::Path;

/// The cookie Crunchyroll sets only for a successful login
const USER_COOKIE: &str = "c_userid";

/// Provider for crunchyroll.com
///
/// Show pages are scraped, everything else goes through the XML RPC endpoint
/// the web player uses.
pub struct CrunchyrollProvider {
    http: HttpClient,
    base_url: String,
}

impl CrunchyrollProvider {
    pub fn new() -> Self {
        Self {
            http: HttpClient::new(),
            base_url: "https://www.crunchyroll.com".to_string(),
        }
    }

    fn rpc(
        &self,
        request: &str,
        params: &[(&str, &str)],
        session: &Session,
    ) -> Result<String, ProviderError> {
        let url = format!("{}/xml/", self.base_url);
        let mut query = vec![("req", request)];
        query.extend_from_slice(params);
        self.http.get_text(&url, &query, session)
    }
}

impl Default for CrunchyrollProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps a quality name to the player's `(video_format, video_quality)` pair
fn format_for_quality(quality: &str) -> (&'static str, &'static str) {
    match quality.to_lowercase().as_str() {
        "720p" | "hd" => ("106", "62"),
        "480p" | "sd" => ("106", "61"),
        "360p" | "low" => ("106", "60"),
        _ => ("108", "80"),
    }
}

/// Extracts the text of the first `<tag>` element
fn element_text(xml: &str, tag: &str) -> Option<String> {
    let pattern = format!(r"<{tag}>\s*(?:<!\[CDATA\[)?(.*?)(?:\]\]>)?\s*</{tag}>");
    let regex = Regex::new(&pattern).ok()?;
    regex
        .captures(xml)
        .map(|captures| html_unescape(&captures[1]))
        .filter(|text| !text.is_empty())
}

fn html_unescape(text: &str) -> String {
    nanohtml2text::html2text(text).trim().to_string()
}

/// Scrapes the show title and episode links from a show page
///
/// The page lists seasons newest first and episodes within a season newest
/// first; the result is put into watching order. A page without season
/// sections is a single season.
fn parse_show_page(html: &str, base_url: &str) -> Result<Show, ProviderError> {
    let title_regex = Regex::new(r#"<meta property="og:title" content="([^"]*)""#)
        .map_err(|e| ProviderError::ParseError(e.to_string()))?;
    let episode_regex = Regex::new(
        r#"<a href="(/[^"]+/episode-(\d+)[^"]*-(\d+))"[^>]*title="([^"]*)""#,
    )
    .map_err(|e| ProviderError::ParseError(e.to_string()))?;

    let title = title_regex
        .captures(html)
        .map(|captures| html_unescape(&captures[1]))
        .filter(|title| !title.is_empty())
        .ok_or_else(|| ProviderError::ParseError("show page has no title".to_string()))?;

    let mut sections: Vec<&str> = html.split(r#"class="season-dropdown"#).collect();
    if sections.len() > 1 {
        // Everything before the first marker is page chrome
        sections.remove(0);
    }
    sections.reverse();

    let mut episodes = Vec::new();
    for (index, section) in sections.into_iter().enumerate() {
        let season_number = index as u32 + 1;
        let mut section_episodes: Vec<Episode> = episode_regex
            .captures_iter(section)
            .map(|captures| {
                let episode_number = captures[2].parse().unwrap_or(0);
                Episode::new(
                    season_number,
                    episode_number,
                    html_unescape(&captures[4]),
                    &captures[3],
                    format!("{}{}", base_url, &captures[1]),
                )
            })
            .collect();
        section_episodes.reverse();
        episodes.extend(section_episodes);
    }

    if episodes.is_empty() {
        return Err(ProviderError::ParseError(format!(
            "no episodes found for {}",
            title
        )));
    }

    Ok(Show::from_episodes(title, episodes))
}

impl Provider for CrunchyrollProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Crunchyroll
    }

    fn login(&self, username: &str, password: &str) -> Result<Session, ProviderError> {
        let url = format!("{}/?a=formhandler", self.base_url);
        let cookies = self.http.post_login(
            &url,
            &[
                ("formname", "RpcApiUser_Login"),
                ("fail_url", "http://www.crunchyroll.com/login"),
                ("name", username),
                ("password", password),
            ],
        )?;

        let mut session = Session::new(self.kind().name(), username);
        for cookie in cookies {
            session.set_cookie(cookie.name, cookie.value);
        }

        if session.cookie(USER_COOKIE).is_none() {
            return Err(ProviderError::AuthenticationFailed(format!(
                "Crunchyroll did not accept the credentials for {}",
                username
            )));
        }

        Ok(session)
    }

    fn list_episodes(&self, show_url: &str, session: &Session) -> Result<Show, ProviderError> {
        let html = self.http.get_text(show_url, &[], session)?;
        let show = parse_show_page(&html, &self.base_url)?;
        debug!(
            "{}: {} seasons, {} episodes",
            show.title,
            show.seasons.len(),
            show.episode_count()
        );
        Ok(show)
    }

    fn fetch_episode_info(
        &self,
        episode: &mut Episode,
        quality: &str,
        session: &Session,
    ) -> Result<(), ProviderError> {
        let (video_format, video_quality) = format_for_quality(quality);
        let config = self.rpc(
            "RpcApiVideoPlayer_GetStandardConfig",
            &[
                ("media_id", episode.media_id.as_str()),
                ("video_format", video_format),
                ("video_quality", video_quality),
            ],
            session,
        )?;

        let stream_url = element_text(&config, "file").ok_or_else(|| {
            ProviderError::NotFound(format!("stream for media {}", episode.media_id))
        })?;

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
        let xml = self.rpc(
            "RpcApiSubtitle_GetListing",
            &[("media_id", episode.media_id.as_str())],
            session,
        )?;
        Ok(subtitle::parse_listing(&xml)?)
    }

    fn subtitle_payload(
        &self,
        _episode: &Episode,
        track: &Subtitle,
        session: &Session,
    ) -> Result<Subtitle, ProviderError> {
        let script_id = track.id.to_string();
        let xml = self.rpc(
            "RpcApiSubtitle_GetXml",
            &[("subtitle_script_id", script_id.as_str())],
            session,
        )?;

        let mut payload = subtitle::parse_payload(&xml)?;
        // The payload root does not always repeat the listing attributes
        if payload.title.is_empty() {
            payload.title = track.title.clone();
        }
        if payload.id == 0 {
            payload.id = track.id;
        }
        Ok(payload)
    }
}
