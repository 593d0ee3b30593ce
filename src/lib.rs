//! anirip - Rip episodic shows from streaming providers
//!
//! This library logs in to a streaming provider, lists a show's episodes and
//! runs every episode through a pipeline that downloads the video, trims
//! studio intros, decrypts and converts the subtitles, merges everything into
//! one container and moves it into a `<Show>/<Season>/<Episode>.mkv` layout.

mod cache;
mod config;
mod file_operations;
mod media;
mod model;
mod pipeline;
mod provider;
mod scratch;
mod session;
pub mod subtitle;
mod trim;

use file_operations::{episode_destination, format_filename, show_directory};
use log::{debug, warn};
use std::fs;

// Re-export error types
pub use cache::CacheError;
pub use file_operations::FileOperationError;
pub use media::MediaToolError;
pub use pipeline::PipelineError;
pub use provider::ProviderError;
pub use subtitle::SubtitleError;

// Re-export the building blocks callers wire together
pub use config::{Credentials, DEFAULT_LANGUAGE, DEFAULT_NAME_FORMAT, DEFAULT_QUALITY, RipConfig};
pub use file_operations::{PlacementPolicy, sanitize_filename};
pub use media::{FfmpegTools, MediaTools};
pub use model::{DownloadState, Episode, Season, Show, season_display_name};
pub use pipeline::{EpisodePipeline, EpisodeReport, EpisodeState, PipelineStep};
pub use provider::{Provider, ProviderKind};
pub use scratch::{SUBTITLE_FILE, ScratchDir, VIDEO_FILE};
pub use session::{Cookie, Session, SessionStore};
pub use subtitle::{Subtitle, SubtitleListing};
pub use trim::{IntroStudio, TrimSelection};

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Progress event emitted while ripping
///
/// These events allow library users to track progress and provide feedback
/// while shows are processed.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Processing of a show URL started
    ShowStarted { url: String, provider: ProviderKind },

    /// A new session was obtained by logging in
    LoggedIn { provider: ProviderKind },

    /// The show's episodes were listed
    EpisodesListed {
        title: String,
        season_count: usize,
        episode_count: usize,
    },

    /// Processing of a season started
    SeasonStarted { number: u32, name: String },

    /// An episode moved to a new pipeline state
    EpisodeStateChanged {
        file_name: String,
        state: EpisodeState,
    },

    /// The video was downloaded
    VideoDownloaded { file_name: String, size: String },

    /// A studio intro was cut from the video
    TrimApplied {
        studio: IntroStudio,
        duration_ms: u64,
    },

    /// A subtitle track was chosen and converted
    SubtitleResolved {
        file_name: String,
        title: String,
        language: String,
    },

    /// The episode has no subtitle track to merge
    NoSubtitle { file_name: String },

    /// The episode was abandoned
    EpisodeFailed {
        file_name: String,
        step: PipelineStep,
        message: String,
    },

    /// The episode was placed at its final location
    EpisodeComplete {
        file_name: String,
        destination: PathBuf,
    },

    /// Every episode of the show was processed
    ShowComplete {
        title: String,
        completed: usize,
        skipped: usize,
        failed: usize,
    },

    /// The show URL could not be processed at all
    ShowFailed { url: String, message: String },
}

/// Top-level error type for anirip operations
///
/// All of these are fatal to the show URL being processed, never to the
/// whole run.
#[derive(Debug, Error)]
pub enum AniripError {
    /// No provider handles the URL or name
    #[error("Provider not supported: {0}")]
    UnsupportedProvider(String),

    /// No usable session could be obtained
    #[error("Authentication failed for {provider}: {reason}")]
    AuthenticationFailed {
        provider: ProviderKind,
        reason: String,
    },

    /// The show's episodes could not be listed
    #[error("Failed to list episodes: {0}")]
    MetadataFetchFailed(#[source] ProviderError),

    /// Error during cache operations
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// The outcome of ripping one show
#[derive(Debug)]
pub struct ShowReport {
    pub title: String,
    /// One report per episode, in processing order
    pub episodes: Vec<EpisodeReport>,
}

impl ShowReport {
    /// Episodes that were ripped during this run
    pub fn completed(&self) -> usize {
        self.episodes
            .iter()
            .filter(|report| report.succeeded() && !report.skipped)
            .count()
    }

    /// Episodes whose artifact already existed
    pub fn skipped(&self) -> usize {
        self.episodes.iter().filter(|report| report.skipped).count()
    }

    /// Episodes that were abandoned
    pub fn failed(&self) -> usize {
        self.episodes
            .iter()
            .filter(|report| !report.succeeded())
            .count()
    }
}

/// Logs in to the provider named `provider_name` and stores the session
///
/// The name is matched like a URL host, so `crunchyroll` and `Crunchyroll`
/// both work. Unknown names fail before any network activity.
pub fn login(
    provider_name: &str,
    username: &str,
    password: &str,
    store: &SessionStore,
) -> Result<Session, AniripError> {
    let kind = ProviderKind::from_name(provider_name)
        .ok_or_else(|| AniripError::UnsupportedProvider(provider_name.to_string()))?;
    let provider = kind.create();
    login_with(provider.as_ref(), username, password, store)
}

/// Logs in with an already selected provider and stores the session
pub fn login_with(
    provider: &dyn Provider,
    username: &str,
    password: &str,
    store: &SessionStore,
) -> Result<Session, AniripError> {
    let session =
        provider
            .login(username, password)
            .map_err(|e| AniripError::AuthenticationFailed {
                provider: provider.kind(),
                reason: e.to_string(),
            })?;
    store.store(&session)?;
    Ok(session)
}

/// Returns the cached session of a provider, logging in when there is none
///
/// Without a cached session and without credentials the provider cannot be
/// used.
pub fn resolve_session<F>(
    provider: &dyn Provider,
    credentials: Option<&Credentials>,
    store: &SessionStore,
    progress: &mut F,
) -> Result<Session, AniripError>
where
    F: FnMut(ProgressEvent),
{
    let kind = provider.kind();

    if let Some(session) = store.load(kind.name())? {
        debug!("reusing cached {} session of {}", kind, session.identity);
        return Ok(session);
    }

    let credentials = credentials.ok_or_else(|| AniripError::AuthenticationFailed {
        provider: kind,
        reason: "no cached session and no credentials given".to_string(),
    })?;

    let session = login_with(
        provider,
        &credentials.username,
        &credentials.password,
        store,
    )?;
    progress(ProgressEvent::LoggedIn { provider: kind });
    Ok(session)
}

/// Rips every episode of a show
///
/// Seasons and episodes are processed in listing order. A failing episode is
/// reported and skipped; only a failure to list the show or to create its
/// directories ends the show early.
///
/// # Examples
///
/// ```no_run
/// use anirip::{FfmpegTools, ProgressEvent, ProviderKind, RipConfig, Session, rip_show};
///
/// let provider = ProviderKind::Crunchyroll.create();
/// let session = Session::new("crunchyroll", "user");
/// let report = rip_show(
///     provider.as_ref(),
///     &session,
///     "http://www.crunchyroll.com/sword-art-online",
///     &RipConfig::default(),
///     &FfmpegTools::new(),
///     &mut |event: ProgressEvent| println!("{:?}", event),
/// )
/// .unwrap();
/// println!("{} episodes ripped", report.completed());
/// ```
pub fn rip_show<F>(
    provider: &dyn Provider,
    session: &Session,
    show_url: &str,
    config: &RipConfig,
    tools: &dyn MediaTools,
    progress: &mut F,
) -> Result<ShowReport, AniripError>
where
    F: FnMut(ProgressEvent),
{
    let show = provider
        .list_episodes(show_url, session)
        .map_err(AniripError::MetadataFetchFailed)?;

    progress(ProgressEvent::EpisodesListed {
        title: show.title.clone(),
        season_count: show.seasons.len(),
        episode_count: show.episode_count(),
    });

    let scratch = ScratchDir::prepare(&config.scratch_root)?;
    let pipeline = EpisodePipeline::new(provider, session, tools, config, &scratch);
    let show_dir = show_directory(&config.output_root, &show.title);

    let mut episodes = Vec::new();

    for season in &show.seasons {
        let season_name = season.display_name();
        progress(ProgressEvent::SeasonStarted {
            number: season.number,
            name: season_name.clone(),
        });

        let season_dir = show_dir.join(&season_name);
        fs::create_dir_all(&season_dir)?;

        for listed in &season.episodes {
            let mut episode = listed.clone();
            if episode.file_name.is_empty() {
                episode.file_name = format_filename(
                    &config.name_format,
                    &show.title,
                    episode.season_number,
                    episode.episode_number,
                    &episode.title,
                );
            }

            let destination = episode_destination(&season_dir, &episode.file_name);
            episodes.push(pipeline.run(&mut episode, &destination, progress));
        }
    }

    let report = ShowReport {
        title: show.title,
        episodes,
    };

    progress(ProgressEvent::ShowComplete {
        title: report.title.clone(),
        completed: report.completed(),
        skipped: report.skipped(),
        failed: report.failed(),
    });

    Ok(report)
}

/// Rips every show URL in order
///
/// Each URL is processed independently: an unsupported URL, a failed login
/// or an unlistable show is reported and the next URL is processed.
pub fn rip_shows<F>(
    urls: &[String],
    config: &RipConfig,
    credentials: Option<&Credentials>,
    store: &SessionStore,
    tools: &dyn MediaTools,
    mut progress: F,
) -> Vec<(String, Result<ShowReport, AniripError>)>
where
    F: FnMut(ProgressEvent),
{
    urls.iter()
        .map(|url| {
            let result = rip_url(url, config, credentials, store, tools, &mut progress);
            if let Err(error) = &result {
                warn!("{}: {}", url, error);
                progress(ProgressEvent::ShowFailed {
                    url: url.clone(),
                    message: error.to_string(),
                });
            }
            (url.clone(), result)
        })
        .collect()
}

fn rip_url<F>(
    url: &str,
    config: &RipConfig,
    credentials: Option<&Credentials>,
    store: &SessionStore,
    tools: &dyn MediaTools,
    progress: &mut F,
) -> Result<ShowReport, AniripError>
where
    F: FnMut(ProgressEvent),
{
    let kind = ProviderKind::from_url(url)
        .ok_or_else(|| AniripError::UnsupportedProvider(url.to_string()))?;

    progress(ProgressEvent::ShowStarted {
        url: url.to_string(),
        provider: kind,
    });

    let provider = kind.create();
    let session = resolve_session(provider.as_ref(), credentials, store, progress)?;
    rip_show(provider.as_ref(), &session, url, config, tools, progress)
}
