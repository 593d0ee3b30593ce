//! Per-episode pipeline
//!
//! Drives one episode through info fetch, video download, intro trimming,
//! subtitle acquisition, merging, metadata cleanup and final placement. Steps
//! run strictly in sequence and a failing step abandons the episode without
//! affecting the next one.

use crate::ProgressEvent;
use crate::config::RipConfig;
use crate::file_operations::{FileOperationError, place_with_retry};
use crate::media::{self, MediaToolError, MediaTools};
use crate::model::Episode;
use crate::provider::{Provider, ProviderError};
use crate::scratch::ScratchDir;
use crate::session::Session;
use crate::subtitle::{self, SubtitleError, SubtitleListing};
use crate::trim::IntroStudio;
use humansize::{DECIMAL, format_size};
use log::{debug, warn};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// The steps of the pipeline, used to report where an episode failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStep {
    Prepare,
    FetchInfo,
    DownloadVideo,
    Trim,
    FetchSubtitles,
    Merge,
    Clean,
    Place,
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStep::Prepare => "prepare",
            PipelineStep::FetchInfo => "fetch info",
            PipelineStep::DownloadVideo => "download video",
            PipelineStep::Trim => "trim",
            PipelineStep::FetchSubtitles => "fetch subtitles",
            PipelineStep::Merge => "merge",
            PipelineStep::Clean => "clean",
            PipelineStep::Place => "place",
        };
        f.write_str(name)
    }
}

/// Where an episode currently stands
///
/// States only ever move forward. `Failed` is terminal and records the step
/// that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodeState {
    Pending,
    InfoFetched,
    SkippedExisting,
    VideoDownloaded,
    Trimmed,
    SubtitlesFetched,
    Merged,
    Cleaned,
    Placed,
    Done,
    Failed(PipelineStep),
}

/// Errors that abandon an episode
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The scratch directory could not be used
    #[error("Scratch directory error during {step}: {source}")]
    Scratch {
        step: PipelineStep,
        #[source]
        source: io::Error,
    },

    #[error("Failed to fetch episode info: {0}")]
    MetadataFetchFailed(#[source] ProviderError),

    #[error("Failed to download video: {0}")]
    VideoFetchFailed(String),

    #[error("Failed to trim {studio} intro: {source}")]
    TrimFailed {
        studio: IntroStudio,
        #[source]
        source: MediaToolError,
    },

    #[error("Failed to fetch subtitles: {0}")]
    SubtitleFetchFailed(#[source] ProviderError),

    #[error("Failed to decrypt subtitles: {0}")]
    SubtitleDecryptFailed(#[source] SubtitleError),

    #[error("Failed to merge subtitles: {0}")]
    MergeFailed(#[source] MediaToolError),

    #[error("Failed to clean metadata: {0}")]
    CleanFailed(#[source] MediaToolError),

    #[error("Failed to place episode: {0}")]
    PlacementFailed(#[source] FileOperationError),
}

impl PipelineError {
    /// The step this error abandoned the episode in
    pub fn step(&self) -> PipelineStep {
        match self {
            PipelineError::Scratch { step, .. } => *step,
            PipelineError::MetadataFetchFailed(_) => PipelineStep::FetchInfo,
            PipelineError::VideoFetchFailed(_) => PipelineStep::DownloadVideo,
            PipelineError::TrimFailed { .. } => PipelineStep::Trim,
            PipelineError::SubtitleFetchFailed(_) | PipelineError::SubtitleDecryptFailed(_) => {
                PipelineStep::FetchSubtitles
            }
            PipelineError::MergeFailed(_) => PipelineStep::Merge,
            PipelineError::CleanFailed(_) => PipelineStep::Clean,
            PipelineError::PlacementFailed(_) => PipelineStep::Place,
        }
    }
}

/// Outcome of running one episode through the pipeline
#[derive(Debug)]
pub struct EpisodeReport {
    /// File name of the episode, without extension
    pub file_name: String,
    /// Final path of the episode's container
    pub destination: PathBuf,
    /// Either `Done` or `Failed`
    pub final_state: EpisodeState,
    /// Set when the final artifact already existed
    pub skipped: bool,
    /// The error that abandoned the episode
    pub error: Option<PipelineError>,
}

impl EpisodeReport {
    pub fn succeeded(&self) -> bool {
        self.final_state == EpisodeState::Done
    }
}

/// Runs episodes of one show through the pipeline steps
pub struct EpisodePipeline<'a> {
    provider: &'a dyn Provider,
    session: &'a Session,
    tools: &'a dyn MediaTools,
    config: &'a RipConfig,
    scratch: &'a ScratchDir,
}

/// Tracks the state of one episode and reports every transition
struct Tracker<'p, F> {
    file_name: String,
    state: EpisodeState,
    progress: &'p mut F,
}

impl<F> Tracker<'_, F>
where
    F: FnMut(ProgressEvent),
{
    fn advance(&mut self, state: EpisodeState) {
        debug!("{}: {:?} -> {:?}", self.file_name, self.state, state);
        self.state = state;
        self.emit(ProgressEvent::EpisodeStateChanged {
            file_name: self.file_name.clone(),
            state,
        });
    }

    fn emit(&mut self, event: ProgressEvent) {
        (self.progress)(event);
    }
}

impl<'a> EpisodePipeline<'a> {
    pub fn new(
        provider: &'a dyn Provider,
        session: &'a Session,
        tools: &'a dyn MediaTools,
        config: &'a RipConfig,
        scratch: &'a ScratchDir,
    ) -> Self {
        Self {
            provider,
            session,
            tools,
            config,
            scratch,
        }
    }

    /// Runs one episode to a terminal state
    ///
    /// An episode whose final artifact already exists at `destination` is
    /// reported complete without touching the provider. Errors never escape;
    /// they end up in the report.
    pub fn run<F>(&self, episode: &mut Episode, destination: &Path, progress: &mut F) -> EpisodeReport
    where
        F: FnMut(ProgressEvent),
    {
        let mut tracker = Tracker {
            file_name: episode.file_name.clone(),
            state: EpisodeState::Pending,
            progress,
        };
        tracker.emit(ProgressEvent::EpisodeStateChanged {
            file_name: tracker.file_name.clone(),
            state: EpisodeState::Pending,
        });

        let mut report = EpisodeReport {
            file_name: episode.file_name.clone(),
            destination: destination.to_path_buf(),
            final_state: EpisodeState::Pending,
            skipped: false,
            error: None,
        };

        if destination.exists() {
            tracker.advance(EpisodeState::SkippedExisting);
            tracker.advance(EpisodeState::Done);
            report.final_state = EpisodeState::Done;
            report.skipped = true;
            return report;
        }

        match self.execute(episode, destination, &mut tracker) {
            Ok(()) => {
                tracker.advance(EpisodeState::Done);
                tracker.emit(ProgressEvent::EpisodeComplete {
                    file_name: report.file_name.clone(),
                    destination: destination.to_path_buf(),
                });
                report.final_state = EpisodeState::Done;
            }
            Err(error) => {
                let step = error.step();
                warn!("{}: abandoned during {}: {}", report.file_name, step, error);
                tracker.advance(EpisodeState::Failed(step));
                tracker.emit(ProgressEvent::EpisodeFailed {
                    file_name: report.file_name.clone(),
                    step,
                    message: error.to_string(),
                });
                report.final_state = EpisodeState::Failed(step);
                report.error = Some(error);
            }
        }

        report
    }

    fn execute<F>(
        &self,
        episode: &mut Episode,
        destination: &Path,
        tracker: &mut Tracker<'_, F>,
    ) -> Result<(), PipelineError>
    where
        F: FnMut(ProgressEvent),
    {
        self.scratch.reset().map_err(|source| PipelineError::Scratch {
            step: PipelineStep::Prepare,
            source,
        })?;

        self.provider
            .fetch_episode_info(episode, &self.config.quality, self.session)
            .map_err(PipelineError::MetadataFetchFailed)?;
        tracker.advance(EpisodeState::InfoFetched);

        self.download_video(episode, tracker)?;
        tracker.advance(EpisodeState::VideoDownloaded);

        let offset_ms = self.trim_intros(tracker)?;
        tracker.advance(EpisodeState::Trimmed);

        let subtitle_language = self.fetch_subtitles(episode, offset_ms, tracker)?;
        tracker.advance(EpisodeState::SubtitlesFetched);

        // Without a subtitle track there is nothing to merge
        if let Some(language) = subtitle_language {
            self.tools
                .merge_subtitle_track(&self.config.audio_language, &language, self.scratch.path())
                .map_err(PipelineError::MergeFailed)?;
        }
        tracker.advance(EpisodeState::Merged);

        self.tools
            .clean_metadata(self.scratch.path())
            .map_err(PipelineError::CleanFailed)?;
        tracker.advance(EpisodeState::Cleaned);

        place_with_retry(&self.scratch.video_path(), destination, self.config.placement)
            .map_err(PipelineError::PlacementFailed)?;
        tracker.advance(EpisodeState::Placed);

        Ok(())
    }

    fn download_video<F>(
        &self,
        episode: &Episode,
        tracker: &mut Tracker<'_, F>,
    ) -> Result<(), PipelineError>
    where
        F: FnMut(ProgressEvent),
    {
        let video = self.scratch.video_path();
        self.provider
            .fetch_video(episode, &video, self.session)
            .map_err(|e| PipelineError::VideoFetchFailed(e.to_string()))?;

        if !media::is_video_file(&video) {
            return Err(PipelineError::VideoFetchFailed(format!(
                "{} is missing or not a video",
                video.display()
            )));
        }

        let size = fs::metadata(&video).map(|m| m.len()).unwrap_or(0);
        tracker.emit(ProgressEvent::VideoDownloaded {
            file_name: episode.file_name.clone(),
            size: format_size(size, DECIMAL),
        });

        Ok(())
    }

    /// Cuts every selected studio intro and returns the accumulated offset
    fn trim_intros<F>(&self, tracker: &mut Tracker<'_, F>) -> Result<u64, PipelineError>
    where
        F: FnMut(ProgressEvent),
    {
        let mut offset_ms = 0;

        for &studio in self.config.trim.studios() {
            let duration_ms = studio.intro_ms();
            self.tools
                .trim_video(duration_ms, self.scratch.path())
                .map_err(|source| PipelineError::TrimFailed { studio, source })?;
            offset_ms += duration_ms;
            tracker.emit(ProgressEvent::TrimApplied {
                studio,
                duration_ms,
            });
        }

        Ok(offset_ms)
    }

    /// Writes the subtitle file and returns its language tag
    ///
    /// `None` means the episode has no subtitle to merge, which is not an
    /// error.
    fn fetch_subtitles<F>(
        &self,
        episode: &Episode,
        offset_ms: u64,
        tracker: &mut Tracker<'_, F>,
    ) -> Result<Option<String>, PipelineError>
    where
        F: FnMut(ProgressEvent),
    {
        let listing = self
            .provider
            .subtitle_listing(episode, self.session)
            .map_err(PipelineError::SubtitleFetchFailed)?;

        let tracks = match listing {
            SubtitleListing::Embedded => Vec::new(),
            SubtitleListing::Tracks(tracks) => tracks,
        };

        let Some(track) = subtitle::resolve_track(&tracks, &self.config.language) else {
            tracker.emit(ProgressEvent::NoSubtitle {
                file_name: episode.file_name.clone(),
            });
            return Ok(None);
        };

        let payload = self
            .provider
            .subtitle_payload(episode, track, self.session)
            .map_err(PipelineError::SubtitleFetchFailed)?;

        let ass = subtitle::decode_to_ass(&payload, offset_ms)
            .map_err(PipelineError::SubtitleDecryptFailed)?;

        fs::write(self.scratch.subtitle_path(), ass).map_err(|source| PipelineError::Scratch {
            step: PipelineStep::FetchSubtitles,
            source,
        })?;

        let language = subtitle::language_tag(&track.title);
        tracker.emit(ProgressEvent::SubtitleResolved {
            file_name: episode.file_name.clone(),
            title: track.title.clone(),
            language: language.clone(),
        });

        Ok(Some(language))
    }
}
