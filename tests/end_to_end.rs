use anirip::{
    AniripError, Credentials, DownloadState, Episode, EpisodeState, MediaToolError, MediaTools,
    PipelineError, PipelineStep, PlacementPolicy, ProgressEvent, Provider, ProviderError,
    ProviderKind, RipConfig, SUBTITLE_FILE, Session, SessionStore, Show, Subtitle,
    SubtitleListing, TrimSelection, resolve_session, rip_show,
};
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SAMPLE_ID: i64 = 758912;
const SAMPLE_IV: &str = "AAECAwQFBgcICQoLDA0ODw==";
const SAMPLE_DATA: &str = "Btsv5Y0Rpj5xg4axcz5rQ/ShaF5I2RBLpoz3WfJL6JTguP+U/u5DPop6hQF19tcBTctlZukKe9BfTCGykYMCg+U+bLt13Ye9+PB+qgj5i77zOkKIvP5dU56BYVAIjgPCJJJ1b4ItxfSc2GEHy6bcgNJWVWbA4A2BB939jR1Kd8WpnJrCLOlBFxU1K7y+FXOZS1OTde5+uTi4444tAZ8scRI9/kNUdkswX02QMzuERBKq2cZnmsap1VDeKqeoTiaTkMPyJxbrrs6LvL7aQcp0VhMGPbAd/4subkkDD8rfSnjsrVAEL5+r6cjv+AU2Ofi8RNDSsBXGOsBOjm9LZCbGKQuScnSjPkuPLkZa01FT9wn1JpAq3mUyZMOiWLYNI79s9PdRDycRUe8Z/33chkPppY4HIonp9c2NMT54r6Vlq4NK5WWvZRqsQcdOZJ7whE3t3eF4hlNUe7KOJTX30mp29QHy77ODyLJh2WOq++jlEVVre53Tqp0HkxUed+3S/U9TAiCEkve3sIssWWn+jd4iFSWq/f7J+hk/cj9Z1F86CQwttg57/PKDyVDKUC+3lNXv+SWfNtF2Hnq2U/+WQ/W0PvOOVAiLtUm5ewe3+buJcMzRcNCNU9AJSquqD2qVPHssKi0Yyn5VfuMrud+Vl1cn2fca+ZVD9QNfqmnuuBiw6vY=";
const TRACK_TITLE: &str = "[English (US)] English (US)";

/// Media id whose subtitle payload is encrypted for another script id
const UNDECRYPTABLE: &str = "broken";

/// A minimal Matroska header, enough to be sniffed as a video
fn matroska_bytes() -> Vec<u8> {
    let mut header = vec![0x1A, 0x45, 0xDF, 0xA3, 0x93, 0x42, 0x82, 0x88];
    header.extend_from_slice(b"matroska");
    header.resize(64, 0);
    header
}

/// In-memory provider that records every call it receives
struct FakeProvider {
    show: Show,
    listing: SubtitleListing,
    calls: RefCell<Vec<String>>,
}

impl FakeProvider {
    fn new(episodes: Vec<Episode>) -> Self {
        Self {
            show: Show::from_episodes("Test Show", episodes),
            listing: SubtitleListing::Tracks(vec![
                Subtitle {
                    id: 1,
                    title: "[Español (España)] Español (España)".to_string(),
                    ..Subtitle::default()
                },
                Subtitle {
                    id: SAMPLE_ID,
                    title: TRACK_TITLE.to_string(),
                    ..Subtitle::default()
                },
            ]),
            calls: RefCell::new(Vec::new()),
        }
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn calls_for(&self, media_id: &str) -> Vec<String> {
        let suffix = format!(":{}", media_id);
        self.calls()
            .into_iter()
            .filter(|call| call.ends_with(&suffix))
            .collect()
    }
}

impl Provider for FakeProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Crunchyroll
    }

    fn login(&self, username: &str, password: &str) -> Result<Session, ProviderError> {
        self.record(format!("login:{}", username));
        if password != "secret" {
            return Err(ProviderError::AuthenticationFailed("wrong password".to_string()));
        }
        let mut session = Session::new("crunchyroll", username);
        session.set_cookie("c_userid", "42");
        Ok(session)
    }

    fn list_episodes(&self, show_url: &str, _session: &Session) -> Result<Show, ProviderError> {
        self.record(format!("list:{}", show_url));
        Ok(self.show.clone())
    }

    fn fetch_episode_info(
        &self,
        episode: &mut Episode,
        quality: &str,
        _session: &Session,
    ) -> Result<(), ProviderError> {
        self.record(format!("info:{}", episode.media_id));
        episode.download = Some(DownloadState {
            quality: quality.to_string(),
            stream_url: format!("https://cdn.test/{}.m3u8", episode.media_id),
        });
        Ok(())
    }

    fn fetch_video(
        &self,
        episode: &Episode,
        destination: &Path,
        _session: &Session,
    ) -> Result<(), ProviderError> {
        self.record(format!("video:{}", episode.media_id));
        assert!(episode.download.is_some(), "video fetched before info");
        fs::write(destination, matroska_bytes())
            .map_err(|e| ProviderError::RequestError(e.to_string()))
    }

    fn subtitle_listing(
        &self,
        episode: &Episode,
        _session: &Session,
    ) -> Result<SubtitleListing, ProviderError> {
        self.record(format!("subtitles:{}", episode.media_id));
        Ok(self.listing.clone())
    }

    fn subtitle_payload(
        &self,
        episode: &Episode,
        track: &Subtitle,
        _session: &Session,
    ) -> Result<Subtitle, ProviderError> {
        self.record(format!("payload:{}", episode.media_id));
        let id = if episode.media_id == UNDECRYPTABLE {
            track.id + 1
        } else {
            track.id
        };
        Ok(Subtitle {
            id,
            title: track.title.clone(),
            iv: SAMPLE_IV.to_string(),
            data: SAMPLE_DATA.to_string(),
            ..Subtitle::default()
        })
    }
}

/// Media tools that record their invocations instead of running ffmpeg
#[derive(Default)]
struct FakeTools {
    calls: RefCell<Vec<String>>,
    merged_subtitles: RefCell<Vec<String>>,
}

impl MediaTools for FakeTools {
    fn trim_video(&self, duration_ms: u64, working_dir: &Path) -> Result<(), MediaToolError> {
        assert!(working_dir.join("episode.mkv").is_file());
        self.calls.borrow_mut().push(format!("trim:{}", duration_ms));
        Ok(())
    }

    fn merge_subtitle_track(
        &self,
        video_language: &str,
        subtitle_language: &str,
        working_dir: &Path,
    ) -> Result<(), MediaToolError> {
        let subtitles = fs::read_to_string(working_dir.join(SUBTITLE_FILE))
            .map_err(|_| MediaToolError::MissingInput(working_dir.join(SUBTITLE_FILE)))?;
        self.merged_subtitles.borrow_mut().push(subtitles);
        self.calls
            .borrow_mut()
            .push(format!("merge:{}:{}", video_language, subtitle_language));
        Ok(())
    }

    fn clean_metadata(&self, _working_dir: &Path) -> Result<(), MediaToolError> {
        self.calls.borrow_mut().push("clean".to_string());
        Ok(())
    }
}

fn test_config(root: &Path, trim: &str) -> RipConfig {
    RipConfig {
        trim: TrimSelection::parse(trim),
        output_root: root.join("library"),
        scratch_root: root.join("scratch"),
        placement: PlacementPolicy {
            attempts: 2,
            delay: Duration::ZERO,
        },
        ..RipConfig::default()
    }
}

fn season_one(root: &Path) -> PathBuf {
    root.join("library").join("Test Show").join("Season One")
}

fn two_episodes() -> Vec<Episode> {
    vec![
        Episode::new(1, 1, "Arrival", "a", "https://www.crunchyroll.com/test/episode-1-a"),
        Episode::new(1, 2, "Departure", "b", "https://www.crunchyroll.com/test/episode-2-b"),
    ]
}

#[test]
fn test_skips_existing_and_rips_remaining_episode() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), "daisuki");

    let existing = season_one(dir.path()).join("Test Show - S01E01.mkv");
    fs::create_dir_all(existing.parent().unwrap()).unwrap();
    fs::write(&existing, b"already ripped").unwrap();

    let provider = FakeProvider::new(two_episodes());
    let tools = FakeTools::default();
    let session = Session::new("crunchyroll", "user");
    let mut events = Vec::new();

    let report = rip_show(
        &provider,
        &session,
        "https://www.crunchyroll.com/test",
        &config,
        &tools,
        &mut |event| events.push(event),
    )
    .unwrap();

    assert_eq!(report.title, "Test Show");
    assert_eq!(report.skipped(), 1);
    assert_eq!(report.completed(), 1);
    assert_eq!(report.failed(), 0);

    // The existing episode costs no provider call at all
    assert!(provider.calls_for("a").is_empty());
    assert_eq!(fs::read(&existing).unwrap(), b"already ripped");

    assert_eq!(
        provider.calls_for("b"),
        ["info:b", "video:b", "subtitles:b", "payload:b"]
    );
    assert_eq!(
        *tools.calls.borrow(),
        ["trim:5040", "merge:jpn:eng", "clean"]
    );

    // Subtitle events are shifted by the trimmed Daisuki intro
    let merged = tools.merged_subtitles.borrow();
    let first_event = merged[0]
        .lines()
        .find(|line| line.starts_with("Dialogue:"))
        .unwrap();
    assert_eq!(
        first_event,
        "Dialogue: 0,0:00:06.27,0:00:08.49,Main,,0000,0000,0000,,Hello there."
    );

    let ripped = season_one(dir.path()).join("Test Show - S01E02.mkv");
    assert_eq!(fs::read(&ripped).unwrap(), matroska_bytes());
    assert!(!dir.path().join("scratch").join("episode.mkv").exists());

    let states: Vec<EpisodeState> = events
        .iter()
        .filter_map(|event| match event {
            ProgressEvent::EpisodeStateChanged { file_name, state }
                if file_name == "Test Show - S01E02" =>
            {
                Some(*state)
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        [
            EpisodeState::Pending,
            EpisodeState::InfoFetched,
            EpisodeState::VideoDownloaded,
            EpisodeState::Trimmed,
            EpisodeState::SubtitlesFetched,
            EpisodeState::Merged,
            EpisodeState::Cleaned,
            EpisodeState::Placed,
            EpisodeState::Done,
        ]
    );
    assert!(events.iter().any(|event| matches!(
        event,
        ProgressEvent::TrimApplied {
            duration_ms: 5040,
            ..
        }
    )));
}

#[test]
fn test_rerun_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), "");
    let session = Session::new("crunchyroll", "user");
    let tools = FakeTools::default();

    let first = FakeProvider::new(two_episodes());
    let report = rip_show(&first, &session, "show", &config, &tools, &mut |_| {}).unwrap();
    assert_eq!(report.completed(), 2);

    let second = FakeProvider::new(two_episodes());
    let report = rip_show(&second, &session, "show", &config, &tools, &mut |_| {}).unwrap();
    assert_eq!(report.completed(), 0);
    assert_eq!(report.skipped(), 2);
    assert_eq!(second.calls(), ["list:show"]);
}

#[test]
fn test_no_trim_keeps_original_timing() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), "none");
    let provider = FakeProvider::new(vec![two_episodes().remove(0)]);
    let tools = FakeTools::default();

    rip_show(
        &provider,
        &Session::default(),
        "show",
        &config,
        &tools,
        &mut |_| {},
    )
    .unwrap();

    assert!(!tools.calls.borrow().iter().any(|call| call.starts_with("trim")));
    assert!(tools.merged_subtitles.borrow()[0]
        .contains("Dialogue: 0,0:00:01.23,0:00:03.45,Main,,0000,0000,0000,,Hello there."));
}

#[test]
fn test_episode_without_subtitles_is_still_ripped() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), "");
    let mut provider = FakeProvider::new(two_episodes());
    provider.listing = SubtitleListing::Embedded;
    let tools = FakeTools::default();
    let mut no_subtitle_events = 0;

    let report = rip_show(
        &provider,
        &Session::default(),
        "show",
        &config,
        &tools,
        &mut |event| {
            if let ProgressEvent::NoSubtitle { .. } = event {
                no_subtitle_events += 1;
            }
        },
    )
    .unwrap();

    assert_eq!(report.completed(), 2);
    assert_eq!(no_subtitle_events, 2);
    assert_eq!(*tools.calls.borrow(), ["clean", "clean"]);
    assert!(provider.calls_for("a").iter().all(|call| !call.starts_with("payload")));
}

#[test]
fn test_unmatched_language_without_english_yields_no_subtitle() {
    let dir = tempfile::tempdir().unwrap();
    let config = RipConfig {
        language: "German".to_string(),
        ..test_config(dir.path(), "")
    };
    let mut provider = FakeProvider::new(vec![two_episodes().remove(0)]);
    provider.listing = SubtitleListing::Tracks(vec![Subtitle {
        id: 1,
        title: "[Français (France)] Français (France)".to_string(),
        ..Subtitle::default()
    }]);
    let tools = FakeTools::default();

    let report = rip_show(
        &provider,
        &Session::default(),
        "show",
        &config,
        &tools,
        &mut |_| {},
    )
    .unwrap();

    assert_eq!(report.completed(), 1);
    assert!(tools.merged_subtitles.borrow().is_empty());
}

#[test]
fn test_native_language_track_is_tagged_with_its_language() {
    let dir = tempfile::tempdir().unwrap();
    let config = RipConfig {
        language: "Español".to_string(),
        ..test_config(dir.path(), "")
    };
    let mut provider = FakeProvider::new(vec![two_episodes().remove(0)]);
    provider.listing = SubtitleListing::Tracks(vec![
        Subtitle {
            id: 1,
            title: TRACK_TITLE.to_string(),
            ..Subtitle::default()
        },
        Subtitle {
            id: SAMPLE_ID,
            title: "[Español (España)] Español (España)".to_string(),
            ..Subtitle::default()
        },
    ]);
    let tools = FakeTools::default();

    let report = rip_show(
        &provider,
        &Session::default(),
        "show",
        &config,
        &tools,
        &mut |_| {},
    )
    .unwrap();

    assert_eq!(report.completed(), 1);
    assert_eq!(*tools.calls.borrow(), ["merge:jpn:spa", "clean"]);
}

#[test]
fn test_failed_episode_does_not_stop_the_show() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), "");
    let provider = FakeProvider::new(vec![
        Episode::new(0, 1, "Special", UNDECRYPTABLE, "special"),
        Episode::new(1, 1, "Arrival", "a", "arrival"),
    ]);
    let tools = FakeTools::default();

    let report = rip_show(
        &provider,
        &Session::default(),
        "show",
        &config,
        &tools,
        &mut |_| {},
    )
    .unwrap();

    assert_eq!(report.failed(), 1);
    assert_eq!(report.completed(), 1);

    let failed = &report.episodes[0];
    assert_eq!(failed.file_name, "Test Show - S00E01");
    assert_eq!(
        failed.final_state,
        EpisodeState::Failed(PipelineStep::FetchSubtitles)
    );
    assert!(matches!(
        failed.error,
        Some(PipelineError::SubtitleDecryptFailed(_))
    ));

    let specials = dir.path().join("library").join("Test Show").join("Specials");
    assert!(specials.is_dir());
    assert!(!specials.join("Test Show - S00E01.mkv").exists());
    assert!(season_one(dir.path()).join("Test Show - S01E01.mkv").is_file());

    // The abandoned episode never reached the merge step
    assert_eq!(*tools.calls.borrow(), ["merge:jpn:eng", "clean"]);
}

#[test]
fn test_resolve_session_prefers_cached_session() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::open_in(dir.path()).unwrap();
    let provider = FakeProvider::new(Vec::new());

    let mut cached = Session::new("crunchyroll", "cached-user");
    cached.set_cookie("c_userid", "7");
    store.store(&cached).unwrap();

    let session = resolve_session(&provider, None, &store, &mut |_| {}).unwrap();
    assert_eq!(session, cached);
    assert!(provider.calls().is_empty());
}

#[test]
fn test_resolve_session_logs_in_and_stores() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::open_in(dir.path()).unwrap();
    let provider = FakeProvider::new(Vec::new());
    let credentials = Credentials {
        username: "user".to_string(),
        password: "secret".to_string(),
    };
    let mut logged_in = false;

    let session = resolve_session(&provider, Some(&credentials), &store, &mut |event| {
        if let ProgressEvent::LoggedIn { .. } = event {
            logged_in = true;
        }
    })
    .unwrap();

    assert!(logged_in);
    assert_eq!(session.cookie("c_userid"), Some("42"));
    assert_eq!(store.load("crunchyroll").unwrap(), Some(session));
}

#[test]
fn test_resolve_session_failures() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::open_in(dir.path()).unwrap();
    let provider = FakeProvider::new(Vec::new());

    let error = resolve_session(&provider, None, &store, &mut |_| {}).unwrap_err();
    assert!(matches!(error, AniripError::AuthenticationFailed { .. }));

    let credentials = Credentials {
        username: "user".to_string(),
        password: "wrong".to_string(),
    };
    let error = resolve_session(&provider, Some(&credentials), &store, &mut |_| {}).unwrap_err();
    assert!(matches!(error, AniripError::AuthenticationFailed { .. }));
    assert_eq!(store.load("crunchyroll").unwrap(), None);
}
