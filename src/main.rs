use anirip::{
    Credentials, DEFAULT_LANGUAGE, DEFAULT_QUALITY, EpisodeState, FfmpegTools, ProgressEvent,
    RipConfig, ScratchDir, SessionStore, TrimSelection, login, rip_shows,
};
use clap::{Parser, Subcommand};
use dialoguer::Password;
use log::LevelFilter;
use std::path::PathBuf;
use std::process;

/// Rip shows from streaming providers into mkv files with subtitles
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Subtitle language, matched against the provider's track titles
    #[arg(short, long, default_value = DEFAULT_LANGUAGE, global = true)]
    lang: String,

    /// Video quality (1080p, 720p, 480p or 360p)
    #[arg(short, long, default_value = DEFAULT_QUALITY, global = true)]
    quality: String,

    /// Studio intros to cut, e.g. "daisuki,aniplex" (daisuki, aniplex, sunrise)
    #[arg(short, long, default_value = "", global = true)]
    trim: String,

    /// Directory the show directories are created in
    #[arg(short, long, default_value = ".", global = true)]
    output: PathBuf,

    /// Print diagnostic output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log in with this account when no session is remembered
    #[arg(short, long)]
    user: Option<String>,

    /// Password for --user, prompted for when omitted
    #[arg(short, long, requires = "user")]
    pass: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,

    /// Show URLs to rip
    #[arg(value_name = "SHOW_URL")]
    urls: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in to a provider and remember the session
    Login {
        /// Provider name (crunchyroll or daisuki)
        provider: String,

        /// Account user name or email address
        #[arg(short, long)]
        user: String,

        /// Account password, prompted for when omitted
        #[arg(short, long)]
        pass: Option<String>,
    },

    /// Delete the scratch directory and all remembered sessions
    Clear,
}

/// Handles progress events and prints formatted output to stdout
fn handle_progress_event(event: ProgressEvent) {
    match event {
        ProgressEvent::ShowStarted { url, provider } => {
            println!("[anirip] Ripping {} from {}...", url, provider);
        }
        ProgressEvent::LoggedIn { provider } => {
            println!("[anirip] Logged in to {}", provider);
        }
        ProgressEvent::EpisodesListed {
            title,
            season_count,
            episode_count,
        } => {
            println!(
                "[anirip] Found {} episode(s) in {} season(s) of {}",
                episode_count, season_count, title
            );
        }
        ProgressEvent::SeasonStarted { name, .. } => {
            println!("[anirip] --- {} ---", name);
        }
        ProgressEvent::EpisodeStateChanged { file_name, state } => match state {
            EpisodeState::Pending => println!("[anirip] {}", file_name),
            EpisodeState::SkippedExisting => {
                println!("[anirip]   Already ripped, skipping");
            }
            EpisodeState::InfoFetched => println!("[anirip]   Downloading video..."),
            EpisodeState::Trimmed => println!("[anirip]   Fetching subtitles..."),
            EpisodeState::SubtitlesFetched => println!("[anirip]   Merging subtitles..."),
            EpisodeState::Merged => println!("[anirip]   Cleaning metadata..."),
            EpisodeState::Cleaned => println!("[anirip]   Moving into place..."),
            _ => {}
        },
        ProgressEvent::VideoDownloaded { size, .. } => {
            println!("[anirip]   Downloaded {}", size);
        }
        ProgressEvent::TrimApplied {
            studio,
            duration_ms,
        } => {
            println!("[anirip]   Trimmed {} intro ({}ms)", studio, duration_ms);
        }
        ProgressEvent::SubtitleResolved {
            title, language, ..
        } => {
            println!("[anirip]   Subtitles: {} ({})", title, language);
        }
        ProgressEvent::NoSubtitle { .. } => {
            println!("[anirip]   No subtitles available");
        }
        ProgressEvent::EpisodeFailed { step, message, .. } => {
            eprintln!("[anirip]   Failed during {}: {}", step, message);
        }
        ProgressEvent::EpisodeComplete { destination, .. } => {
            println!("[anirip]   Saved to {}", destination.display());
        }
        ProgressEvent::ShowComplete {
            title,
            completed,
            skipped,
            failed,
        } => {
            println!(
                "[anirip] {} done: {} ripped, {} skipped, {} failed",
                title, completed, skipped, failed
            );
        }
        ProgressEvent::ShowFailed { url, message } => {
            eprintln!("[anirip] Giving up on {}: {}", url, message);
        }
    }
}

fn init_logging(verbose: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if verbose {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.format_timestamp(None).init();
}

fn open_session_store() -> SessionStore {
    match SessionStore::open() {
        Ok(store) => store,
        Err(e) => {
            eprintln!("[anirip] Error: {}", e);
            process::exit(1);
        }
    }
}

fn read_password(pass: Option<String>) -> String {
    match pass {
        Some(password) => password,
        None => match Password::new().with_prompt("Password").interact() {
            Ok(password) => password,
            Err(e) => {
                eprintln!("[anirip] Error reading password: {}", e);
                process::exit(1);
            }
        },
    }
}

fn run_login(provider: &str, user: &str, pass: Option<String>) {
    let password = read_password(pass);
    let store = open_session_store();
    match login(provider, user, &password, &store) {
        Ok(session) => {
            println!(
                "[anirip] Logged in to {} as {}, session saved",
                session.provider, session.identity
            );
        }
        Err(e) => {
            eprintln!("[anirip] Login failed: {}", e);
            process::exit(1);
        }
    }
}

fn run_clear() {
    if let Err(e) = ScratchDir::clear(&ScratchDir::default_root()) {
        eprintln!("[anirip] Failed to remove scratch directory: {}", e);
        process::exit(1);
    }

    let store = open_session_store();
    if let Err(e) = store.clear() {
        eprintln!("[anirip] Failed to remove sessions: {}", e);
        process::exit(1);
    }

    println!("[anirip] Scratch directory and sessions removed");
}

fn run_rip(cli: Cli) {
    if cli.urls.is_empty() {
        eprintln!("[anirip] Error: no show URL given");
        process::exit(1);
    }

    if let Err(e) = FfmpegTools::ensure_available() {
        eprintln!("[anirip] Error: {}", e);
        process::exit(1);
    }

    let config = RipConfig {
        language: cli.lang,
        quality: cli.quality,
        trim: TrimSelection::parse(&cli.trim),
        output_root: cli.output,
        ..RipConfig::default()
    };

    let credentials = cli.user.map(|username| Credentials {
        username,
        password: read_password(cli.pass),
    });
    let store = open_session_store();
    let tools = FfmpegTools::new();

    let results = rip_shows(
        &cli.urls,
        &config,
        credentials.as_ref(),
        &store,
        &tools,
        handle_progress_event,
    );

    let failed = results.iter().any(|(_, result)| result.is_err());
    if failed {
        process::exit(1);
    }
}

fn main() {
    let mut cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command.take() {
        Some(Command::Login {
            provider,
            user,
            pass,
        }) => run_login(&provider, &user, pass),
        Some(Command::Clear) => run_clear(),
        None => run_rip(cli),
    }
}
