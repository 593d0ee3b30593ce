//! External media tool adapters
//!
//! Trimming, subtitle muxing and metadata cleanup are delegated to ffmpeg.
//! Every adapter works on the well-known files of a working directory and
//! only reports success or failure.

use crate::scratch::{SUBTITLE_FILE, VIDEO_FILE, intermediate_file};
use ffmpeg_sidecar::command::{FfmpegCommand, ffmpeg_is_installed};
use ffmpeg_sidecar::event::{FfmpegEvent, LogLevel};
use log::debug;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while running an external media tool
#[derive(Debug, Error)]
pub enum MediaToolError {
    /// ffmpeg is not available on this system
    #[error("ffmpeg was not found. Please install it first.")]
    NotInstalled,

    /// An input the tool needs does not exist
    #[error("Missing input file: {0}")]
    MissingInput(PathBuf),

    /// The tool could not be started
    #[error("Failed to run ffmpeg: {0}")]
    Spawn(String),

    /// The tool ran but reported failure
    #[error("ffmpeg failed with exit code {code:?}: {message}")]
    Failed { code: Option<i32>, message: String },

    /// The tool's output could not be moved into place
    #[error("Failed to replace {path}: {source}")]
    Replace {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// The media operations the episode pipeline relies on
pub trait MediaTools {
    /// Cuts `duration_ms` from the start of the working video
    fn trim_video(&self, duration_ms: u64, working_dir: &Path) -> Result<(), MediaToolError>;

    /// Muxes the working subtitle file into the working video
    ///
    /// The first audio track is tagged with `video_language`, the subtitle
    /// track with `subtitle_language` and marked default.
    fn merge_subtitle_track(
        &self,
        video_language: &str,
        subtitle_language: &str,
        working_dir: &Path,
    ) -> Result<(), MediaToolError>;

    /// Strips container-level metadata from the working video
    fn clean_metadata(&self, working_dir: &Path) -> Result<(), MediaToolError>;
}

/// [`MediaTools`] backed by the ffmpeg binary
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegTools;

impl FfmpegTools {
    pub fn new() -> Self {
        Self
    }

    /// Checks that ffmpeg can be invoked
    pub fn ensure_available() -> Result<(), MediaToolError> {
        if ffmpeg_is_installed() {
            Ok(())
        } else {
            Err(MediaToolError::NotInstalled)
        }
    }

    /// Runs ffmpeg over the working video and replaces it with the result
    fn rewrite_video(
        working_dir: &Path,
        label: &str,
        input_args: &[String],
        extra_inputs: &[PathBuf],
        output_args: &[String],
    ) -> Result<(), MediaToolError> {
        let video = working_dir.join(VIDEO_FILE);
        require(&video)?;
        for input in extra_inputs {
            require(input)?;
        }

        let output = intermediate_file(working_dir, label, "mkv");

        let mut command =
            rewrite_command(&video, input_args, extra_inputs, output_args, output.path());
        run(label, &mut command)?;

        output
            .promote(&video)
            .map_err(|e| MediaToolError::Replace {
                path: video.clone(),
                source: e,
            })
    }
}

/// Builds the ffmpeg invocation that rewrites `video` into `output`
fn rewrite_command(
    video: &Path,
    input_args: &[String],
    extra_inputs: &[PathBuf],
    output_args: &[String],
    output: &Path,
) -> FfmpegCommand {
    let mut command = FfmpegCommand::new();
    command.hide_banner().overwrite();
    command.args(input_args);
    command.input(video);
    for input in extra_inputs {
        command.input(input);
    }
    command.args(output_args);
    command.output(output);
    command
}

impl MediaTools for FfmpegTools {
    fn trim_video(&self, duration_ms: u64, working_dir: &Path) -> Result<(), MediaToolError> {
        let seek = format!("{}.{:03}", duration_ms / 1000, duration_ms % 1000);
        Self::rewrite_video(
            working_dir,
            "trim",
            &["-ss".to_string(), seek],
            &[],
            &strings(&["-map", "0", "-c", "copy"]),
        )
    }

    fn merge_subtitle_track(
        &self,
        video_language: &str,
        subtitle_language: &str,
        working_dir: &Path,
    ) -> Result<(), MediaToolError> {
        let mut output_args = strings(&["-map", "0", "-map", "1", "-c", "copy"]);
        output_args.extend([
            "-metadata:s:a:0".to_string(),
            format!("language={}", video_language),
            "-metadata:s:s:0".to_string(),
            format!("language={}", subtitle_language),
            "-disposition:s:0".to_string(),
            "default".to_string(),
        ]);

        Self::rewrite_video(
            working_dir,
            "merge",
            &[],
            &[working_dir.join(SUBTITLE_FILE)],
            &output_args,
        )
    }

    fn clean_metadata(&self, working_dir: &Path) -> Result<(), MediaToolError> {
        Self::rewrite_video(
            working_dir,
            "clean",
            &[],
            &[],
            &strings(&[
                "-map",
                "0",
                "-c",
                "copy",
                "-map_metadata:g",
                "-1",
                "-metadata",
                "title=",
            ]),
        )
    }
}

/// Downloads a stream (typically an HLS manifest) into a local container
///
/// `headers` are passed to ffmpeg's HTTP client verbatim.
pub fn download_stream(
    stream_url: &str,
    headers: &[(String, String)],
    destination: &Path,
) -> Result<(), MediaToolError> {
    let mut command = download_command(stream_url, headers, destination);
    run("download", &mut command)
}

fn download_command(
    stream_url: &str,
    headers: &[(String, String)],
    destination: &Path,
) -> FfmpegCommand {
    let mut command = FfmpegCommand::new();
    command.hide_banner().overwrite();

    if !headers.is_empty() {
        let joined: String = headers
            .iter()
            .map(|(name, value)| format!("{}: {}\r\n", name, value))
            .collect();
        command.args(["-headers", joined.as_str()]);
    }

    command.input(stream_url);
    command.args(["-map", "0", "-c", "copy"]);
    command.output(destination);
    command
}

/// Checks whether a file looks like a video by sniffing its first bytes
pub fn is_video_file(file_path: &Path) -> bool {
    // Only read the first 8KB for file type detection
    const BUFFER_SIZE: usize = 8192;

    let mut file = match File::open(file_path) {
        Ok(f) => f,
        Err(_) => return false,
    };

    let mut buffer = vec![0u8; BUFFER_SIZE];
    let bytes_read = match file.read(&mut buffer) {
        Ok(n) => n,
        Err(_) => return false,
    };

    buffer.truncate(bytes_read);

    infer::is_video(&buffer)
}

fn require(path: &Path) -> Result<(), MediaToolError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(MediaToolError::MissingInput(path.to_path_buf()))
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

/// Runs a prepared ffmpeg command to completion
///
/// Error log lines are collected so a failed run can be reported with the
/// reason ffmpeg gave.
fn run(label: &str, command: &mut FfmpegCommand) -> Result<(), MediaToolError> {
    debug!("running ffmpeg ({})", label);

    let mut child = command
        .spawn()
        .map_err(|e| MediaToolError::Spawn(e.to_string()))?;

    let mut errors = Vec::new();
    let events = child
        .iter()
        .map_err(|e| MediaToolError::Spawn(e.to_string()))?;
    for event in events {
        match event {
            FfmpegEvent::Log(LogLevel::Error, message)
            | FfmpegEvent::Log(LogLevel::Fatal, message)
            | FfmpegEvent::Error(message) => errors.push(message),
            _ => {}
        }
    }

    let status = child
        .wait()
        .map_err(|e| MediaToolError::Spawn(e.to_string()))?;

    if !status.success() {
        return Err(MediaToolError::Failed {
            code: status.code(),
            message: errors.join("; "),
        });
    }

    Ok(())
}
