//! External media extractor.
//!
//! [`YtDlpExtractor`] runs `yt-dlp` (or a compatible fork) as a child process.
//! Arguments are passed as an argv list, never through a shell.

use crate::config::{EXTRACTOR_AUDIO_FORMAT, EXTRACTOR_MAX_SOURCE_MB, EXTRACTOR_RETRIES};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

/// Stderr fragments that mean the media cannot be fetched at all
const UNAVAILABLE_PATTERNS: &[&str] = &[
    "Video unavailable",
    "Private video",
    "This video is private",
    "This video is not available",
    "Sign in to confirm your age",
    "members-only",
    "removed by the uploader",
    "no longer available",
    "blocked it in your country",
    "who has blocked it on copyright grounds",
    "This video has been removed",
    "Unsupported URL",
    "is not a valid URL",
    "Premieres in",
    "This live event will begin",
    "Requested format is not available",
];

/// Longest stderr excerpt kept in an error
const MAX_ERROR_OUTPUT: usize = 2_000;

/// Errors returned by an extractor
#[derive(Debug, Error)]
pub enum ExtractorError {
    /// Process could not be started or its output read
    #[error("failed to run extractor: {0}")]
    Io(#[from] std::io::Error),
    /// Invocation exceeded its time budget and was killed
    #[error("extractor timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    /// Media is private, removed, blocked or otherwise unsupported
    #[error("media unavailable: {0}")]
    Unavailable(String),
    /// Any other non-zero exit
    #[error("extractor exited with {code:?}: {output}")]
    Failed {
        /// Exit code, `None` when killed by a signal
        code: Option<i32>,
        /// Trimmed stderr
        output: String,
    },
    /// Filename resolution printed nothing usable
    #[error("extractor returned no filename")]
    EmptyFilename,
}

/// Capability boundary to the extraction tool
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Extractor: Send + Sync {
    /// File name the audio will have once fetched (no directory part)
    async fn resolve_filename(&self, reference: &str) -> Result<String, ExtractorError>;

    /// Fetch and convert the audio into `dir`
    async fn fetch_audio(&self, reference: &str, dir: &Path) -> Result<(), ExtractorError>;
}

/// yt-dlp backed [`Extractor`]
#[derive(Debug, Clone)]
pub struct YtDlpExtractor {
    binary: PathBuf,
    timeout: Duration,
}

impl YtDlpExtractor {
    /// Use `binary` with a per-invocation `timeout`
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    async fn run(&self, args: Vec<String>) -> Result<String, ExtractorError> {
        let mut command = Command::new(&self.binary);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own group, so helpers it starts (ffmpeg) die with it on timeout
        #[cfg(unix)]
        command.process_group(0);

        debug!(binary = %self.binary.display(), ?args, "Running extractor");

        let child = command.spawn()?;
        let pid = child.id();
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                if let Some(pid) = pid {
                    kill_process_group(pid).await;
                }
                return Err(ExtractorError::Timeout(self.timeout));
            }
        };

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(classify_failure(output.status.code(), &stderr))
    }
}

/// SIGKILL every process in the group led by `pid`
#[cfg(unix)]
async fn kill_process_group(pid: u32) {
    let result = Command::new("kill")
        .args(["-KILL", "--", &format!("-{pid}")])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    match result {
        Ok(status) if status.success() => debug!(pid, "Killed extractor process group"),
        Ok(status) => warn!(pid, code = ?status.code(), "Failed to kill extractor process group"),
        Err(e) => warn!(pid, error = %e, "Failed to kill extractor process group"),
    }
}

/// Dropping the child kills it; there is no group to clean up
#[cfg(not(unix))]
async fn kill_process_group(_pid: u32) {}

#[async_trait]
impl Extractor for YtDlpExtractor {
    #[instrument(skip(self))]
    async fn resolve_filename(&self, reference: &str) -> Result<String, ExtractorError> {
        let stdout = self.run(filename_args(reference)).await?;
        parse_filename(&stdout).ok_or(ExtractorError::EmptyFilename)
    }

    #[instrument(skip(self))]
    async fn fetch_audio(&self, reference: &str, dir: &Path) -> Result<(), ExtractorError> {
        self.run(fetch_args(reference, dir)).await?;
        Ok(())
    }
}

/// Arguments printing the final audio file name without downloading
#[must_use]
pub fn filename_args(reference: &str) -> Vec<String> {
    vec![
        "--get-filename".to_string(),
        "-o".to_string(),
        format!("%(title)s.{EXTRACTOR_AUDIO_FORMAT}"),
        "--".to_string(),
        reference.to_string(),
    ]
}

/// Arguments downloading the best small audio stream and converting it
#[must_use]
pub fn fetch_args(reference: &str, dir: &Path) -> Vec<String> {
    vec![
        "-o".to_string(),
        dir.join("%(title)s.%(ext)s").to_string_lossy().into_owned(),
        "-k".to_string(),
        "-x".to_string(),
        "--audio-quality".to_string(),
        "0".to_string(),
        "--retries".to_string(),
        EXTRACTOR_RETRIES.to_string(),
        "--no-part".to_string(),
        "--audio-format".to_string(),
        EXTRACTOR_AUDIO_FORMAT.to_string(),
        "-f".to_string(),
        format!("bestaudio[filesize<{EXTRACTOR_MAX_SOURCE_MB}M]"),
        "--".to_string(),
        reference.to_string(),
    ]
}

/// Last non-empty stdout line, which is where the file name is printed
fn parse_filename(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        .map(ToString::to_string)
}

fn classify_failure(code: Option<i32>, stderr: &str) -> ExtractorError {
    let output = truncate(stderr.trim(), MAX_ERROR_OUTPUT);
    if UNAVAILABLE_PATTERNS.iter().any(|p| stderr.contains(p)) {
        ExtractorError::Unavailable(output)
    } else {
        ExtractorError::Failed { code, output }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_args() {
        assert_eq!(
            filename_args("dQw4w9WgXcQ"),
            ["--get-filename", "-o", "%(title)s.mp3", "--", "dQw4w9WgXcQ"]
        );
    }

    #[test]
    fn test_fetch_args_fixed_policies() {
        let args = fetch_args("abc123", Path::new("files/42"));
        let expected_output = Path::new("files/42")
            .join("%(title)s.%(ext)s")
            .to_string_lossy()
            .into_owned();

        assert_eq!(args[0], "-o");
        assert_eq!(args[1], expected_output);
        let joined = args[2..].join(" ");
        assert_eq!(
            joined,
            "-k -x --audio-quality 0 --retries 5 --no-part --audio-format mp3 \
             -f bestaudio[filesize<10M] -- abc123"
        );
    }

    #[test]
    fn test_reference_is_never_an_option() {
        let args = fetch_args("--exec=rm -rf /", Path::new("d"));
        let separator = args.iter().position(|a| a == "--").expect("separator");
        assert_eq!(args[separator + 1], "--exec=rm -rf /");
        assert_eq!(separator + 2, args.len());
    }

    #[test]
    fn test_parse_filename() {
        assert_eq!(
            parse_filename("WARNING: something\nMy Song.mp3\n\n"),
            Some("My Song.mp3".to_string())
        );
        assert_eq!(parse_filename("  \n"), None);
    }

    #[test]
    fn test_classify_failure() {
        assert!(matches!(
            classify_failure(Some(1), "ERROR: [youtube] x: Private video. Sign in"),
            ExtractorError::Unavailable(_)
        ));
        assert!(matches!(
            classify_failure(Some(1), "ERROR: Unsupported URL: https://example.com"),
            ExtractorError::Unavailable(_)
        ));
        assert!(matches!(
            classify_failure(Some(2), "ERROR: ffprobe not found"),
            ExtractorError::Failed { code: Some(2), .. }
        ));
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("ééééé", 2), "éé...");
    }

    #[tokio::test]
    async fn test_missing_binary_is_io_error() {
        let extractor = YtDlpExtractor::new(
            "/nonexistent/definitely-not-yt-dlp",
            Duration::from_secs(5),
        );
        let result = extractor.resolve_filename("abc").await;
        assert!(matches!(result, Err(ExtractorError::Io(_))));
    }

    /// Executable shell script in `dir`
    #[cfg(unix)]
    fn script(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-yt-dlp");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("chmod script");
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hung_extractor_times_out() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let binary = script(tmp.path(), "sleep 5");
        let extractor = YtDlpExtractor::new(binary, Duration::from_millis(200));

        let started = std::time::Instant::now();
        let result = extractor.fetch_audio("abc123", tmp.path()).await;

        assert!(
            matches!(result, Err(ExtractorError::Timeout(t)) if t == Duration::from_millis(200)),
            "{result:?}"
        );
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_script_output_is_returned() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let binary = script(tmp.path(), "echo 'WARNING: slow'\necho 'My Song.mp3'");
        let extractor = YtDlpExtractor::new(binary, Duration::from_secs(5));

        let name = extractor.resolve_filename("abc123").await.expect("filename");
        assert_eq!(name, "My Song.mp3");
    }

    /// False once the process has exited, even if it is not reaped yet
    #[cfg(target_os = "linux")]
    fn process_is_running(pid: u32) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => stat
                .rsplit_once(')')
                .and_then(|(_, rest)| rest.trim_start().chars().next())
                .is_some_and(|state| state != 'Z' && state != 'X'),
            Err(_) => false,
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_kills_helper_processes() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let pid_file = tmp.path().join("helper.pid");
        let binary = script(
            tmp.path(),
            &format!("sleep 30 &\necho $! > '{}'\nwait", pid_file.display()),
        );
        let extractor = YtDlpExtractor::new(binary, Duration::from_millis(500));

        let result = extractor.fetch_audio("abc123", tmp.path()).await;
        assert!(matches!(result, Err(ExtractorError::Timeout(_))), "{result:?}");

        let pid: u32 = std::fs::read_to_string(&pid_file)
            .expect("helper pid written")
            .trim()
            .parse()
            .expect("numeric pid");

        let mut running = process_is_running(pid);
        for _ in 0..20 {
            if !running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
            running = process_is_running(pid);
        }
        assert!(!running, "helper {pid} outlived the timeout");
    }
}
