//! External encoder invocation
//!
//! The FSB encoder is an external tool invoked as
//! `<encoder> -o <out> -format <vorbis|fadpcm|pcm> [-q <0..100>] <buildlist>`
//! (the quality argument only applies to Vorbis). Success means exit code 0
//! *and* the output file exists; anything else is a failure carrying the
//! captured stdout+stderr.
//!
//! Progress lines on stdout have the shape `[N]: <text>` with a zero-based
//! file index. Every line is forwarded verbatim to the session log; parsed
//! progress reports are throttled to one UI update per 33 ms.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::progress::CancellationToken;
use crate::session_log::SessionLog;
use crate::workspace::BuildFormat;

/// Minimum interval between parsed progress reports
const PROGRESS_THROTTLE: Duration = Duration::from_millis(33);

/// Poll interval while waiting on the child process
const WAIT_POLL: Duration = Duration::from_millis(10);

/// One encoder invocation
#[derive(Debug)]
pub struct EncodeRequest<'a> {
    pub buildlist: &'a Path,
    pub output: &'a Path,
    pub format: BuildFormat,
    /// Vorbis quality; ignored by the tool for fixed formats
    pub quality: Option<u8>,
    /// Sub-sound count, used to phrase progress as `N of total`
    pub sub_sound_total: usize,
}

/// Result of a successful encoder run
#[derive(Debug, Clone, Copy)]
pub struct EncodeOutcome {
    pub output_size: u64,
}

/// Parsed `[N]: <text>` progress report
#[derive(Debug, Clone)]
pub struct EncoderProgress {
    /// Zero-based index from the tool output
    pub file_index: usize,
    /// One-based position, `current` of `total`
    pub current: usize,
    pub total: usize,
    pub text: String,
}

/// Seam for the external encoder, so the orchestrator (and its tests) can
/// run against scripted encoders.
pub trait FsbEncoder: Send + Sync {
    fn encode(&self, request: &EncodeRequest<'_>) -> Result<EncodeOutcome>;
}

type ProgressSink = Arc<dyn Fn(&EncoderProgress) + Send + Sync>;

/// Runs the real encoder tool as a child process.
///
/// Holds the active child handle so a cancellation (or an explicit
/// [`ProcessEncoder::terminate`]) can force-kill it mid-run.
pub struct ProcessEncoder {
    tool_path: PathBuf,
    log: Arc<SessionLog>,
    cancel: CancellationToken,
    progress: Option<ProgressSink>,
    child: Arc<Mutex<Option<Child>>>,
}

impl ProcessEncoder {
    pub fn new(tool_path: impl Into<PathBuf>, log: Arc<SessionLog>) -> Self {
        Self {
            tool_path: tool_path.into(),
            log,
            cancel: CancellationToken::new(),
            progress: None,
            child: Arc::new(Mutex::new(None)),
        }
    }

    /// Observe this token: when it fires mid-encode the child is killed and
    /// the run returns [`Error::Cancelled`].
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Receive parsed progress reports (throttled).
    #[must_use]
    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.progress = Some(sink);
        self
    }

    /// Force-terminate the active child, if any.
    pub fn terminate(&self) {
        let mut guard = lock(&self.child);
        if let Some(child) = guard.as_mut() {
            let _ = child.kill();
        }
    }

    fn wait_for_exit(&self) -> Result<std::process::ExitStatus> {
        loop {
            {
                let mut guard = lock(&self.child);
                let Some(child) = guard.as_mut() else {
                    return Err(Error::Encoder {
                        status: None,
                        output: "encoder child disappeared".to_string(),
                    });
                };
                if let Some(status) = child.try_wait()? {
                    guard.take();
                    return Ok(status);
                }
                if self.cancel.is_cancelled() {
                    let _ = child.kill();
                    let _ = child.wait();
                    guard.take();
                    return Err(Error::Cancelled);
                }
            }
            std::thread::sleep(WAIT_POLL);
        }
    }
}

impl FsbEncoder for ProcessEncoder {
    fn encode(&self, request: &EncodeRequest<'_>) -> Result<EncodeOutcome> {
        let mut command = Command::new(&self.tool_path);
        command
            .arg("-o")
            .arg(request.output)
            .arg("-format")
            .arg(request.format.as_encoder_arg());
        if let Some(quality) = request.quality.filter(|_| request.format.has_quality()) {
            command.arg("-q").arg(quality.to_string());
        }
        command
            .arg(request.buildlist)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        self.log.log(&format!(
            "Encoder: {} -o {} -format {}{} {}",
            self.tool_path.display(),
            request.output.display(),
            request.format.as_encoder_arg(),
            request
                .quality
                .filter(|_| request.format.has_quality())
                .map(|q| format!(" -q {q}"))
                .unwrap_or_default(),
            request.buildlist.display()
        ));

        let mut child = command.spawn().map_err(|e| Error::Encoder {
            status: None,
            output: format!("failed to spawn {}: {e}", self.tool_path.display()),
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        *lock(&self.child) = Some(child);

        let stdout_thread = stdout.map(|out| {
            let log = Arc::clone(&self.log);
            let progress = self.progress.clone();
            let total = request.sub_sound_total;
            std::thread::spawn(move || read_stdout(out, &log, progress.as_ref(), total))
        });
        let stderr_thread = stderr.map(|err| {
            std::thread::spawn(move || {
                let mut captured = String::new();
                for line in BufReader::new(err).lines().map_while(std::io::Result::ok) {
                    captured.push_str(&line);
                    captured.push('\n');
                }
                captured
            })
        });

        let status = self.wait_for_exit();
        let captured_stdout = stdout_thread
            .and_then(|t| t.join().ok())
            .unwrap_or_default();
        let captured_stderr = stderr_thread
            .and_then(|t| t.join().ok())
            .unwrap_or_default();
        let status = status?;

        if status.success() && request.output.is_file() {
            let output_size = std::fs::metadata(request.output)?.len();
            self.log
                .log(&format!("Encoder finished, {output_size} bytes"));
            Ok(EncodeOutcome { output_size })
        } else {
            Err(Error::Encoder {
                status: status.code(),
                output: format!("{captured_stdout}{captured_stderr}"),
            })
        }
    }
}

fn read_stdout(
    out: std::process::ChildStdout,
    log: &SessionLog,
    progress: Option<&ProgressSink>,
    total: usize,
) -> String {
    let mut captured = String::new();
    let mut last_emit: Option<Instant> = None;

    for line in BufReader::new(out).lines().map_while(std::io::Result::ok) {
        // Every line goes to the log verbatim; only parsed progress is
        // throttled.
        log.log(&line);
        captured.push_str(&line);
        captured.push('\n');

        if let (Some(sink), Some(report)) = (progress, parse_progress_line(&line, total)) {
            let due = last_emit.is_none_or(|t| t.elapsed() >= PROGRESS_THROTTLE);
            if due {
                sink(&report);
                last_emit = Some(Instant::now());
            }
        }
    }
    captured
}

/// Parse a `[N]: <text>` progress line; `N` is zero-based.
fn parse_progress_line(line: &str, total: usize) -> Option<EncoderProgress> {
    let rest = line.strip_prefix('[')?;
    let close = rest.find(']')?;
    let file_index: usize = rest[..close].parse().ok()?;
    let text = rest[close + 1..].strip_prefix(':')?.trim_start();

    Some(EncoderProgress {
        file_index,
        current: file_index + 1,
        total,
        text: text.to_string(),
    })
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
