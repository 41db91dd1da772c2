//! Running the ffmpeg binary and reading its progress.

use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Child, ChildStderr, Command, Stdio};
use std::thread::JoinHandle;

use slidecast_common::config::EncoderConfig;
use slidecast_common::error::{SlidecastError, SlidecastResult};

use crate::backend::{CancelSignal, ProgressPhase, ProgressReporter};

/// Lines of stderr kept in error messages.
const STDERR_TAIL_LINES: usize = 20;

/// Whether `binary` can be executed: an existing path, or a name on `PATH`.
pub fn command_exists(binary: &str) -> bool {
    if binary.contains(std::path::MAIN_SEPARATOR) {
        return Path::new(binary).is_file();
    }
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Last `STDERR_TAIL_LINES` non-empty lines of `output`.
pub fn stderr_tail(output: &str) -> String {
    let lines: Vec<&str> = output
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Read stderr to the end on its own thread so ffmpeg never blocks on a
/// full pipe.
pub fn drain_stderr(stderr: ChildStderr) -> JoinHandle<String> {
    std::thread::spawn(move || -> String {
        let mut reader = BufReader::new(stderr);
        let mut output = String::new();
        match reader.read_to_string(&mut output) {
            Ok(_) => output,
            Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
        }
    })
}

/// Join a stderr drain thread.
pub fn join_stderr(handle: JoinHandle<String>) -> String {
    handle
        .join()
        .unwrap_or_else(|_| "<failed to join stderr reader>".to_string())
}

/// Accumulated `-progress` key/value state.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ProgressState {
    pub out_time_secs: f64,
    pub frame: u64,
    pub complete: bool,
}

impl ProgressState {
    pub fn update(&mut self, key: &str, value: &str) {
        match key {
            // Despite the name, ffmpeg reports out_time_ms in microseconds.
            "out_time_ms" | "out_time_us" => {
                if let Ok(us) = value.parse::<f64>() {
                    self.out_time_secs = us / 1_000_000.0;
                }
            }
            "frame" => {
                if let Ok(frame) = value.parse::<u64>() {
                    self.frame = frame;
                }
            }
            "progress" => {
                self.complete = value == "end";
            }
            _ => {}
        }
    }

    /// Percent of `expected_duration_secs` written so far.
    pub fn percent(&self, expected_duration_secs: f64) -> f64 {
        if self.complete {
            return 100.0;
        }
        if expected_duration_secs <= 0.0 {
            return 0.0;
        }
        (self.out_time_secs / expected_duration_secs * 100.0).clamp(0.0, 100.0)
    }
}

/// H.264 baseline/AAC output options shared by every ffmpeg invocation.
pub fn output_codec_args(encoder: &EncoderConfig, with_audio: bool) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        encoder.preset.clone(),
        "-crf".into(),
        encoder.crf.to_string(),
        "-profile:v".into(),
        "baseline".into(),
        "-level".into(),
        "4.0".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
    ];
    if with_audio {
        args.extend([
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            format!("{}k", encoder.audio_bitrate_kbps.max(64)),
        ]);
    } else {
        args.push("-an".into());
    }
    args.extend(["-movflags".into(), "+faststart".into()]);
    args
}

/// Run ffmpeg with `-progress pipe:1` in `args`, forwarding progress until
/// it exits. Kills the child if `cancel` fires.
pub fn run_ffmpeg(
    ffmpeg_bin: &str,
    args: &[String],
    expected_duration_secs: f64,
    progress: &ProgressReporter,
    cancel: &CancelSignal,
) -> SlidecastResult<()> {
    tracing::debug!(args = ?args, "Running ffmpeg");
    let mut child = Command::new(ffmpeg_bin)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| SlidecastError::encoding(format!("Failed to start {ffmpeg_bin}: {e}")))?;

    let start = std::time::Instant::now();
    tracing::info!(pid = child.id(), args_len = args.len(), "ffmpeg process started");

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| SlidecastError::encoding("Failed to capture ffmpeg stdout"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| SlidecastError::encoding("Failed to capture ffmpeg stderr"))?;
    let stderr_task = drain_stderr(stderr);

    let mut reader = BufReader::new(stdout);
    let mut line = String::new();
    let mut state = ProgressState::default();
    loop {
        if cancel.is_cancelled() {
            kill_quietly(&mut child);
            let _ = join_stderr(stderr_task);
            return Err(SlidecastError::Cancelled);
        }

        line.clear();
        let bytes = reader
            .read_line(&mut line)
            .map_err(|e| SlidecastError::encoding(format!("Failed reading ffmpeg progress: {e}")))?;
        if bytes == 0 {
            break;
        }

        if let Some((key, value)) = line.trim().split_once('=') {
            state.update(key, value);
            if key == "progress" {
                progress.report(ProgressPhase::Encoding, state.percent(expected_duration_secs));
            }
        }
    }

    let status = child
        .wait()
        .map_err(|e| SlidecastError::encoding(format!("Failed to wait on ffmpeg: {e}")))?;
    let stderr_output = join_stderr(stderr_task);

    if !status.success() {
        return Err(SlidecastError::encoding(format!(
            "ffmpeg failed ({status}): {}",
            stderr_tail(&stderr_output)
        )));
    }

    tracing::info!(
        elapsed_ms = start.elapsed().as_millis() as u64,
        frames = state.frame,
        "ffmpeg finished"
    );
    progress.report(ProgressPhase::Encoding, 100.0);
    Ok(())
}

/// Container duration of `path` in seconds, as reported by ffprobe.
pub fn measure_duration(ffprobe_bin: &str, path: &Path) -> SlidecastResult<f64> {
    let output = Command::new(ffprobe_bin)
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| SlidecastError::encoding(format!("Failed to start {ffprobe_bin}: {e}")))?;
    if !output.status.success() {
        return Err(SlidecastError::encoding(format!(
            "ffprobe failed on {} ({}): {}",
            path.display(),
            output.status,
            stderr_tail(&String::from_utf8_lossy(&output.stderr))
        )));
    }
    parse_ffprobe_duration(&String::from_utf8_lossy(&output.stdout)).ok_or_else(|| {
        SlidecastError::encoding(format!("ffprobe reported no duration for {}", path.display()))
    })
}

/// First line of ffprobe output that is a non-negative number of seconds.
pub fn parse_ffprobe_duration(stdout: &str) -> Option<f64> {
    stdout
        .lines()
        .filter_map(|line| line.trim().parse::<f64>().ok())
        .find(|secs| secs.is_finite() && *secs >= 0.0)
}

pub(crate) fn kill_quietly(child: &mut Child) {
    if let Err(err) = child.kill() {
        tracing::debug!(error = %err, "ffmpeg already exited");
    }
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_state_parses_keys() {
        let mut state = ProgressState::default();
        state.update("frame", "90");
        state.update("out_time_us", "3000000");
        state.update("progress", "continue");
        assert_eq!(state.frame, 90);
        assert!((state.percent(6.0) - 50.0).abs() < 1e-9);
        state.update("progress", "end");
        assert_eq!(state.percent(6.0), 100.0);
    }

    #[test]
    fn test_progress_ignores_garbage() {
        let mut state = ProgressState::default();
        state.update("out_time_ms", "N/A");
        state.update("bitrate", "1234kbits/s");
        assert_eq!(state, ProgressState::default());
        assert_eq!(state.percent(0.0), 0.0);
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let output: String = (0..50).map(|i| format!("line {i}\n\n")).collect();
        let tail = stderr_tail(&output);
        assert_eq!(tail.lines().count(), STDERR_TAIL_LINES);
        assert!(tail.ends_with("line 49"));
        assert!(tail.starts_with("line 30"));
    }

    #[test]
    fn test_codec_args_follow_config() {
        let encoder = EncoderConfig {
            crf: 28,
            ..EncoderConfig::default()
        };
        let args = output_codec_args(&encoder, false);
        let crf = args.iter().position(|a| a == "-crf").unwrap();
        assert_eq!(args[crf + 1], "28");
        assert!(args.contains(&"-an".to_string()));
        assert!(output_codec_args(&encoder, true).contains(&"aac".to_string()));
    }

    #[test]
    fn test_missing_binary_reported() {
        assert!(!command_exists("/definitely/not/ffmpeg"));
        let err = run_ffmpeg(
            "/definitely/not/ffmpeg",
            &[],
            1.0,
            &ProgressReporter::disabled(),
            &CancelSignal::never(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "encoding");
    }

    #[test]
    fn test_parse_ffprobe_duration() {
        assert_eq!(parse_ffprobe_duration("6.016000\n"), Some(6.016));
        assert_eq!(parse_ffprobe_duration("N/A\n5.5\n"), Some(5.5));
        assert_eq!(parse_ffprobe_duration("N/A\n"), None);
        assert_eq!(parse_ffprobe_duration(""), None);
    }

    #[test]
    fn test_missing_ffprobe_reported() {
        let err = measure_duration("/definitely/not/ffprobe", Path::new("/tmp/x.mp4")).unwrap_err();
        assert_eq!(err.kind(), "encoding");
    }
}
