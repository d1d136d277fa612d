//! FFmpeg-based transcoder implementation.

use async_trait::async_trait;
use regex_lite::Regex;
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use super::config::ConverterConfig;
use super::error::ConverterError;
use super::traits::Transcoder;
use super::types::{MediaAsset, TranscodeOutput, TranscodeProgress, TranscodeRequest};

/// Video codec for sticker output.
const VIDEO_CODEC: &str = "libvpx-vp9";

/// Alpha-capable pixel format required by the sticker platform.
const PIXEL_FORMAT: &str = "yuva420p";

/// FFmpeg-based transcoder producing VP9 WebM stickers.
pub struct FfmpegTranscoder {
    config: ConverterConfig,
}

impl FfmpegTranscoder {
    /// Creates a new FFmpeg transcoder with the given configuration.
    pub fn new(config: ConverterConfig) -> Self {
        Self { config }
    }

    /// Creates a transcoder with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ConverterConfig::default())
    }

    /// Builds ffmpeg arguments for one sticker encode pass.
    fn build_transcode_args(&self, request: &TranscodeRequest) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(), // Overwrite output (the second pass reuses the path)
            "-ss".to_string(),
            format_secs(request.start_secs),
            "-i".to_string(),
            request.input_path.to_string_lossy().to_string(),
            "-t".to_string(),
            format_secs(request.duration_secs),
        ];

        args.extend([
            "-c:v".to_string(),
            VIDEO_CODEC.to_string(),
            "-vf".to_string(),
            format!("scale={}:{},setsar=1", request.width, request.height),
            "-r".to_string(),
            request.fps.to_string(),
            "-an".to_string(),
            "-pix_fmt".to_string(),
            PIXEL_FORMAT.to_string(),
            "-auto-alt-ref".to_string(),
            "0".to_string(),
            "-b:v".to_string(),
            format!("{}k", request.settings.bitrate_kbps),
            "-crf".to_string(),
            request.settings.crf.to_string(),
            "-deadline".to_string(),
            self.config.vp9_deadline.clone(),
            "-cpu-used".to_string(),
            self.config.vp9_cpu_used.to_string(),
        ]);

        // Log level and progress
        args.extend([
            "-loglevel".to_string(),
            self.config.ffmpeg_log_level.clone(),
            "-progress".to_string(),
            "pipe:2".to_string(),
        ]);

        args.extend(self.config.extra_ffmpeg_args.iter().cloned());

        args.push(request.output_path.to_string_lossy().to_string());

        args
    }

    /// Parses ffprobe JSON output into a media descriptor.
    fn parse_probe_output(output: &str) -> Result<MediaAsset, ConverterError> {
        #[derive(Deserialize)]
        struct ProbeOutput {
            format: ProbeFormat,
            streams: Vec<ProbeStream>,
        }

        #[derive(Deserialize)]
        struct ProbeFormat {
            duration: Option<String>,
            size: Option<String>,
        }

        #[derive(Deserialize)]
        struct ProbeStream {
            codec_type: String,
            width: Option<u32>,
            height: Option<u32>,
        }

        let probe: ProbeOutput =
            serde_json::from_str(output).map_err(|e| ConverterError::ParseError {
                reason: format!("Failed to parse ffprobe output: {}", e),
            })?;

        let video_stream = probe
            .streams
            .iter()
            .find(|s| s.codec_type == "video")
            .ok_or_else(|| ConverterError::unsupported_input("no video stream"))?;

        let width = video_stream.width.unwrap_or(0);
        let height = video_stream.height.unwrap_or(0);
        if width == 0 || height == 0 {
            return Err(ConverterError::unsupported_input(
                "video stream has no dimensions",
            ));
        }

        Ok(MediaAsset {
            width,
            height,
            duration_secs: probe
                .format
                .duration
                .as_deref()
                .and_then(|d| d.parse::<f64>().ok()),
            size_bytes: probe
                .format
                .size
                .as_deref()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(0),
        })
    }

    fn spawn_error(&self, e: std::io::Error, binary: &Path, ffprobe: bool) -> ConverterError {
        if e.kind() != std::io::ErrorKind::NotFound {
            return ConverterError::Io(e);
        }
        let path = binary.to_path_buf();
        if ffprobe {
            ConverterError::FfprobeNotFound { path }
        } else {
            ConverterError::FfmpegNotFound { path }
        }
    }
}

/// Seconds formatted for ffmpeg's time options.
fn format_secs(secs: f64) -> String {
    format!("{:.3}", secs)
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn probe(&self, path: &Path) -> Result<MediaAsset, ConverterError> {
        if !path.exists() {
            return Err(ConverterError::InputNotFound {
                path: path.to_path_buf(),
            });
        }

        let output = Command::new(&self.config.ffprobe_path)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .output()
            .await
            .map_err(|e| self.spawn_error(e, &self.config.ffprobe_path, true))?;

        if !output.status.success() {
            return Err(ConverterError::probe_failed(format!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut asset = Self::parse_probe_output(&stdout)?;
        if asset.size_bytes == 0 {
            asset.size_bytes = tokio::fs::metadata(path).await?.len();
        }
        Ok(asset)
    }

    async fn transcode(
        &self,
        request: TranscodeRequest,
        progress_tx: mpsc::Sender<TranscodeProgress>,
    ) -> Result<TranscodeOutput, ConverterError> {
        let start = Instant::now();

        if let Some(parent) = request.output_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|_| {
                ConverterError::OutputDirectoryFailed {
                    path: parent.to_path_buf(),
                }
            })?;
        }

        let args = self.build_transcode_args(&request);
        tracing::debug!(job_id = %request.job_id, "Running ffmpeg {}", args.join(" "));

        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(e, &self.config.ffmpeg_path, false))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ConverterError::transcode_failed("ffmpeg stderr not captured", None))?;
        let mut reader = BufReader::new(stderr).lines();

        let time_regex = Regex::new(r"out_time_ms=(\d+)").ok();
        let progress_interval = self.config.progress_interval();
        let mut last_progress_send: Option<Instant> = None;
        let mut error_output = String::new();

        while let Some(line) = reader.next_line().await? {
            if line.contains("Error") || line.contains("error") {
                error_output.push_str(&line);
                error_output.push('\n');
            }

            let Some(caps) = time_regex.as_ref().and_then(|re| re.captures(&line)) else {
                continue;
            };
            // out_time_ms is reported in microseconds
            let Some(time_secs) = caps
                .get(1)
                .and_then(|m| m.as_str().parse::<f64>().ok())
                .map(|us| us / 1_000_000.0)
            else {
                continue;
            };

            let due = last_progress_send.map_or(true, |t| t.elapsed() >= progress_interval);
            if !due {
                continue;
            }

            let percent = if request.duration_secs > 0.0 {
                (time_secs / request.duration_secs * 100.0).clamp(0.0, 100.0) as f32
            } else {
                0.0
            };

            // Non-blocking send
            let _ = progress_tx.try_send(TranscodeProgress {
                job_id: request.job_id.clone(),
                percent,
                time_secs,
            });
            last_progress_send = Some(Instant::now());
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(ConverterError::transcode_failed(
                format!("FFmpeg exited with code: {:?}", status.code()),
                if error_output.is_empty() {
                    None
                } else {
                    Some(error_output)
                },
            ));
        }

        let output_meta = tokio::fs::metadata(&request.output_path)
            .await
            .map_err(|_| ConverterError::transcode_failed("Output file not created", None))?;

        let _ = progress_tx.try_send(TranscodeProgress {
            job_id: request.job_id.clone(),
            percent: 100.0,
            time_secs: request.duration_secs,
        });

        Ok(TranscodeOutput {
            output_path: request.output_path,
            size_bytes: output_meta.len(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn validate(&self) -> Result<(), ConverterError> {
        Command::new(&self.config.ffmpeg_path)
            .arg("-version")
            .output()
            .await
            .map_err(|e| self.spawn_error(e, &self.config.ffmpeg_path, false))?;

        Command::new(&self.config.ffprobe_path)
            .arg("-version")
            .output()
            .await
            .map_err(|e| self.spawn_error(e, &self.config.ffprobe_path, true))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::EncodeSettings;
    use std::path::PathBuf;

    fn request(settings: EncodeSettings) -> TranscodeRequest {
        TranscodeRequest {
            job_id: "job-1".to_string(),
            input_path: PathBuf::from("/uploads/in.mp4"),
            output_path: PathBuf::from("/output/cat-1.webm"),
            width: 512,
            height: 288,
            start_secs: 1.5,
            duration_secs: 3.0,
            fps: 30,
            settings,
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn test_build_transcode_args_baseline() {
        let transcoder = FfmpegTranscoder::with_defaults();
        let args = transcoder.build_transcode_args(&request(EncodeSettings {
            bitrate_kbps: 400,
            crf: 30,
        }));

        assert_eq!(value_after(&args, "-ss"), Some("1.500"));
        assert_eq!(value_after(&args, "-t"), Some("3.000"));
        assert_eq!(value_after(&args, "-c:v"), Some("libvpx-vp9"));
        assert_eq!(value_after(&args, "-vf"), Some("scale=512:288,setsar=1"));
        assert_eq!(value_after(&args, "-r"), Some("30"));
        assert_eq!(value_after(&args, "-pix_fmt"), Some("yuva420p"));
        assert_eq!(value_after(&args, "-b:v"), Some("400k"));
        assert_eq!(value_after(&args, "-crf"), Some("30"));
        assert_eq!(value_after(&args, "-deadline"), Some("good"));
        assert_eq!(value_after(&args, "-cpu-used"), Some("4"));
        assert!(args.contains(&"-an".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("/output/cat-1.webm"));
    }

    #[test]
    fn test_seek_precedes_input() {
        let transcoder = FfmpegTranscoder::with_defaults();
        let args = transcoder.build_transcode_args(&request(EncodeSettings {
            bitrate_kbps: 150,
            crf: 45,
        }));
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();
        let duration = args.iter().position(|a| a == "-t").unwrap();
        assert!(ss < input);
        assert!(input < duration);
        assert_eq!(value_after(&args, "-b:v"), Some("150k"));
        assert_eq!(value_after(&args, "-crf"), Some("45"));
    }

    #[test]
    fn test_extra_args_before_output() {
        let mut config = ConverterConfig::default();
        config.extra_ffmpeg_args = vec!["-threads".to_string(), "2".to_string()];
        let transcoder = FfmpegTranscoder::new(config);
        let args = transcoder.build_transcode_args(&request(EncodeSettings {
            bitrate_kbps: 400,
            crf: 30,
        }));
        let n = args.len();
        assert_eq!(&args[n - 3..n - 1], &["-threads".to_string(), "2".to_string()]);
    }

    #[test]
    fn test_parse_probe_output_video() {
        let json = r#"{
            "format": {
                "filename": "clip.mp4",
                "format_name": "mov,mp4,m4a,3gp,3g2,mj2",
                "duration": "7.250000",
                "size": "1048576"
            },
            "streams": [
                { "codec_type": "audio", "codec_name": "aac" },
                { "codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080 }
            ]
        }"#;

        let asset = FfmpegTranscoder::parse_probe_output(json).unwrap();
        assert_eq!(asset.width, 1920);
        assert_eq!(asset.height, 1080);
        assert_eq!(asset.duration_secs, Some(7.25));
        assert_eq!(asset.size_bytes, 1048576);
    }

    #[test]
    fn test_parse_probe_output_gif_without_duration() {
        let json = r#"{
            "format": { "filename": "a.gif", "format_name": "gif" },
            "streams": [ { "codec_type": "video", "width": 320, "height": 240 } ]
        }"#;
        let asset = FfmpegTranscoder::parse_probe_output(json).unwrap();
        assert_eq!((asset.width, asset.height), (320, 240));
        assert_eq!(asset.duration_secs, None);
        assert_eq!(asset.size_bytes, 0);
    }

    #[test]
    fn test_parse_probe_output_audio_only_is_unsupported() {
        let json = r#"{
            "format": { "filename": "a.mp3", "duration": "3.0" },
            "streams": [ { "codec_type": "audio" } ]
        }"#;
        let err = FfmpegTranscoder::parse_probe_output(json).unwrap_err();
        assert!(matches!(err, ConverterError::UnsupportedInput { .. }));
        assert!(err.is_input_error());
    }

    #[test]
    fn test_parse_probe_output_garbage() {
        let err = FfmpegTranscoder::parse_probe_output("not json").unwrap_err();
        assert!(matches!(err, ConverterError::ParseError { .. }));
    }

    #[tokio::test]
    async fn test_probe_missing_input() {
        let transcoder = FfmpegTranscoder::with_defaults();
        let err = transcoder
            .probe(Path::new("/definitely/not/here.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConverterError::InputNotFound { .. }));
    }

    #[tokio::test]
    async fn test_validate_missing_binary() {
        let transcoder = FfmpegTranscoder::new(ConverterConfig::with_paths(
            PathBuf::from("/nonexistent/ffmpeg"),
            PathBuf::from("/nonexistent/ffprobe"),
        ));
        let err = transcoder.validate().await.unwrap_err();
        assert!(matches!(err, ConverterError::FfmpegNotFound { .. }));
    }
}
