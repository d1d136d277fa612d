//! Two-tier adaptive compression for video stickers.

use std::sync::Arc;

use crate::converter::{
    ConverterError, EncodeSettings, TranscodeHandle, TranscodeOutput, TranscodeRequest, Transcoder,
};
use crate::notifier::ProgressReporter;

/// Progress step after the first pass while its size is checked.
pub const VERIFY_STEP: u32 = 80;

/// Encoder quality tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Tuned for visual fidelity.
    Baseline,
    /// Lower bitrate, higher CRF; used once when the baseline is over the ceiling.
    HighCompression,
}

impl Tier {
    /// The tier to retry with, if any. There is no tier after `HighCompression`.
    pub fn escalate(self) -> Option<Tier> {
        match self {
            Self::Baseline => Some(Self::HighCompression),
            Self::HighCompression => None,
        }
    }

    /// Progress steps (of 100) covered by a pass at this tier.
    pub fn progress_range(self) -> (u32, u32) {
        match self {
            Self::Baseline => (15, 75),
            Self::HighCompression => (85, 95),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::HighCompression => "high_compression",
        }
    }

    fn start_message(self) -> &'static str {
        match self {
            Self::Baseline => "Converting video",
            Self::HighCompression => "File too large, applying higher compression",
        }
    }

    /// Progress message while a pass at this tier runs.
    pub fn pass_message(self, percent: f32) -> String {
        let percent = percent.clamp(0.0, 100.0).round();
        match self {
            Self::Baseline => format!("Converting video... {}%", percent),
            Self::HighCompression => format!("Applying high compression... {}%", percent),
        }
    }

    /// Maps a pass's own 0-100 percent into this tier's step range.
    pub fn map_progress(self, percent: f32) -> u32 {
        let (lo, hi) = self.progress_range();
        let fraction = f64::from(percent.clamp(0.0, 100.0)) / 100.0;
        lo + (f64::from(hi - lo) * fraction).round() as u32
    }
}

/// Encoder settings per tier and the size ceiling that triggers escalation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressionPolicy {
    pub baseline: EncodeSettings,
    pub high_compression: EncodeSettings,
    pub max_output_bytes: u64,
}

impl CompressionPolicy {
    pub fn settings(&self, tier: Tier) -> EncodeSettings {
        match tier {
            Tier::Baseline => self.baseline,
            Tier::HighCompression => self.high_compression,
        }
    }

    pub fn fits(&self, size_bytes: u64) -> bool {
        size_bytes <= self.max_output_bytes
    }
}

/// Result of running the policy over one clip.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionOutcome {
    pub output: TranscodeOutput,
    /// Tier of the pass that produced `output`.
    pub tier: Tier,
    pub passes: u32,
    /// Whether `output` is within the ceiling.
    pub size_valid: bool,
}

/// Drives the transcoder through at most one pass per tier.
pub struct CompressionController {
    transcoder: Arc<dyn Transcoder>,
    policy: CompressionPolicy,
}

impl CompressionController {
    pub fn new(transcoder: Arc<dyn Transcoder>, policy: CompressionPolicy) -> Self {
        Self { transcoder, policy }
    }

    /// Encodes `request` at the baseline tier, escalating once if the output
    /// is over the ceiling. The request's own settings are replaced per tier;
    /// every pass writes to the same output path.
    ///
    /// A second pass that is still too large is not an error: the outcome
    /// carries `size_valid: false`.
    pub async fn run(
        &self,
        mut request: TranscodeRequest,
        reporter: &mut dyn ProgressReporter,
    ) -> Result<CompressionOutcome, ConverterError> {
        let mut tier = Tier::Baseline;
        let mut passes = 0;

        loop {
            request.settings = self.policy.settings(tier);
            reporter.update(tier.progress_range().0, tier.start_message());

            let output = TranscodeHandle::spawn(Arc::clone(&self.transcoder), request.clone())
                .run_with(|p| {
                    reporter.update(tier.map_progress(p.percent), &tier.pass_message(p.percent))
                })
                .await?;
            passes += 1;

            if tier == Tier::Baseline {
                reporter.update(VERIFY_STEP, "Checking file size");
            }

            let size_valid = self.policy.fits(output.size_bytes);
            tracing::debug!(
                job_id = %request.job_id,
                tier = tier.as_str(),
                size_bytes = output.size_bytes,
                ceiling = self.policy.max_output_bytes,
                "Encode pass finished"
            );

            if size_valid {
                return Ok(CompressionOutcome {
                    output,
                    tier,
                    passes,
                    size_valid,
                });
            }

            match tier.escalate() {
                Some(next) => {
                    tracing::info!(
                        job_id = %request.job_id,
                        size_bytes = output.size_bytes,
                        ceiling = self.policy.max_output_bytes,
                        "Output over size ceiling, re-encoding with higher compression"
                    );
                    tier = next;
                }
                None => {
                    tracing::warn!(
                        job_id = %request.job_id,
                        size_bytes = output.size_bytes,
                        ceiling = self.policy.max_output_bytes,
                        "Output still over size ceiling after high compression"
                    );
                    return Ok(CompressionOutcome {
                        output,
                        tier,
                        passes,
                        size_valid,
                    });
                }
            }
        }
    }
}
