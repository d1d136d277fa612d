use super::{types::Config, ConfigError};

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let fail = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

    if config.server.port == 0 {
        return fail("server.port cannot be 0");
    }

    let sticker = &config.sticker;
    if sticker.max_size == 0 {
        return fail("sticker.max_size must be positive");
    }
    if !(sticker.max_video_duration_secs > 0.0) {
        return fail("sticker.max_video_duration_secs must be positive");
    }
    if sticker.max_video_file_size == 0 {
        return fail("sticker.max_video_file_size must be positive");
    }
    if sticker.video_fps == 0 {
        return fail("sticker.video_fps must be positive");
    }
    if sticker.webp_quality > 100 {
        return fail("sticker.webp_quality must be between 0 and 100");
    }
    if sticker.png_compression > 9 {
        return fail("sticker.png_compression must be between 0 and 9");
    }
    if sticker.high_compression.bitrate_kbps > sticker.baseline.bitrate_kbps {
        return fail("sticker.high_compression bitrate cannot exceed the baseline bitrate");
    }

    if config.notifier.heartbeat_secs == 0 {
        return fail("notifier.heartbeat_secs must be positive");
    }
    if config.notifier.listener_buffer == 0 {
        return fail("notifier.listener_buffer must be positive");
    }
    if config.cleanup.interval_secs == 0 {
        return fail("cleanup.interval_secs must be positive");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::EncodeSettings;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = Config::default();
        config.server.port = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_inverted_tiers_fails() {
        let mut config = Config::default();
        config.sticker.high_compression = EncodeSettings {
            bitrate_kbps: 800,
            crf: 45,
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_nan_duration_fails() {
        let mut config = Config::default();
        config.sticker.max_video_duration_secs = f64::NAN;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_png_compression_range() {
        let mut config = Config::default();
        config.sticker.png_compression = 10;
        assert!(validate_config(&config).is_err());
    }
}
