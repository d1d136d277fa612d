pub mod cleanup;
pub mod config;
pub mod converter;
pub mod notifier;
pub mod processor;
pub mod testing;

pub use cleanup::{create_reaper, FileReaper, ShutdownMode, SweepReport, SweepScheduler};
pub use config::{
    load_config, load_config_from_str, load_default_config, validate_config, Config, ConfigError,
    PublicConfig,
};
pub use converter::{
    ConverterConfig, ConverterError, FfmpegTranscoder, ImageEncoder, MediaAsset,
    RasterImageEncoder, Transcoder,
};
pub use notifier::{
    create_broker, BrokerActor, ClientMessage, Heartbeat, HeartbeatAction, ListenerId,
    ServerMessage, SubscriptionBroker,
};
pub use processor::{
    ConversionJob, ImageStickerResult, ProcessingError, ProcessorConfig, StickerProcessor,
    TrimRange, VideoStickerResult,
};
