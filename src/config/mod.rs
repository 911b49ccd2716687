pub mod load;
pub mod types;

pub use load::DEFAULT_SETTINGS_PATH;
pub use types::{
    AccelerationMode, AccelerationSettings, BatchSettings, CatalogSettings, Config,
    DEFAULT_ACCELERATION_DEVICE, DEFAULT_BATCH_SIZE, DEFAULT_INNER_WORKERS,
    DEFAULT_UNIT_TIMEOUT_SECS, GenerationSettings, OutputSettings, PathTranslation, TagSettings,
    ToolPaths,
};
