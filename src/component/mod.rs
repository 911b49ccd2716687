//! 功能元件模組
//!
//! 每個子模組實現處理流程中的一個元件，包含主要邏輯和專用工具

pub mod batch_coordinator;
pub mod claim_manager;
pub mod derivative;
pub mod health_check;
pub mod mosaic_generator;
pub mod preview_generator;
pub mod scene_processor;
pub mod work_discovery;

pub use batch_coordinator::BatchCoordinator;
pub use claim_manager::{CatalogClaims, ClaimGuard, ClaimStore, ErrorTag};
pub use derivative::{GenerationError, GenerationReport, SubTaskResult};
pub use health_check::{HealthReport, run_health_check};
pub use mosaic_generator::MosaicGenerator;
pub use preview_generator::{PreviewGenerator, PreviewSettings};
pub use scene_processor::{BatchOutcome, FailureKind, SceneProcessor, UnitStatus};
pub use work_discovery::WorkDiscovery;
