pub mod analysis;
pub mod config;
pub mod error;
pub mod model;
pub mod orchestrator;

pub use analysis::{MultiFeatureExtractor, RhythmExtractor, RhythmOutput};
pub use config::{ExtractionConfig, FailurePolicy};
pub use error::{AnalysisError, ExtractionError};
pub use model::{AudioAsset, RhythmAnalysisResult};
pub use orchestrator::{BatchReport, Orchestrator};

/// Initialise l'état global de l'analyse ; à appeler une fois au démarrage.
/// Les appels suivants sont sans effet.
pub fn init() {
    analysis::context();
}
