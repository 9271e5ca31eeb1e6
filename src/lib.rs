pub mod analysis;
pub mod api;
pub mod asr;
pub mod clip;
pub mod config;
pub mod ingest;
pub mod models;
pub mod monitor;
pub mod rpc;
pub mod server;
pub mod store;
pub mod summary;

// Re-export the main entry points for convenience
pub use analysis::density::detect;
pub use analysis::{Analysis, AnalysisResult, HotMoment, PeakDetectionParams};
pub use config::{AppConfig, ConfigManager};
pub use ingest::{ChatDownload, Comment};
pub use monitor::{BroadcastEnded, LiveStateTable};
pub use store::roster::RosterStore;
pub use store::ResultStore;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_structure() {
        // Test that the main types are accessible from the crate root
        assert!(std::any::type_name::<ResultStore>().contains("ResultStore"));
        assert!(std::any::type_name::<PeakDetectionParams>().contains("PeakDetectionParams"));
    }

    #[test]
    fn test_detect_reexport() {
        let analysis = detect(&[], &PeakDetectionParams::default());
        assert!(analysis.hot_moments.is_empty());
        assert!(analysis.time_series_data.is_empty());
    }
}
