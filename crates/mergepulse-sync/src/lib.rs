pub mod aggregator;
pub mod engine;
pub mod metrics;
pub mod orchestrator;

pub use aggregator::ProductivityAggregator;
pub use engine::ParallelSyncCoordinator;
pub use metrics::{MetricsService, MetricsSummary};
pub use orchestrator::{RepoOutcome, RepoProgress, SyncOrchestrator};
