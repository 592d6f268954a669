pub mod pull_request;
pub mod report;
pub mod sync_state;
pub mod weekly_metric;
