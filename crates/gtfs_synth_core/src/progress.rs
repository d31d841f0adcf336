/// Trait for handling progress events during feed synthesis
pub trait ProgressHandler: Send + Sync {
    /// Called when a named stage (e.g. "stops", "bus", "rail") begins
    fn on_start_stage(&self, stage: &str);

    /// Called when a named stage ends
    fn on_finish_stage(&self, stage: &str);

    /// Set total number of trip patterns to synthesize
    fn set_total_patterns(&self, count: usize);

    /// Called after each pattern has been synthesized for every day type
    fn increment_pattern_progress(&self);
}

/// A no-op progress handler
pub struct NoOpProgressHandler;

impl ProgressHandler for NoOpProgressHandler {
    fn on_start_stage(&self, _stage: &str) {}
    fn on_finish_stage(&self, _stage: &str) {}
    fn set_total_patterns(&self, _count: usize) {}
    fn increment_pattern_progress(&self) {}
}
