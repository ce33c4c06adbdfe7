use serde::{Deserialize, Serialize};

/// Result of one reminder scan pass. Returned by the engine's manual trigger
/// and logged by the scheduler after every tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOutcome {
    /// Candidates the scan examined.
    pub checked: usize,
    /// Candidates marked as notified (delivered, or nothing to attempt).
    pub notified: usize,
    /// Candidates left unmarked for a later in-window retry, plus skipped rows.
    pub failed: usize,
}
