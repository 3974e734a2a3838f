/// Status of a vendor job as seen by this request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Success,
    Failed,
}

/// A job accepted by the vendor. Lives only for the duration of one request.
#[derive(Debug, Clone)]
pub struct Job {
    pub task_id: String,
    pub submitted_seed: u32,
    pub status: JobStatus,
}

impl Job {
    pub fn submitted(task_id: String, submitted_seed: u32) -> Self {
        Self {
            task_id,
            submitted_seed,
            status: JobStatus::Pending,
        }
    }
}

/// Terminal state of the poll loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The vendor reported success; carries the raw result field.
    Succeeded(String),
    /// The vendor reported an error, or the query endpoint failed.
    Failed(String),
    /// The attempt or wall-clock budget ran out.
    TimedOut { last_info: Option<String> },
    /// The inbound request went away.
    Cancelled,
}

impl PollOutcome {
    pub fn job_status(&self) -> JobStatus {
        match self {
            PollOutcome::Succeeded(_) => JobStatus::Success,
            _ => JobStatus::Failed,
        }
    }
}

/// Outcome plus the number of query calls it took.
#[derive(Debug, Clone)]
pub struct PollReport {
    pub outcome: PollOutcome,
    pub attempts: u32,
}
