/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Primary key of the completion ledger: the job's stable unique id.
pub type JobId = String;
