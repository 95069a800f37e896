use serde::{Deserialize, Serialize};

use super::argument::Argument;
use super::value::NormalizedValue;

/// What the broker hands a poller.
///
/// Every field falls back to its default, so a body the broker garbled still
/// parses and shows up as an empty `job_name`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobResponse {
    pub id: i64,
    pub job_name: String,
    pub args: Vec<Argument>,
}

impl JobResponse {
    pub fn new(id: i64, job_name: impl Into<String>, args: Vec<Argument>) -> Self {
        Self {
            id,
            job_name: job_name.into(),
            args,
        }
    }

    /// `true` when the response carried no job name.
    pub fn is_empty(&self) -> bool {
        self.job_name.is_empty()
    }

    /// Storage key of this job instance: `<job_name>_<id>`.
    pub fn result_key(&self) -> String {
        format!("{}_{}", self.job_name, self.id)
    }
}

/// Persisted form of a finished job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub args: Vec<Argument>,
    pub result: Vec<NormalizedValue>,
}

impl ResultRecord {
    pub fn new(job: &JobResponse, results: &[NormalizedValue]) -> Self {
        Self {
            args: job.args.clone(),
            result: results.to_vec(),
        }
    }
}
