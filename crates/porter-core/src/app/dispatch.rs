//! Dispatch - validate a decoded job against its task and call it.
//!
//! Validation is all-or-nothing: arity first, then every position's kind.
//! The task is only invoked once both pass, on the caller's own task.

use crate::domain::{JobResponse, NormalizedValue, Value, ValueKind};
use crate::typed::RegisteredTask;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DispatchError {
    #[error("invalid number of arguments for job: expected {expected}, got {got}")]
    ArityMismatch { expected: usize, got: usize },

    #[error("argument type mismatch at position {position}: expected {expected}, got {got}")]
    ArgumentTypeMismatch {
        position: usize,
        expected: ValueKind,
        got: ValueKind,
    },

    #[error("task returned an error: {0}")]
    Task(String),
}

impl DispatchError {
    /// `true` when the task body actually ran.
    pub fn invoked(&self) -> bool {
        matches!(self, DispatchError::Task(_))
    }
}

/// Check `args` against the task's parameter list without calling it.
pub fn validate(task: &RegisteredTask, args: &[Value]) -> Result<(), DispatchError> {
    let expected = task.param_kinds();
    if args.len() != expected.len() {
        return Err(DispatchError::ArityMismatch {
            expected: expected.len(),
            got: args.len(),
        });
    }

    for (position, (arg, want)) in args.iter().zip(expected).enumerate() {
        let got = arg.kind();
        if got != *want {
            return Err(DispatchError::ArgumentTypeMismatch {
                position,
                expected: *want,
                got,
            });
        }
    }
    Ok(())
}

/// Validate, invoke and normalize.
pub fn dispatch(
    worker: &str,
    job: &JobResponse,
    task: &RegisteredTask,
    args: Vec<Value>,
) -> Result<Vec<NormalizedValue>, DispatchError> {
    validate(task, &args)?;

    tracing::info!(
        worker,
        job = %job.job_name,
        id = job.id,
        arguments = ?args,
        "job triggered"
    );

    let results = task
        .invoke(args)
        .map_err(|e| DispatchError::Task(e.to_string()))?;
    let results = normalize(results);

    tracing::info!(worker, job = %job.job_name, id = job.id, ?results, "job finished");
    Ok(results)
}

pub fn normalize(values: Vec<Value>) -> Vec<NormalizedValue> {
    values.into_iter().map(Value::normalize).collect()
}
