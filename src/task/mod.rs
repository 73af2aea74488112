//! Units of work a client hands to the compute service.
//!
//! A task carries every input it needs and produces one result type. On the
//! wire tasks travel inside a [`TaskEnvelope`] and come back as a
//! [`TaskOutput`]; [`RemoteTask`] maps a concrete task onto both so callers
//! keep a typed result.

use std::any::Any;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::ComputeError;

pub mod add;
pub mod sort;

pub use add::AddTask;
pub use sort::{SortTask, SortedPayload, TimedSort};

pub trait Task: Send + 'static {
    type Output: Send + 'static;

    /// Runs the task. Consumes it, so a task executes at most once.
    fn execute(self) -> Result<Self::Output, ComputeError>;
}

/// A task the service knows how to carry and dispatch.
pub trait RemoteTask: Task + Into<TaskEnvelope> {
    /// Picks this task's result out of a dispatched output, or `None` if the
    /// output belongs to a different task kind.
    fn from_output(output: TaskOutput) -> Option<Self::Output>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskEnvelope {
    Add(AddTask),
    Sort(SortTask),
}

impl TaskEnvelope {
    pub fn kind(&self) -> &'static str {
        match self {
            TaskEnvelope::Add(_) => "add",
            TaskEnvelope::Sort(_) => "sort",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskOutput {
    Sum(i64),
    Sorted(SortedPayload),
}

impl Task for TaskEnvelope {
    type Output = TaskOutput;

    fn execute(self) -> Result<TaskOutput, ComputeError> {
        match self {
            TaskEnvelope::Add(task) => task.execute().map(TaskOutput::Sum),
            TaskEnvelope::Sort(task) => task.execute().map(TaskOutput::Sorted),
        }
    }
}

/// Runs a task on the blocking pool. A panic inside the task becomes a
/// server fault carrying the panic message as its cause.
pub async fn execute_blocking<T: Task>(task: T) -> Result<T::Output, ComputeError> {
    match tokio::task::spawn_blocking(move || task.execute()).await {
        Ok(result) => result,
        Err(err) if err.is_panic() => {
            let cause = panic_message(err.into_panic());
            debug!("task panicked: {cause}");
            Err(ComputeError::server_with_cause("task execution panicked", cause))
        }
        Err(err) => Err(ComputeError::server_with_cause("task was cancelled", err)),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
