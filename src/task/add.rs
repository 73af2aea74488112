use serde::{Deserialize, Serialize};

use super::{RemoteTask, Task, TaskEnvelope, TaskOutput};
use crate::errors::ComputeError;

/// Adds two integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddTask {
    a: i64,
    b: i64,
}

impl AddTask {
    pub fn new(a: i64, b: i64) -> Self {
        Self { a, b }
    }

    pub fn operands(&self) -> (i64, i64) {
        (self.a, self.b)
    }
}

impl Task for AddTask {
    type Output = i64;

    fn execute(self) -> Result<i64, ComputeError> {
        self.a.checked_add(self.b).ok_or_else(|| {
            ComputeError::argument("b", format!("{} + {} overflows i64", self.a, self.b))
        })
    }
}

impl From<AddTask> for TaskEnvelope {
    fn from(task: AddTask) -> Self {
        TaskEnvelope::Add(task)
    }
}

impl RemoteTask for AddTask {
    fn from_output(output: TaskOutput) -> Option<i64> {
        match output {
            TaskOutput::Sum(sum) => Some(sum),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adds_operands() {
        assert_eq!(AddTask::new(40, 2).execute(), Ok(42));
        assert_eq!(AddTask::new(-5, 5).execute(), Ok(0));
    }

    #[test]
    fn overflow_is_argument_fault() {
        let err = AddTask::new(i64::MAX, 1).execute().unwrap_err();
        assert_eq!(err.argument_name(), Some("b"));
    }
}
