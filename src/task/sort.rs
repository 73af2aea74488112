//! Sorting a whitespace-separated list of integers.

use std::io::Read;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::{RemoteTask, Task, TaskEnvelope, TaskOutput};
use crate::errors::ComputeError;

/// Argument name used when the input payload is rejected.
pub const INPUT_PAYLOAD: &str = "input_payload";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("payload is not valid UTF-8 (valid up to byte {valid_up_to})")]
    InvalidUtf8 { valid_up_to: usize },

    #[error("token {position} `{token}` is not a decimal integer")]
    InvalidToken { position: usize, token: String },
}

/// Parses decimal integers separated by ASCII whitespace.
pub fn parse_elements(payload: &[u8]) -> Result<Vec<i64>, PayloadError> {
    let text = std::str::from_utf8(payload).map_err(|e| PayloadError::InvalidUtf8 {
        valid_up_to: e.valid_up_to(),
    })?;

    text.split_ascii_whitespace()
        .enumerate()
        .map(|(position, token)| {
            token.parse::<i64>().map_err(|_| PayloadError::InvalidToken {
                position,
                token: token.to_string(),
            })
        })
        .collect()
}

/// Renders elements as decimal text joined by single spaces.
pub fn encode_elements(elements: &[i64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(elements.len() * 8);
    for (i, value) in elements.iter().enumerate() {
        if i > 0 {
            out.push(b' ');
        }
        out.extend_from_slice(value.to_string().as_bytes());
    }
    out
}

/// Sorts ascending in place with a recursive partition-exchange sort.
///
/// The pivot starts at the midpoint of the range (rounding toward the start)
/// and follows its value whenever it is swapped, so after a partition every
/// element left of the pivot is `<=` it and every element right of it `>=`.
/// Not stable; worst case is quadratic.
pub fn partition_exchange_sort(elements: &mut [i64]) {
    if elements.len() > 1 {
        sort_range(elements, 0, elements.len() - 1);
    }
}

fn sort_range(elements: &mut [i64], mut start: usize, mut end: usize) {
    while start < end {
        let pivot = partition(elements, start, end);
        // Only the shorter side recurses, so stack depth stays O(log n).
        if pivot - start < end - pivot {
            sort_range(elements, start, pivot);
            start = pivot + 1;
        } else {
            sort_range(elements, pivot + 1, end);
            end = pivot;
        }
    }
}

/// Partitions the closed range `[start, end]` and returns the final pivot index.
fn partition(elements: &mut [i64], start: usize, end: usize) -> usize {
    let (mut left, mut right) = (start, end);
    let mut pivot = start + (end - start) / 2;

    while left < right {
        while left < pivot && elements[left] <= elements[pivot] {
            left += 1;
        }
        while right > pivot && elements[pivot] <= elements[right] {
            right -= 1;
        }
        if left < right {
            elements.swap(left, right);
            if left == pivot {
                pivot = right;
            } else if right == pivot {
                pivot = left;
            }
        }
    }

    pivot
}

/// Sorts the integers held in a text payload and reports how long the sort
/// itself took.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortTask {
    source_name: String,
    result_name: String,
    input_payload: Vec<u8>,
    // Never trusted from the wire; the payload is parsed again on execution.
    #[serde(skip)]
    elements: Option<Vec<i64>>,
}

impl SortTask {
    pub fn new(
        source_name: impl Into<String>,
        result_name: impl Into<String>,
        input_payload: impl Into<Vec<u8>>,
    ) -> Result<Self, ComputeError> {
        let mut task = Self {
            source_name: source_name.into(),
            result_name: result_name.into(),
            input_payload: input_payload.into(),
            elements: None,
        };
        task.elements = Some(task.parse()?);
        Ok(task)
    }

    /// Reads the whole payload from `reader`, e.g. an open file.
    pub fn from_reader<R: Read>(
        source_name: impl Into<String>,
        result_name: impl Into<String>,
        mut reader: R,
    ) -> Result<Self, ComputeError> {
        let source_name = source_name.into();
        let mut input_payload = Vec::new();
        reader.read_to_end(&mut input_payload).map_err(|e| {
            ComputeError::argument(INPUT_PAYLOAD, format!("cannot read {source_name}: {e}"))
        })?;
        Self::new(source_name, result_name, input_payload)
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn result_name(&self) -> &str {
        &self.result_name
    }

    pub fn input_payload(&self) -> &[u8] {
        &self.input_payload
    }

    /// Parsed elements, present on tasks built locally.
    pub fn elements(&self) -> Option<&[i64]> {
        self.elements.as_deref()
    }

    /// Wraps the task so executing it reports only the sort duration.
    pub fn timed(self) -> TimedSort {
        TimedSort(self)
    }

    fn sort_timed(&mut self) -> Result<(Vec<i64>, Duration), ComputeError> {
        let mut elements = match self.elements.take() {
            Some(elements) => elements,
            None => self.parse()?,
        };

        let started = Instant::now();
        partition_exchange_sort(&mut elements);
        let elapsed = started.elapsed();
        debug!(
            source = %self.source_name,
            count = elements.len(),
            ?elapsed,
            "sorted payload"
        );
        Ok((elements, elapsed))
    }

    fn parse(&self) -> Result<Vec<i64>, ComputeError> {
        parse_elements(&self.input_payload).map_err(|e| {
            ComputeError::argument(INPUT_PAYLOAD, format!("{}: {e}", self.source_name))
        })
    }
}

impl Task for SortTask {
    type Output = SortedPayload;

    fn execute(mut self) -> Result<SortedPayload, ComputeError> {
        let (elements, elapsed) = self.sort_timed()?;

        Ok(SortedPayload {
            source_name: self.source_name,
            result_name: self.result_name,
            payload: encode_elements(&elements),
            elapsed,
        })
    }
}

impl From<SortTask> for TaskEnvelope {
    fn from(task: SortTask) -> Self {
        TaskEnvelope::Sort(task)
    }
}

impl RemoteTask for SortTask {
    fn from_output(output: TaskOutput) -> Option<SortedPayload> {
        match output {
            TaskOutput::Sorted(sorted) => Some(sorted),
            _ => None,
        }
    }
}

/// A sort whose result is only its duration. The sorted elements are
/// dropped without being encoded.
#[derive(Debug, Clone)]
pub struct TimedSort(SortTask);

impl TimedSort {
    pub fn task(&self) -> &SortTask {
        &self.0
    }
}

impl Task for TimedSort {
    type Output = Duration;

    fn execute(self) -> Result<Duration, ComputeError> {
        let mut task = self.0;
        task.sort_timed().map(|(_, elapsed)| elapsed)
    }
}

/// Result of one sort execution, timing included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortedPayload {
    source_name: String,
    result_name: String,
    payload: Vec<u8>,
    elapsed: Duration,
}

impl SortedPayload {
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn result_name(&self) -> &str {
        &self.result_name
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Time spent in the sort, excluding parsing and encoding.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}
