//! Tokio runtime sizing for server processes.

use std::{env, thread};

use tracing::debug;

/// Overrides the number of worker threads a server runtime starts with.
pub const SERVER_THREADS_ENV: &str = "TASKWIRE_SERVER_THREADS";

/// Worker threads for a server runtime: [`SERVER_THREADS_ENV`] when it holds
/// a positive integer, otherwise the available parallelism.
pub fn server_worker_threads() -> usize {
    let configured = env::var(SERVER_THREADS_ENV).ok();
    resolve_threads(configured.as_deref(), available_threads())
}

/// Multi-threaded runtime sized by [`server_worker_threads`]. Blocking task
/// execution goes to Tokio's separate blocking pool, so this only bounds the
/// I/O and dispatch workers.
pub fn server_runtime() -> std::io::Result<tokio::runtime::Runtime> {
    let workers = server_worker_threads();
    debug!(workers, "building server runtime");
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(workers)
        .thread_name("taskwire-worker")
        .enable_all()
        .build()
}

fn available_threads() -> usize {
    thread::available_parallelism().map_or(1, |n| n.get())
}

fn resolve_threads(configured: Option<&str>, fallback: usize) -> usize {
    configured
        .and_then(|raw| raw.trim().parse::<usize>().ok())
        .filter(|&n| n > 0)
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_override_wins() {
        assert_eq!(resolve_threads(Some("8"), 2), 8);
        assert_eq!(resolve_threads(Some(" 3\n"), 2), 3);
    }

    #[test]
    fn unusable_override_falls_back() {
        for raw in ["0", "-1", "many", ""] {
            assert_eq!(resolve_threads(Some(raw), 2), 2, "{raw:?}");
        }
        assert_eq!(resolve_threads(None, 5), 5);
    }

    #[test]
    fn runtime_runs_compute_tasks() {
        let runtime = server_runtime().unwrap();
        let sum = runtime
            .block_on(crate::task::execute_blocking(crate::AddTask::new(2, 40)))
            .unwrap();
        assert_eq!(sum, 42);
    }
}
