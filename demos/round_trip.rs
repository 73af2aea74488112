//! Starts a compute server in-process and drives every service method.
//!
//! ```text
//! cargo run --example round_trip [numbers.txt]
//! ```
//!
//! Without a file argument a random payload is generated. The runtime's
//! worker count follows `TASKWIRE_SERVER_THREADS`.

use std::fs::File;

use rand::Rng;
use taskwire::runtime;
use taskwire::task::sort::encode_elements;
use taskwire::{AddTask, ComputeClient, ComputeEngine, ComputeServer, Identity, RpcConfig, SortTask};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let rt = runtime::server_runtime()?;
    info!(workers = runtime::server_worker_threads(), "runtime ready");
    rt.block_on(round_trip())
}

async fn round_trip() -> Result<(), Box<dyn std::error::Error>> {
    let identity = Identity::self_signed(["localhost"])?;

    let server_config = RpcConfig::new("127.0.0.1:0").with_identity(identity.clone());
    let mut server = ComputeServer::new(ComputeEngine::new(), server_config)
        .into_rpc_server()
        .await;
    let endpoint = server.bind()?;
    let addr = endpoint.local_addr()?;
    tokio::spawn(async move {
        if let Err(e) = server.start(endpoint).await {
            tracing::error!("server stopped: {e}");
        }
    });

    let client_config = RpcConfig::new("127.0.0.1:0")
        .with_trusted_certificate(identity.certificate_der().to_vec());
    let client = ComputeClient::connect(addr, client_config).await?;

    client.ping().await?;
    info!("ping ok");

    let echoed = client.echo(Some("hello")).await?;
    info!(%echoed, "echo");

    let sum = client.execute_task(AddTask::new(19, 23)).await?;
    info!(sum, "add task");

    let task = match std::env::args().nth(1) {
        Some(path) => SortTask::from_reader(path.clone(), format!("{path}.sorted"), File::open(&path)?)?,
        None => {
            let mut rng = rand::thread_rng();
            let values: Vec<i64> = (0..50_000).map(|_| rng.gen_range(0..1_000_000)).collect();
            SortTask::new("random.txt", "sorted.txt", encode_elements(&values))?
        }
    };

    let elapsed = client.time_sort_execution(task.clone()).await?;
    info!(?elapsed, "timed sort");

    let sorted = client.execute_task(task).await?;
    info!(
        source = sorted.source_name(),
        result = sorted.result_name(),
        bytes = sorted.payload().len(),
        elapsed = ?sorted.elapsed(),
        "sort task"
    );

    client.close().await;
    Ok(())
}
