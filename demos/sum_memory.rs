//! Interruptible sum over the in-memory transport.
//!
//! Runs the server and a blocking client in one process. Press Ctrl+C during
//! a call: the coarse call ignores it and still prints the sum, the fine call
//! stops at its next checkpoint.
//!
//! ```text
//! RUST_LOG=debug cargo run --example sum_memory
//! ```
//!
//! `INCREMENTER_WORK_MS`, `INCREMENTER_CHECK_INTERVAL_MS` and
//! `INCREMENTER_REQUEST_TIMEOUT_MS` override the defaults.

use std::time::Duration;

use anyhow::Context;
use incrementer_rpc::{
    //
    create_transport,
    BlockingIncrementerClient,
    IncrementerServer,
    RpcConfig,
    RpcError,
};

const SERVER_ID: &str = "incrementer";

fn main() -> anyhow::Result<()> {
    // ---
    env_logger::init();

    let server_config = RpcConfig::from_env(SERVER_ID)?;
    let client_config = RpcConfig::from_env("demo-client")?;

    let client = BlockingIncrementerClient::new(SERVER_ID, &client_config)
        .context("failed to start client")?;

    let server = client
        .block_on(async {
            let transport = create_transport(&server_config).await?;
            let server = IncrementerServer::with_transport(transport, &server_config)?;
            server.spawn().await?;
            Ok::<_, RpcError>(server)
        })
        .context("failed to start server")?;

    println!("coarse: Ctrl+C is noted but the call runs to the end");
    report(client.sum_detailed(100_000, 200_000, false));

    if let Err(RpcError::Interrupted) = client.sleep_unless_interrupted(Duration::from_millis(500)) {
        println!("pause interrupted");
    }

    println!("fine: Ctrl+C cancels at the next checkpoint");
    report(client.sum_detailed(100_000, 200_000, true));

    client.block_on(server.shutdown());
    Ok(())
}

fn report(outcome: incrementer_rpc::Result<incrementer_rpc::SumOutcome>) {
    match outcome {
        Ok(o) if o.cancel_requested => println!("  = {} (cancellation came too late)", o.result),
        Ok(o) => println!("  = {}", o.result),
        Err(RpcError::Cancelled) => println!("  cancelled"),
        Err(err) => println!("  failed: {err}"),
    }
}
