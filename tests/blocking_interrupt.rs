// tests/blocking_interrupt.rs

use std::time::Duration;

use incrementer_rpc::{
    // ---
    BlockingIncrementerClient,
    IncrementerServer,
    MemoryHub,
    RpcConfig,
    RpcError,
    TransportBuilder,
};

/// Set in the child process re-executed by the Ctrl+C test.
const CHILD_ENV: &str = "INCREMENTER_SIGINT_CHILD";

fn setup(client_id: &str, server_id: &str, work: Duration) -> (BlockingIncrementerClient, IncrementerServer) {
    // ---
    let hub = MemoryHub::new();
    let config = RpcConfig::memory(client_id).with_work_duration(work);

    let builder = TransportBuilder::new()
        .node_id(client_id)
        .client_mode()
        .hub(hub.clone());
    let client = BlockingIncrementerClient::with_builder(builder, server_id, &config)
        .expect("failed to start client");

    let server = client
        .block_on(async {
            let transport = TransportBuilder::new()
                .node_id(server_id)
                .server_mode()
                .hub(hub)
                .build()
                .await?;
            let server = IncrementerServer::with_transport(transport, &config)?;
            server.spawn().await?;
            Ok::<_, RpcError>(server)
        })
        .expect("failed to start server");

    (client, server)
}

#[test]
fn ctrl_c_scope_covers_only_the_call() {
    // ---
    let (client, _server) = setup("scope-client", "scope", Duration::from_millis(300));

    std::thread::scope(|s| {
        let call = s.spawn(|| client.sum(1, 2, false));

        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(BlockingIncrementerClient::calls_in_progress(), 1);

        assert_eq!(call.join().expect("call thread panicked").unwrap(), 3);
    });

    assert_eq!(BlockingIncrementerClient::calls_in_progress(), 0);
}

#[cfg(unix)]
#[test]
fn ctrl_c_outside_call_stops_process() {
    // ---
    if std::env::var_os(CHILD_ENV).is_some() {
        let (client, _server) = setup("sigint-client", "sigint", Duration::from_millis(20));
        assert_eq!(client.sum(1, 2, false).unwrap(), 3);

        let pid = std::process::id().to_string();
        let sent = std::process::Command::new("kill")
            .args(["-INT", &pid])
            .status()
            .expect("failed to run kill");
        assert!(sent.success());

        std::thread::sleep(Duration::from_secs(5));
        // Still alive: Ctrl+C was swallowed.
        std::process::exit(0);
    }

    let exe = std::env::current_exe().expect("no test executable");
    let status = std::process::Command::new(exe)
        .args(["ctrl_c_outside_call_stops_process", "--exact", "--test-threads=1"])
        .env(CHILD_ENV, "1")
        .status()
        .expect("failed to run child test process");

    assert_eq!(status.code(), Some(130), "child ended with {status:?}");
}
