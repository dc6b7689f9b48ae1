//! End-to-end tests: a real server on an ephemeral port, driven over TCP
//! through the client-side protocol driver.

use std::net::SocketAddr;
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use offload_server::client::{Client, TaskOutcome};
use offload_server::config::Config;
use offload_server::errors::JobError;
use offload_server::jobs::{FnExecutor, JobExecutor};
use offload_server::models::ServiceStatus;
use offload_server::server::Server;

fn test_config(memory_budget: u64) -> Config {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.worker.worker_count = 2;
    config.resources.memory_budget = memory_budget;
    config.resources.max_task_size = memory_budget.max(1024);
    config
}

async fn spawn_server(config: &Config, executor: Arc<dyn JobExecutor>) -> SocketAddr {
    let server = Server::bind(config, executor).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    addr
}

fn echo_executor() -> Arc<dyn JobExecutor> {
    Arc::new(FnExecutor::new(|task: &[u8]| Ok(task.to_vec())))
}

async fn logged_in_client(addr: SocketAddr, username: &str) -> Client {
    let mut client = Client::connect(addr).await.unwrap();
    assert!(client.register(username, "pw").await.unwrap());
    assert!(client.login(username, "pw").await.unwrap());
    client
}

async fn wait_for_status<F>(client: &mut Client, predicate: F) -> ServiceStatus
where
    F: Fn(&ServiceStatus) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let status = client
                .query_status()
                .await
                .unwrap()
                .expect("session should be valid");
            if predicate(&status) {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("status condition not reached in time")
}

#[tokio::test]
async fn register_and_login_scenario() {
    let addr = spawn_server(&test_config(1024), echo_executor()).await;

    let mut first = Client::connect(addr).await.unwrap();
    assert!(first.register("alice", "p1").await.unwrap());

    let mut second = Client::connect(addr).await.unwrap();
    assert!(!second.register("alice", "p2").await.unwrap());
    assert!(!second.login("alice", "wrong").await.unwrap());
    assert!(second.login("alice", "p1").await.unwrap());
}

#[tokio::test]
async fn execute_task_round_trips_bytes() {
    let addr = spawn_server(&test_config(1024), echo_executor()).await;
    let mut client = logged_in_client(addr, "bob").await;

    let outcome = client.execute_task(b"hello offload").await.unwrap();
    assert_eq!(
        outcome,
        TaskOutcome::Completed(b"hello offload".as_slice().into())
    );

    // The budget is whole again once the task completed.
    let status = client.query_status().await.unwrap().unwrap();
    assert_eq!(status.available_memory, 1024);
    assert_eq!(status.pending_tasks, 0);
}

#[tokio::test]
async fn unauthenticated_requests_are_rejected() {
    let addr = spawn_server(&test_config(1024), echo_executor()).await;
    let mut client = Client::connect(addr).await.unwrap();

    assert_eq!(
        client.execute_task(b"no session").await.unwrap(),
        TaskOutcome::Denied
    );
    assert!(client.query_status().await.unwrap().is_none());
    assert!(!client.logout().await.unwrap());

    // Registration alone does not authenticate; only LOGIN does.
    assert!(client.register("carla", "pw").await.unwrap());
    assert_eq!(
        client.execute_task(b"still no session").await.unwrap(),
        TaskOutcome::Denied
    );
}

#[tokio::test]
async fn admission_follows_the_memory_budget() {
    // Jobs hold until the test feeds the gate, keeping the first task
    // in flight while the second one is submitted.
    let (gate_tx, gate_rx) = mpsc::channel::<()>();
    let gate = Mutex::new(gate_rx);
    let executor: Arc<dyn JobExecutor> = Arc::new(FnExecutor::new(move |task: &[u8]| {
        gate.lock().unwrap().recv().ok();
        Ok(task.to_vec())
    }));
    let addr = spawn_server(&test_config(1024), executor).await;

    let mut runner = logged_in_client(addr, "carol").await;
    let mut observer = logged_in_client(addr, "dave").await;

    let first = tokio::spawn(async move { runner.execute_task(&[1u8; 600]).await.unwrap() });

    // Once the 600-byte task is admitted, 424 bytes remain.
    let status = wait_for_status(&mut observer, |s| s.pending_tasks == 1).await;
    assert_eq!(status.available_memory, 424);

    // 500 > 424: refused while the first task is still running.
    assert_eq!(
        observer.execute_task(&[2u8; 500]).await.unwrap(),
        TaskOutcome::Rejected
    );

    gate_tx.send(()).unwrap();
    assert_eq!(
        first.await.unwrap(),
        TaskOutcome::Completed(vec![1u8; 600].into())
    );

    // Completion returned the reservation in full.
    wait_for_status(&mut observer, |s| {
        s.available_memory == 1024 && s.pending_tasks == 0
    })
    .await;

    gate_tx.send(()).unwrap();
    let retry = observer.execute_task(&[2u8; 500]).await.unwrap();
    assert_eq!(retry, TaskOutcome::Completed(vec![2u8; 500].into()));
}

#[tokio::test]
async fn concurrent_registers_admit_exactly_one() {
    let addr = spawn_server(&test_config(1024), echo_executor()).await;

    let (first, second) = tokio::join!(
        async {
            let mut client = Client::connect(addr).await.unwrap();
            client.register("erin", "pw").await.unwrap()
        },
        async {
            let mut client = Client::connect(addr).await.unwrap();
            client.register("erin", "pw").await.unwrap()
        },
    );

    assert!(first ^ second, "exactly one register may succeed");
}

#[tokio::test]
async fn failed_job_returns_empty_result_and_reconciles() {
    let executor: Arc<dyn JobExecutor> =
        Arc::new(FnExecutor::new(|_: &[u8]| Err(JobError::new(7, "boom"))));
    let addr = spawn_server(&test_config(1024), executor).await;
    let mut client = logged_in_client(addr, "frank").await;

    // The task is admitted and runs; the failure surfaces as an empty result.
    let outcome = client.execute_task(b"doomed").await.unwrap();
    assert_eq!(outcome, TaskOutcome::Completed(b"".as_slice().into()));

    // No leaked accounting on failure.
    let status = client.query_status().await.unwrap().unwrap();
    assert_eq!(status.available_memory, 1024);
    assert_eq!(status.pending_tasks, 0);
}

#[tokio::test]
async fn panicking_job_is_contained() {
    let executor: Arc<dyn JobExecutor> = Arc::new(FnExecutor::new(|task: &[u8]| {
        if task.first() == Some(&0xEE) {
            panic!("job blew up");
        }
        Ok(task.to_vec())
    }));
    let addr = spawn_server(&test_config(1024), executor).await;
    let mut client = logged_in_client(addr, "gina").await;

    // The panic is swallowed at the worker; the client sees an empty result.
    let outcome = client.execute_task(&[0xEE]).await.unwrap();
    assert_eq!(outcome, TaskOutcome::Completed(b"".as_slice().into()));

    // Connection, workers and ledger all survived it.
    let outcome = client.execute_task(b"next").await.unwrap();
    assert_eq!(outcome, TaskOutcome::Completed(b"next".as_slice().into()));
    let status = client.query_status().await.unwrap().unwrap();
    assert_eq!(status.available_memory, 1024);
    assert_eq!(status.pending_tasks, 0);
}

#[tokio::test]
async fn logout_closes_the_connection_and_clears_the_session() {
    let addr = spawn_server(&test_config(1024), echo_executor()).await;
    let mut client = logged_in_client(addr, "harry").await;

    assert!(client.logout().await.unwrap());

    // The server closed the connection; further requests fail at transport.
    assert!(client.execute_task(b"late").await.is_err());

    // The session is gone server-side, a fresh connection can log in again.
    let mut again = Client::connect(addr).await.unwrap();
    assert!(again.login("harry", "pw").await.unwrap());
    let status = again.query_status().await.unwrap().unwrap();
    assert_eq!(status.pending_tasks, 0);
}

#[tokio::test]
async fn oversized_task_length_drops_the_connection() {
    let mut config = test_config(100);
    config.resources.max_task_size = 100;
    let addr = spawn_server(&config, echo_executor()).await;
    let mut client = logged_in_client(addr, "iris").await;

    // The announced length exceeds the configured maximum; the stream cannot
    // be resynchronized, so the server drops the connection.
    assert!(client.execute_task(&[0u8; 200]).await.is_err());
}

#[tokio::test]
async fn query_status_reports_the_configured_budget() {
    let addr = spawn_server(&test_config(2048), echo_executor()).await;
    let mut client = logged_in_client(addr, "jules").await;

    let status = client.query_status().await.unwrap().unwrap();
    assert_eq!(status.available_memory, 2048);
    assert_eq!(status.pending_tasks, 0);
}
