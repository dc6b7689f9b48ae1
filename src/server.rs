//! TCP listener and per-connection protocol handling.
//!
//! One handler task per accepted connection; each handler runs a strictly
//! sequential read-dispatch-write loop, so at most one request is in flight
//! per connection. Shared state (directory, ledger) is only touched through
//! its own lock-internal operations, and job execution goes through the
//! shared worker pool.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

use crate::config::Config;
use crate::errors::{AppError, AppResult, JobError};
use crate::jobs::JobExecutor;
use crate::ledger::ResourceLedger;
use crate::protocol::{self, Request};
use crate::session::{ConnectionHandle, SessionDirectory};
use crate::worker::WorkerPool;

pub struct Server {
    listener: TcpListener,
    shared: Arc<Shared>,
}

/// State shared by every connection handler.
struct Shared {
    directory: SessionDirectory,
    ledger: ResourceLedger,
    pool: WorkerPool,
    executor: Arc<dyn JobExecutor>,
    max_task_size: u64,
    conn_counter: AtomicU64,
}

impl Server {
    /// Binds the listening socket and builds the shared state. Failing to
    /// bind is the only startup error that is fatal to the process.
    pub async fn bind(config: &Config, executor: Arc<dyn JobExecutor>) -> AppResult<Self> {
        let address = format!("{}:{}", config.server.host, config.server.port);
        let listener = TcpListener::bind(&address).await?;

        let shared = Arc::new(Shared {
            directory: SessionDirectory::new(),
            ledger: ResourceLedger::new(config.resources.memory_budget),
            pool: WorkerPool::new(config.worker.worker_count),
            executor,
            max_task_size: config.resources.max_task_size,
            conn_counter: AtomicU64::new(0),
        });

        Ok(Self { listener, shared })
    }

    pub fn local_addr(&self) -> AppResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections forever, one handler task per connection. A failed
    /// accept is logged and the listener keeps going; a failed handler only
    /// ever takes down its own connection.
    pub async fn run(self) -> AppResult<()> {
        tracing::info!(address = %self.listener.local_addr()?, "central server started");

        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::error!(error = %e, "failed to accept connection");
                    continue;
                }
            };
            let conn_id = self.shared.conn_counter.fetch_add(1, Ordering::Relaxed) + 1;
            let shared = Arc::clone(&self.shared);

            tokio::spawn(async move {
                tracing::debug!(conn_id, peer = %peer_addr, "client connected");
                let handler = ConnectionHandler::new(shared, stream, conn_id, peer_addr);
                match handler.run().await {
                    Ok(()) => tracing::debug!(conn_id, "client disconnected"),
                    Err(e) => tracing::warn!(conn_id, error = %e, "connection terminated"),
                }
            });
        }
    }
}

/// Per-connection protocol state machine.
///
/// `session_username` is whichever username this connection installed in the
/// directory (REGISTER or LOGIN) and drives teardown; `authenticated` is the
/// sole authorization token and is only set by a successful LOGIN.
struct ConnectionHandler {
    shared: Arc<Shared>,
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
    conn_id: u64,
    peer_addr: SocketAddr,
    session_username: Option<String>,
    authenticated: bool,
    task_seq: u64,
}

impl ConnectionHandler {
    fn new(shared: Arc<Shared>, stream: TcpStream, conn_id: u64, peer_addr: SocketAddr) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            shared,
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
            conn_id,
            peer_addr,
            session_username: None,
            authenticated: false,
            task_seq: 0,
        }
    }

    async fn run(mut self) -> AppResult<()> {
        let result = self.dispatch_loop().await;

        // Directory cleanup runs on every exit path, error or not.
        if let Some(username) = self.session_username.take() {
            self.shared.directory.disconnect(&username, self.conn_id);
        }
        result
    }

    async fn dispatch_loop(&mut self) -> AppResult<()> {
        loop {
            let token = match protocol::read_token(&mut self.reader).await {
                Ok(token) => token,
                Err(e) if is_disconnect(&e) => return Ok(()),
                Err(e) => return Err(e.into()),
            };

            let Some(request) = Request::parse(&token) else {
                // Framing is lost after an unknown tag; drop the connection.
                tracing::warn!(conn_id = self.conn_id, tag = %token, "unknown request tag");
                return Err(AppError::Protocol(format!("unknown request tag: {token}")));
            };

            match request {
                Request::Register => self.handle_register().await?,
                Request::Login => self.handle_login().await?,
                Request::ExecuteTask => self.handle_execute_task().await?,
                Request::QueryStatus => self.handle_query_status().await?,
                Request::Logout => {
                    if self.handle_logout().await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn handle_register(&mut self) -> AppResult<()> {
        let username = protocol::read_token(&mut self.reader).await?;
        let password = protocol::read_token(&mut self.reader).await?;

        let handle = ConnectionHandle {
            conn_id: self.conn_id,
            peer_addr: self.peer_addr,
        };
        let accepted =
            !self.authenticated && self.shared.directory.register(&username, &password, handle);

        if accepted {
            // A second register under a different name would otherwise leave
            // the first directory entry behind.
            if let Some(previous) = self.session_username.replace(username.clone()) {
                if previous != username {
                    self.shared.directory.disconnect(&previous, self.conn_id);
                }
            }
            tracing::info!(conn_id = self.conn_id, user = %username, "user registered");
            protocol::write_token(&mut self.writer, protocol::REGISTER_SUCCESS).await?;
        } else {
            tracing::debug!(conn_id = self.conn_id, user = %username, "registration rejected");
            protocol::write_token(&mut self.writer, protocol::REGISTER_FAILURE).await?;
        }
        self.writer.flush().await?;
        Ok(())
    }

    async fn handle_login(&mut self) -> AppResult<()> {
        let username = protocol::read_token(&mut self.reader).await?;
        let password = protocol::read_token(&mut self.reader).await?;

        let handle = ConnectionHandle {
            conn_id: self.conn_id,
            peer_addr: self.peer_addr,
        };
        let accepted =
            !self.authenticated && self.shared.directory.login(&username, &password, handle);

        if accepted {
            // A register-then-login under a different name would otherwise
            // leave the registered entry behind.
            if let Some(previous) = self.session_username.replace(username.clone()) {
                if previous != username {
                    self.shared.directory.disconnect(&previous, self.conn_id);
                }
            }
            self.authenticated = true;
            tracing::info!(conn_id = self.conn_id, user = %username, "user logged in");
            protocol::write_token(&mut self.writer, protocol::LOGIN_SUCCESS).await?;
        } else {
            tracing::debug!(conn_id = self.conn_id, user = %username, "login rejected");
            protocol::write_token(&mut self.writer, protocol::LOGIN_FAILURE).await?;
        }
        self.writer.flush().await?;
        Ok(())
    }

    /// Writes the VALID/INVALID marker that precedes every steady-state
    /// response, so the client can tell "not logged in" apart from a
    /// capacity rejection.
    async fn validate_session(&mut self) -> AppResult<bool> {
        let valid = self.authenticated;
        let marker = if valid {
            protocol::VALID
        } else {
            protocol::INVALID
        };
        protocol::write_token(&mut self.writer, marker).await?;
        self.writer.flush().await?;

        if !valid {
            tracing::debug!(conn_id = self.conn_id, "request rejected: not authenticated");
        }
        Ok(valid)
    }

    async fn handle_execute_task(&mut self) -> AppResult<()> {
        if !self.validate_session().await? {
            return Ok(());
        }

        let max_task_size = usize::try_from(self.shared.max_task_size).unwrap_or(usize::MAX);
        let task = protocol::read_payload(&mut self.reader, max_task_size).await?;

        self.task_seq += 1;
        let task_seq = self.task_seq;
        let needed = task.len() as u64;

        if !self.shared.ledger.try_admit(needed) {
            tracing::debug!(
                conn_id = self.conn_id,
                task_seq,
                size = needed,
                "task rejected: insufficient memory"
            );
            protocol::write_flag(&mut self.writer, false).await?;
            self.writer.flush().await?;
            return Ok(());
        }

        tracing::debug!(conn_id = self.conn_id, task_seq, size = needed, "task admitted");

        // From here on the reservation must be returned on every path,
        // job success or failure alike.
        let flag_result = async {
            protocol::write_flag(&mut self.writer, true).await?;
            self.writer.flush().await
        }
        .await;
        if let Err(e) = flag_result {
            self.shared.ledger.release(needed);
            return Err(e.into());
        }

        let job_result = self.run_job(task).await;
        self.shared.ledger.release(needed);

        match job_result {
            Ok(result) => {
                tracing::debug!(
                    conn_id = self.conn_id,
                    task_seq,
                    result_len = result.len(),
                    "task completed"
                );
                protocol::write_payload(&mut self.writer, &result).await?;
            }
            Err(e) => {
                // Local to this task: logged here, empty result to the client.
                tracing::error!(conn_id = self.conn_id, task_seq, error = %e, "task failed");
                protocol::write_payload(&mut self.writer, &[]).await?;
            }
        }
        self.writer.flush().await?;
        Ok(())
    }

    /// Submits the job to the shared pool and blocks this connection until it
    /// reports a result through its oneshot.
    async fn run_job(&self, task: Bytes) -> Result<Vec<u8>, JobError> {
        let (result_tx, result_rx) = oneshot::channel();
        let executor = Arc::clone(&self.shared.executor);

        self.shared.pool.submit(Box::new(move || {
            let _ = result_tx.send(executor.execute(&task));
        }));

        match result_rx.await {
            Ok(result) => result,
            // Sender dropped without reporting: the job panicked.
            Err(_) => Err(JobError::new(-1, "job aborted before reporting a result")),
        }
    }

    async fn handle_query_status(&mut self) -> AppResult<()> {
        if !self.validate_session().await? {
            return Ok(());
        }
        let status = self.shared.ledger.snapshot();
        protocol::write_status(&mut self.writer, &status).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Returns true when the connection should close (successful logout).
    async fn handle_logout(&mut self) -> AppResult<bool> {
        if !self.validate_session().await? {
            return Ok(false);
        }

        if let Some(username) = self.session_username.take() {
            self.shared.directory.logout(&username);
            tracing::info!(conn_id = self.conn_id, user = %username, "user logged out");
        }
        self.authenticated = false;
        self.writer.shutdown().await?;
        Ok(true)
    }
}

// A closed or reset peer is a normal end of session, not a server error.
fn is_disconnect(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
    )
}
