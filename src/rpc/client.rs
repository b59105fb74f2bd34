//! JSON-RPC client for a single stdio server
//!
//! One background read task per connection owns the inbound half of the
//! stream. It is the only code path that completes pending requests and the
//! only dispatcher of notifications. Writers share the outbound half behind
//! a mutex so frames are never interleaved.

use crate::capability::RemoteCapabilityDescriptor;
use crate::config::{ServerConfig, ServerKind};
use crate::process::{ProcessExit, ProcessHandle};
use crate::rpc::notifications::{NotificationStore, StoredNotification};
use crate::rpc::pending::PendingTable;
use crate::transport::{ContentLengthCodec, ErrorObject, Message, Notification, Request, Response};
use crate::types::{Result, RpcError, ServerStatus};
use crate::{lsp, mcp};
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
type FrameWriter = FramedWrite<BoxedWriter, ContentLengthCodec>;

/// Callback for a push notification; receives the `params` value.
pub type NotificationHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Observable snapshot of a connection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionState {
    pub status: ServerStatus,
    /// Why the connection last entered `Error`.
    pub error: Option<String>,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
}

/// Which requests the current status lets through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Normal,
    Handshake,
    Shutdown,
}

impl Gate {
    fn admits(self, status: ServerStatus) -> bool {
        match status {
            ServerStatus::Running => true,
            ServerStatus::Starting => self == Gate::Handshake,
            ServerStatus::Stopping => self == Gate::Shutdown,
            ServerStatus::Stopped | ServerStatus::Error => false,
        }
    }
}

/// State reachable from the read task.
struct Shared {
    name: String,
    kind: ServerKind,
    state: watch::Sender<ConnectionState>,
    pending: Mutex<PendingTable>,
    writer: Mutex<Option<FrameWriter>>,
    handlers: RwLock<HashMap<String, Vec<NotificationHandler>>>,
    /// method -> params field holding the key
    tracked: RwLock<HashMap<String, String>>,
    notifications: NotificationStore,
    capabilities: RwLock<Option<Value>>,
    server_info: RwLock<Option<Value>>,
    tool_cache: std::sync::Mutex<Option<Vec<RemoteCapabilityDescriptor>>>,
    opened_documents: std::sync::Mutex<HashSet<PathBuf>>,
    /// Held from the open check until `didOpen` is written.
    opening_documents: Mutex<()>,
    /// Stops the current read loop.
    cancel: std::sync::Mutex<CancellationToken>,
}

impl Shared {
    fn status(&self) -> ServerStatus {
        self.state.borrow().status
    }

    fn set_status(&self, status: ServerStatus) {
        self.state.send_modify(|state| state.status = status);
    }

    /// Move to `Error` unless the connection is already winding down.
    fn mark_failed(&self, reason: &str) -> bool {
        let mut changed = false;
        self.state.send_if_modified(|state| {
            if state.status.is_winding_down() || state.status == ServerStatus::Error {
                return false;
            }
            state.status = ServerStatus::Error;
            state.error = Some(reason.to_string());
            changed = true;
            true
        });
        changed
    }

    async fn send(&self, message: Message) -> Result<()> {
        let mut writer = self.writer.lock().await;
        let Some(writer) = writer.as_mut() else {
            return Err(RpcError::Transport(format!(
                "no open stream to server '{}'",
                self.name
            )));
        };
        writer.send(message).await.map_err(|e| match e {
            RpcError::Io(io) => {
                RpcError::Transport(format!("write to server '{}' failed: {}", self.name, io))
            }
            other => other,
        })
    }

    async fn dispatch(self: &Arc<Self>, message: Message) {
        match message {
            Message::Response(response) => self.complete(response).await,
            Message::Notification(notification) => self.handle_notification(notification),
            Message::Request(request) => self.answer_server_request(request),
        }
    }

    async fn complete(&self, response: Response) {
        let Some(id) = response.id.as_u64() else {
            debug!("[{}] Dropping response with foreign id {}", self.name, response.id);
            return;
        };

        let result = response.outcome.map_err(|e| RpcError::Remote {
            code: e.code,
            message: e.message,
            data: e.data,
        });

        if !self.pending.lock().await.resolve(id, result) {
            debug!("[{}] Dropping response for unknown id {}", self.name, id);
        }
    }

    fn handle_notification(&self, notification: Notification) {
        let Notification { method, params } = notification;
        let params = params.unwrap_or(Value::Null);
        debug!("[{}] <-- {}", self.name, method);

        let key_field = read_lock(&self.tracked).get(&method).cloned();
        if let Some(field) = key_field {
            match params.get(&field).and_then(Value::as_str) {
                Some(key) => self.notifications.insert(&method, key, params.clone()),
                None => debug!("[{}] {} without '{}' key", self.name, method, field),
            }
        }

        match self.kind {
            ServerKind::Mcp => {
                if method == mcp::TOOLS_LIST_CHANGED {
                    debug!("[{}] Tool list changed; dropping cache", self.name);
                    lock(&self.tool_cache).take();
                } else if method == mcp::LOG_MESSAGE {
                    mcp::log_message(&self.name, &params);
                }
            }
            ServerKind::Lsp => {
                if method == lsp::LOG_MESSAGE || method == lsp::SHOW_MESSAGE {
                    lsp::log_message(&self.name, &params);
                }
            }
        }

        let handlers = read_lock(&self.handlers)
            .get(&method)
            .cloned()
            .unwrap_or_default();
        for handler in handlers {
            let call = AssertUnwindSafe(|| handler(params.clone()));
            if std::panic::catch_unwind(call).is_err() {
                warn!("[{}] Handler for {} panicked", self.name, method);
            }
        }
    }

    /// Server-to-client requests are answered from a separate task so a slow
    /// writer never stalls the read loop.
    fn answer_server_request(self: &Arc<Self>, request: Request) {
        debug!("[{}] <-- server request {} ({})", self.name, request.method, request.id);

        let outcome = if request.method == "ping" {
            Ok(json!({}))
        } else {
            Err(ErrorObject::method_not_found(&request.method))
        };

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = shared.send(Message::response(request.id, outcome)).await {
                warn!("[{}] Could not answer server request: {}", shared.name, e);
            }
        });
    }

    async fn fail_pending(&self, error: impl Fn(&str) -> RpcError) -> usize {
        self.pending.lock().await.fail_all(|entry| error(&entry.method))
    }
}

/// How long frames already written before a process exit are still read.
const EXIT_DRAIN: Duration = Duration::from_millis(100);

type ExitSignal = watch::Receiver<Option<ProcessExit>>;

async fn process_exit(exit: &mut Option<ExitSignal>) -> ProcessExit {
    let Some(rx) = exit.as_mut() else {
        return std::future::pending().await;
    };
    let exited = rx.wait_for(Option::is_some).await.ok().and_then(|exit| *exit);
    exited.unwrap_or(ProcessExit { code: None })
}

/// Runs until the stream fails, the process exits or `cancel` fires.
///
/// A child that dies can leave its stdout open through an inherited
/// descriptor, so the exit signal is watched alongside the frames.
async fn read_loop(
    shared: Arc<Shared>,
    reader: BoxedReader,
    mut exit: Option<ExitSignal>,
    cancel: CancellationToken,
) {
    let mut frames = FramedRead::new(reader, ContentLengthCodec::new());
    let mut exited: Option<String> = None;
    let mut drain_until: Option<Instant> = None;

    let failure = loop {
        tokio::select! {
            _ = cancel.cancelled() => break None,
            code = process_exit(&mut exit), if exited.is_none() => {
                debug!("[{}] Process {}", shared.name, code);
                exited = Some(format!("process exited ({})", code));
                drain_until = Some(Instant::now() + EXIT_DRAIN);
            }
            _ = tokio::time::sleep_until(drain_until.unwrap_or_else(Instant::now)), if drain_until.is_some() => {
                break exited.clone();
            }
            frame = frames.next() => match frame {
                Some(Ok(message)) => shared.dispatch(message).await,
                Some(Err(RpcError::Protocol(reason))) => break Some(format!("protocol error: {}", reason)),
                Some(Err(e)) => break Some(format!("read failed: {}", e)),
                None => {
                    break Some(exited.clone().unwrap_or_else(|| "server closed its output".to_string()));
                }
            },
        }
    };

    match failure {
        Some(reason) => {
            if shared.mark_failed(&reason) {
                error!("Server '{}' connection lost: {}", shared.name, reason);
            } else {
                debug!("[{}] Stream ended while winding down: {}", shared.name, reason);
            }
            let failed = shared
                .fail_pending(|method| {
                    RpcError::Transport(format!("{} aborted: {}", method, reason))
                })
                .await;
            if failed > 0 {
                warn!("[{}] Failed {} pending request(s)", shared.name, failed);
            }
        }
        None => {
            let status = shared.status();
            let error = shared.state.borrow().error.clone();
            shared
                .fail_pending(|method| match (&status, &error) {
                    (ServerStatus::Error, Some(reason)) => {
                        RpcError::Transport(format!("{} aborted: {}", method, reason))
                    }
                    _ => RpcError::Cancelled(format!("{} cancelled by shutdown", method)),
                })
                .await;
        }
    }

    debug!("[{}] Read loop finished", shared.name);
}

/// Everything a running connection owns besides the shared state.
struct Session {
    cancel: CancellationToken,
    reader: JoinHandle<()>,
    process: Option<ProcessHandle>,
}

impl Session {
    async fn teardown(self, shared: &Shared, grace: Duration) {
        self.cancel.cancel();
        if let Err(e) = self.reader.await {
            warn!("[{}] Read loop ended abnormally: {}", shared.name, e);
        }

        // Closing stdin is the cooperative stop signal
        shared.writer.lock().await.take();

        if let Some(process) = self.process {
            match process.terminate(grace).await {
                Ok(exit) => debug!("[{}] Process {}", shared.name, exit),
                Err(e) => warn!("[{}] Failed to reap process: {}", shared.name, e),
            }
        }
    }
}

/// Client for one configured server.
///
/// Lifecycle: `Stopped -> Starting -> Running -> Stopping -> Stopped`, with
/// `Error` reachable from `Starting` and `Running`. `start` is allowed again
/// from `Error`.
pub struct RpcClient {
    config: ServerConfig,
    root: PathBuf,
    client_capabilities: Option<Value>,
    shared: Arc<Shared>,
    /// Held across the whole start/stop sequence.
    session: Mutex<Option<Session>>,
}

impl RpcClient {
    pub fn new(config: ServerConfig) -> Self {
        let root = config
            .cwd
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));

        let (state, _) = watch::channel(ConnectionState::default());
        let shared = Arc::new(Shared {
            name: config.name.clone(),
            kind: config.kind,
            state,
            pending: Mutex::new(PendingTable::new()),
            writer: Mutex::new(None),
            handlers: RwLock::new(HashMap::new()),
            tracked: RwLock::new(HashMap::new()),
            notifications: NotificationStore::new(),
            capabilities: RwLock::new(None),
            server_info: RwLock::new(None),
            tool_cache: std::sync::Mutex::new(None),
            opened_documents: std::sync::Mutex::new(HashSet::new()),
            opening_documents: Mutex::new(()),
            cancel: std::sync::Mutex::new(CancellationToken::new()),
        });

        let client = Self {
            config,
            root,
            client_capabilities: None,
            shared,
            session: Mutex::new(None),
        };

        match client.kind() {
            ServerKind::Lsp => client.track_notifications(lsp::PUBLISH_DIAGNOSTICS, "uri"),
            ServerKind::Mcp => client.track_notifications(mcp::RESOURCE_UPDATED, "uri"),
        }
        client
    }

    /// Workspace root advertised to language servers.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Replace the capability object sent in `initialize`.
    pub fn with_client_capabilities(mut self, capabilities: Value) -> Self {
        self.client_capabilities = Some(capabilities);
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn kind(&self) -> ServerKind {
        self.config.kind
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn status(&self) -> ServerStatus {
        self.shared.status()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state.borrow().clone()
    }

    pub fn pid(&self) -> Option<u32> {
        self.shared.state.borrow().pid
    }

    /// Status changes, including unexpected exits while running.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Capabilities returned by the server's `initialize` response.
    pub fn capabilities(&self) -> Option<Value> {
        read_lock(&self.shared.capabilities).clone()
    }

    pub fn server_info(&self) -> Option<Value> {
        read_lock(&self.shared.server_info).clone()
    }

    pub async fn pending_count(&self) -> usize {
        self.shared.pending.lock().await.len()
    }

    /// Spawn the configured process and run the handshake.
    ///
    /// A no-op when already running. Any failure terminates the process,
    /// leaves the client in `Error` and is returned to the caller.
    pub async fn start(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if self.status() == ServerStatus::Running {
            return Ok(());
        }
        self.begin_start(&mut session).await;

        info!(
            "Starting server '{}': {} {}",
            self.name(),
            self.config.command,
            self.config.args.join(" ")
        );

        let mut process = match ProcessHandle::spawn(&self.config) {
            Ok(process) => process,
            Err(e) => return Err(self.fail_start(&mut session, e).await),
        };

        let (Some(stdin), Some(stdout)) = (process.take_stdin(), process.take_stdout()) else {
            let err = RpcError::Transport(format!("server '{}' has no stdio pipes", self.name()));
            if let Err(e) = process.terminate(self.config.shutdown_duration()).await {
                warn!("[{}] Failed to reap process: {}", self.name(), e);
            }
            return Err(self.fail_start(&mut session, err).await);
        };

        let pid = process.pid();
        self.shared.state.send_modify(|state| state.pid = pid);
        *session = Some(
            self.attach(Box::new(stdout), Box::new(stdin), Some(process))
                .await,
        );

        self.finish_start(&mut session).await
    }

    /// Run the same lifecycle over arbitrary byte pipes instead of a child
    /// process.
    pub async fn start_with_transport<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let mut session = self.session.lock().await;
        if self.status() == ServerStatus::Running {
            return Ok(());
        }
        self.begin_start(&mut session).await;
        info!("Starting server '{}' over an in-process transport", self.name());

        *session = Some(self.attach(Box::new(reader), Box::new(writer), None).await);
        self.finish_start(&mut session).await
    }

    async fn begin_start(&self, session: &mut Option<Session>) {
        // Leftovers from a connection that went to Error
        if let Some(old) = session.take() {
            old.teardown(&self.shared, self.config.shutdown_duration()).await;
        }
        self.reset_connection_state();
        self.shared.state.send_modify(|state| {
            state.status = ServerStatus::Starting;
            state.error = None;
            state.pid = None;
            state.started_at = None;
        });
    }

    async fn attach(
        &self,
        reader: BoxedReader,
        writer: BoxedWriter,
        process: Option<ProcessHandle>,
    ) -> Session {
        let cancel = CancellationToken::new();
        *lock(&self.shared.cancel) = cancel.clone();
        *self.shared.writer.lock().await = Some(FramedWrite::new(writer, ContentLengthCodec::new()));

        let exit = process.as_ref().map(ProcessHandle::exit_signal);
        let reader = tokio::spawn(read_loop(
            Arc::clone(&self.shared),
            reader,
            exit,
            cancel.clone(),
        ));

        Session {
            cancel,
            reader,
            process,
        }
    }

    async fn finish_start(&self, session: &mut Option<Session>) -> Result<()> {
        let startup = self.config.startup_duration();
        let handshake = self.handshake();
        let outcome = match Instant::now().checked_add(startup) {
            Some(deadline) => tokio::time::timeout_at(deadline, handshake)
                .await
                .unwrap_or_else(|_| {
                    Err(RpcError::Timeout {
                        method: "initialize".to_string(),
                        timeout: startup,
                    })
                }),
            None => handshake.await,
        };

        match outcome {
            Ok(()) => {
                self.shared.state.send_modify(|state| {
                    state.status = ServerStatus::Running;
                    state.started_at = Some(Utc::now());
                });
                info!("Server '{}' is running", self.name());
                Ok(())
            }
            Err(e) => Err(self.fail_start(session, e).await),
        }
    }

    async fn fail_start(&self, session: &mut Option<Session>, err: RpcError) -> RpcError {
        error!("Failed to start server '{}': {}", self.name(), err);
        if let Some(session) = session.take() {
            session
                .teardown(&self.shared, self.config.shutdown_duration())
                .await;
        }
        self.reset_connection_state();
        self.shared.state.send_modify(|state| {
            state.status = ServerStatus::Error;
            state.error = Some(err.to_string());
            state.pid = None;
        });
        err
    }

    async fn handshake(&self) -> Result<()> {
        let (params, initialized) = match self.kind() {
            ServerKind::Mcp => (
                mcp::initialize_params(self.client_capabilities.clone()),
                mcp::INITIALIZED,
            ),
            ServerKind::Lsp => (
                lsp::initialize_params(
                    &self.config,
                    &self.root,
                    self.client_capabilities.clone(),
                )?,
                lsp::INITIALIZED,
            ),
        };

        let result = self
            .send_request("initialize", Some(params), None, Gate::Handshake)
            .await?;

        let capabilities = match result.get("capabilities") {
            Some(Value::Object(caps)) => Value::Object(caps.clone()),
            _ => json!({}),
        };
        debug!("[{}] Server capabilities: {}", self.name(), capabilities);
        *write_lock(&self.shared.capabilities) = Some(capabilities);
        *write_lock(&self.shared.server_info) = result.get("serverInfo").cloned();

        let initialized_params = match self.kind() {
            ServerKind::Mcp => None,
            ServerKind::Lsp => Some(json!({})),
        };
        self.send_notification(initialized, initialized_params, Gate::Handshake)
            .await
    }

    /// Shut the connection down.
    ///
    /// Language servers get `shutdown` + `exit` first. Pending requests are
    /// resolved with a cancellation error and the process is terminated
    /// regardless of how the shutdown exchange went.
    pub async fn stop(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        let status = self.status();
        if status == ServerStatus::Stopped && session.is_none() {
            return Ok(());
        }

        info!("Stopping server '{}'", self.name());
        self.shared.set_status(ServerStatus::Stopping);

        if status == ServerStatus::Running && self.kind() == ServerKind::Lsp {
            let grace = self.config.shutdown_duration();
            if let Err(e) = self
                .send_request("shutdown", None, Some(grace), Gate::Shutdown)
                .await
            {
                debug!("[{}] shutdown request failed: {}", self.name(), e);
            }
            if let Err(e) = self.send_notification("exit", None, Gate::Shutdown).await {
                debug!("[{}] exit notification failed: {}", self.name(), e);
            }
        }

        if let Some(session) = session.take() {
            session
                .teardown(&self.shared, self.config.shutdown_duration())
                .await;
        }
        self.shared
            .fail_pending(|method| RpcError::Cancelled(format!("{} cancelled by shutdown", method)))
            .await;

        self.reset_connection_state();
        self.shared.state.send_modify(|state| {
            *state = ConnectionState::default();
        });
        info!("Server '{}' stopped", self.name());
        Ok(())
    }

    fn reset_connection_state(&self) {
        write_lock(&self.shared.capabilities).take();
        write_lock(&self.shared.server_info).take();
        lock(&self.shared.tool_cache).take();
        lock(&self.shared.opened_documents).clear();
        self.shared.notifications.clear();
    }

    /// Send a request using the configured request timeout.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        self.send_request(method, params, Some(self.config.request_duration()), Gate::Normal)
            .await
    }

    pub async fn request_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        self.send_request(method, params, Some(timeout), Gate::Normal)
            .await
    }

    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        self.send_notification(method, params, Gate::Normal).await
    }

    async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
        gate: Gate,
    ) -> Result<Value> {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));

        // Status is checked under the pending lock so a request cannot slip in
        // after the read loop has drained the table.
        let (id, completion) = {
            let mut pending = self.shared.pending.lock().await;
            let status = self.status();
            if !gate.admits(status) {
                return Err(RpcError::NotRunning {
                    server: self.name().to_string(),
                    status,
                });
            }
            pending.register(method, deadline)
        };

        debug!("[{}] --> {} ({})", self.name(), method, id);
        if let Err(e) = self
            .shared
            .send(Message::request(id, method, params))
            .await
        {
            self.shared.pending.lock().await.remove(id);
            if self.shared.mark_failed(&e.to_string()) {
                error!("Server '{}' connection lost: {}", self.name(), e);
                // The read loop drains whatever else is pending
                lock(&self.shared.cancel).cancel();
            }
            return Err(e);
        }

        let outcome = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, completion).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    self.shared.pending.lock().await.remove(id);
                    let timeout = timeout.unwrap_or_default();
                    warn!(
                        "[{}] {} ({}) timed out after {:?}",
                        self.name(),
                        method,
                        id,
                        timeout
                    );
                    return Err(RpcError::Timeout {
                        method: method.to_string(),
                        timeout,
                    });
                }
            },
            None => completion.await,
        };

        outcome.unwrap_or_else(|_| {
            Err(RpcError::Cancelled(format!(
                "{} dropped by server '{}'",
                method,
                self.name()
            )))
        })
    }

    async fn send_notification(&self, method: &str, params: Option<Value>, gate: Gate) -> Result<()> {
        let status = self.status();
        if !gate.admits(status) {
            return Err(RpcError::NotRunning {
                server: self.name().to_string(),
                status,
            });
        }
        debug!("[{}] --> {} (notification)", self.name(), method);
        self.shared
            .send(Message::notification(method, params))
            .await
    }

    /// Register a callback for a notification method.
    pub fn on_notification<F>(&self, method: &str, handler: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        write_lock(&self.shared.handlers)
            .entry(method.to_string())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Keep the latest `method` payload per value of its `key_field`.
    pub fn track_notifications(&self, method: &str, key_field: &str) {
        write_lock(&self.shared.tracked).insert(method.to_string(), key_field.to_string());
    }

    pub fn latest_notification(&self, method: &str, key: &str) -> Option<StoredNotification> {
        self.shared.notifications.latest(method, key)
    }

    pub async fn wait_for_notification(
        &self,
        method: &str,
        key: &str,
        timeout: Duration,
    ) -> Option<StoredNotification> {
        self.shared.notifications.wait_for(method, key, timeout).await
    }

    /// Tools the server offers.
    ///
    /// MCP servers are asked via paginated `tools/list` and the answer is
    /// cached until the server announces a change. Language servers expose
    /// the features their capabilities advertise.
    pub async fn list_tools(&self) -> Result<Vec<RemoteCapabilityDescriptor>> {
        self.ensure_running()?;
        match self.kind() {
            ServerKind::Mcp => {
                if let Some(cached) = lock(&self.shared.tool_cache).clone() {
                    return Ok(cached);
                }
                let items = mcp::paginate(self, mcp::TOOLS_LIST, "tools").await?;
                let tools = mcp::parse_tools(self.name(), &items);
                debug!("[{}] {} tool(s) listed", self.name(), tools.len());
                *lock(&self.shared.tool_cache) = Some(tools.clone());
                Ok(tools)
            }
            ServerKind::Lsp => Ok(lsp::feature_descriptors(
                self.name(),
                &self.capabilities().unwrap_or_else(|| json!({})),
            )),
        }
    }

    pub async fn list_resources(&self) -> Result<Vec<RemoteCapabilityDescriptor>> {
        self.ensure_running()?;
        match self.kind() {
            ServerKind::Mcp => {
                let items = mcp::paginate(self, mcp::RESOURCES_LIST, "resources").await?;
                Ok(mcp::parse_resources(self.name(), &items))
            }
            ServerKind::Lsp => Ok(Vec::new()),
        }
    }

    pub async fn list_prompts(&self) -> Result<Vec<RemoteCapabilityDescriptor>> {
        self.ensure_running()?;
        match self.kind() {
            ServerKind::Mcp => {
                let items = mcp::paginate(self, mcp::PROMPTS_LIST, "prompts").await?;
                Ok(mcp::parse_prompts(self.name(), &items))
            }
            ServerKind::Lsp => Ok(Vec::new()),
        }
    }

    /// Invoke a tool or language feature by its remote name. Returns the
    /// raw result payload.
    pub async fn call_capability(&self, name: &str, arguments: Value) -> Result<Value> {
        self.ensure_running()?;
        match self.kind() {
            ServerKind::Mcp => {
                self.request(
                    mcp::TOOLS_CALL,
                    Some(json!({"name": name, "arguments": arguments})),
                )
                .await
            }
            ServerKind::Lsp => lsp::call_feature(self, name, arguments).await,
        }
    }

    fn ensure_running(&self) -> Result<()> {
        match self.status() {
            ServerStatus::Running => Ok(()),
            status => Err(RpcError::NotRunning {
                server: self.name().to_string(),
                status,
            }),
        }
    }

    /// Serializes document opens on this connection.
    pub(crate) async fn lock_document_opens(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.shared.opening_documents.lock().await
    }

    pub(crate) fn is_document_open(&self, path: &Path) -> bool {
        lock(&self.shared.opened_documents).contains(path)
    }

    pub(crate) fn mark_document_open(&self, path: &Path) {
        lock(&self.shared.opened_documents).insert(path.to_path_buf());
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        // The process handle inside the session kills the child on drop
        lock(&self.shared.cancel).cancel();
    }
}

fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
