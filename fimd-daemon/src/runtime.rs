use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};

use fimd_core::{AgentConfig, LogFormat};

use crate::collaborators::{BaselineScanner, ChangeForwarder, CommandJob, CommandScanner, NoScanner};
use crate::delivery::{DeliveryChannel, UnixQueue};
use crate::error::{io_err, DaemonError};
use crate::launcher::{Shutdown, ShutdownTrigger, TaskLauncher};
use crate::notify_source::{NotifySource, WatchTable};
use crate::protocol::{ControlCommand, ControlRequest, ControlResponse};
use crate::realtime::RealtimeWatcher;
use crate::scheduler::{Scheduler, WhodataSetup, POLL_INTERVAL};
use crate::state::{DaemonState, ForcedRescan};
use crate::whodata::WhodataBackend;

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(config: AgentConfig) -> Result<(), DaemonError> {
    init_tracing(config.log_format);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config))
}

/// Run the daemon until it is stopped or a fatal error occurs.
pub async fn run(config: AgentConfig) -> Result<(), DaemonError> {
    let config = Arc::new(config);
    let state = Arc::new(DaemonState::new(
        ForcedRescan::new(config.restart_marker.clone()),
        unix_seconds_now(),
    ));
    let channel = Arc::new(DeliveryChannel::open(
        UnixQueue,
        &config.queue_path,
        config.send_delay(),
    )?);

    let (trigger, shutdown) = ShutdownTrigger::new();
    let mut launcher = TaskLauncher::new(trigger.clone());

    let control = control_server(
        config.control_socket.clone(),
        config.clone(),
        state.clone(),
        trigger.clone(),
        launcher.shutdown(),
    );
    launcher.spawn("control-socket", control)?;
    launcher.spawn("signals", signal_listener(trigger.clone(), launcher.shutdown()))?;

    let scheduler = build_scheduler(config, state, channel);
    match scheduler.run(&mut launcher, shutdown).await {
        Ok(()) => launcher.join_all().await,
        Err(err) => {
            tracing::error!(error = %err, "scan scheduler failed, shutting down");
            trigger.trigger();
            let _ = launcher.join_all().await;
            Err(err)
        }
    }
}

fn build_scheduler(
    config: Arc<AgentConfig>,
    state: Arc<DaemonState>,
    channel: Arc<DeliveryChannel>,
) -> Scheduler<Option<NotifySource>> {
    let (source, table) = NotifySource::for_platform();

    let mut realtime = RealtimeWatcher::new(
        source,
        state.clone(),
        Arc::new(ChangeForwarder),
        channel.clone(),
        POLL_INTERVAL,
    );
    if let Some(table) = &table {
        let dirs = config
            .realtime_directories()
            .map(|dir| dir.path.clone())
            .collect();
        realtime = realtime.with_directories(Arc::new(table.clone()), dirs);
    }

    let scanner: Arc<dyn BaselineScanner> = match &config.scan_command {
        Some(command) => Arc::new(CommandScanner::new(command.clone())),
        None => {
            tracing::warn!("no scan command configured, baseline scans only emit scan markers");
            Arc::new(NoScanner)
        }
    };

    let mut scheduler = Scheduler::new(config.clone(), state, channel, scanner, realtime);
    if let Some(job) = &config.rootcheck {
        scheduler = scheduler.with_rootcheck(Arc::new(CommandJob::rootcheck(job.clone())));
    }
    if let Some(job) = &config.inventory {
        scheduler = scheduler.with_inventory(Arc::new(CommandJob::inventory(job.clone())));
    }
    if let Some(table) = table {
        scheduler = scheduler.with_whodata(whodata_setup(table, &config));
    }
    scheduler
}

fn whodata_setup(table: WatchTable, config: &AgentConfig) -> WhodataSetup {
    WhodataSetup {
        backend: WhodataBackend::for_platform(table.clone(), config),
        registrar: Arc::new(table),
    }
}

async fn control_server(
    socket: PathBuf,
    config: Arc<AgentConfig>,
    state: Arc<DaemonState>,
    trigger: ShutdownTrigger,
    mut shutdown: Shutdown,
) -> Result<(), DaemonError> {
    if let Some(parent) = socket.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
    }
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;
    tracing::info!(socket = %socket.display(), "control socket listening");

    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let config = config.clone();
                let state = state.clone();
                let trigger = trigger.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_control_client(stream, &config, &state, &trigger).await {
                        tracing::error!(error = %err, "control client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_control_client(
    stream: UnixStream,
    config: &AgentConfig,
    state: &DaemonState,
    trigger: &ShutdownTrigger,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("control socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request = match serde_json::from_str::<ControlRequest>(&line) {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &ControlResponse::error(format!("invalid request: {err}")),
                )
                .await?;
                continue;
            }
        };

        let response = match request.cmd {
            ControlCommand::Status => ControlResponse::ok(status_payload(config, state)),
            ControlCommand::Rescan => {
                state.rescan.request();
                tracing::info!("rescan requested over control socket");
                ControlResponse::ok(json!({ "requested": true }))
            }
            ControlCommand::Stop => {
                tracing::info!("stop requested over control socket");
                trigger.trigger();
                ControlResponse::ok(json!({ "stopping": true }))
            }
        };

        write_response(&mut writer, &response).await?;
        if request.cmd == ControlCommand::Stop {
            break;
        }
    }

    Ok(())
}

fn status_payload(config: &AgentConfig, state: &DaemonState) -> Value {
    let snapshot = state.snapshot();
    json!({
        "running": true,
        "pid": std::process::id(),
        "version": env!("CARGO_PKG_VERSION"),
        "disabled": config.disabled,
        "realtime": snapshot.realtime,
        "scan_in_progress": snapshot.scan_in_progress,
        "scans_completed": snapshot.scans_completed,
        "last_scan_at_unix": snapshot.last_scan_at_unix,
        "started_at_unix": snapshot.started_at_unix,
        "frequency_secs": config.effective_frequency().as_secs(),
        "directories": config.directories.len(),
    })
}

async fn signal_listener(trigger: ShutdownTrigger, mut shutdown: Shutdown) -> Result<(), DaemonError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate =
        signal(SignalKind::terminate()).map_err(|e| io_err("SIGTERM handler", e))?;
    tokio::select! {
        _ = shutdown.wait() => {}
        _ = terminate.recv() => {
            tracing::info!("received SIGTERM, shutting down daemon");
            trigger.trigger();
        }
        interrupted = tokio::signal::ctrl_c() => {
            interrupted.map_err(|e| io_err("ctrl-c handler", e))?;
            tracing::info!("received ctrl-c, shutting down daemon");
            trigger.trigger();
        }
    }
    Ok(())
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "control socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale control socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &ControlResponse,
) -> Result<(), DaemonError> {
    let mut payload = serde_json::to_string(response)?;
    payload.push('\n');
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("control socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("control socket flush", e))
}

fn unix_seconds_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

fn init_tracing(format: LogFormat) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_target(false);
    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
}

fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{request_rescan, request_status, request_stop};
    use std::os::unix::fs::PermissionsExt;
    use std::os::unix::net::UnixListener as StdUnixListener;
    use tempfile::TempDir;

    struct Server {
        _tmp: TempDir,
        socket: PathBuf,
        state: Arc<DaemonState>,
        shutdown: Shutdown,
        handle: tokio::task::JoinHandle<Result<(), DaemonError>>,
    }

    async fn start_server() -> Server {
        let tmp = TempDir::new().expect("tempdir");
        let socket = tmp.path().join("run/control.sock");
        let state = Arc::new(DaemonState::new(ForcedRescan::default(), 1_700_000_000));
        let (trigger, shutdown) = ShutdownTrigger::new();
        let handle = tokio::spawn(control_server(
            socket.clone(),
            Arc::new(AgentConfig::default()),
            state.clone(),
            trigger.clone(),
            trigger.subscribe(),
        ));
        while !socket.exists() {
            tokio::task::yield_now().await;
        }
        Server {
            _tmp: tmp,
            socket,
            state,
            shutdown,
            handle,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn control_socket_status_rescan_and_stop() {
        let server = start_server().await;
        let mode = fs::metadata(&server.socket).expect("meta").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        let socket = server.socket.clone();
        let status = tokio::task::spawn_blocking(move || request_status(&socket))
            .await
            .expect("join")
            .expect("status");
        assert_eq!(status["running"], true);
        assert_eq!(status["realtime"], "stopped");
        assert_eq!(status["started_at_unix"], 1_700_000_000);

        let socket = server.socket.clone();
        tokio::task::spawn_blocking(move || request_rescan(&socket))
            .await
            .expect("join")
            .expect("rescan");
        assert!(server.state.rescan.take(), "rescan flag set");

        let socket = server.socket.clone();
        tokio::task::spawn_blocking(move || request_stop(&socket))
            .await
            .expect("join")
            .expect("stop");
        server.handle.await.expect("join").expect("server exits cleanly");
        assert!(server.shutdown.is_triggered());
        assert!(!server.socket.exists(), "socket removed on exit");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn invalid_request_gets_an_error_response() {
        let server = start_server().await;
        let mut stream = UnixStream::connect(&server.socket).await.expect("connect");
        stream.write_all(b"{\"cmd\":\"reboot\"}\n").await.expect("write");

        let mut lines = BufReader::new(stream).lines();
        let line = lines.next_line().await.expect("read").expect("line");
        let response: ControlResponse = serde_json::from_str(&line).expect("decode");
        assert!(!response.ok);
        assert!(response.error.unwrap_or_default().contains("invalid request"));
        server.handle.abort();
    }

    #[test]
    fn stale_socket_is_removed_but_live_one_is_refused() {
        let tmp = TempDir::new().expect("tempdir");
        let socket = tmp.path().join("control.sock");

        let live = StdUnixListener::bind(&socket).expect("bind");
        let err = prepare_socket_for_bind(&socket).unwrap_err();
        assert!(err.to_string().contains("already in use"));
        drop(live);

        prepare_socket_for_bind(&socket).expect("stale socket removed");
        assert!(!socket.exists());
    }

    #[tokio::test]
    async fn missing_delivery_queue_fails_startup() {
        let tmp = TempDir::new().expect("tempdir");
        let config = AgentConfig {
            queue_path: tmp.path().join("no-queue"),
            control_socket: tmp.path().join("control.sock"),
            ..AgentConfig::default()
        };
        let err = run(config).await.unwrap_err();
        assert!(matches!(err, DaemonError::Io { .. }), "got: {err}");
        assert!(!tmp.path().join("control.sock").exists());
    }
}
