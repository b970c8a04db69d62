//! Process execution for a single project run.
//!
//! The `Runner` installs dependencies, launches the project and streams its output
//! to a caller-supplied sink until the process exits or a stop is requested.
//! Standard output and error share one pipe so lines arrive in the order the child
//! wrote them.

use std::future::Future;
use std::io::{BufRead, BufReader, PipeReader};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::commands::{self, RunCommand};
use crate::detect::ProjectType;
use crate::error::RunError;
use crate::events::{ProcessSignal, RunEvent, RunOutcome};
use crate::output::{classify, Phase};
use crate::process::{RunSession, RunState};

/// Upper bound on waiting for the output reader after the child is gone.
const READER_DRAIN: Duration = Duration::from_millis(500);

/// Lines buffered between the reader thread and the caller's sink.
const OUTPUT_BUFFER: usize = 256;

/// Runs one project at a time: install, launch, stream, stop.
pub struct Runner {
    shutdown: ShutdownConfig,
    state: watch::Sender<RunState>,
    state_rx: watch::Receiver<RunState>,
    stop: Arc<watch::Sender<bool>>,
}

/// Cancels the run of a [`Runner`] from another task.
#[derive(Clone)]
pub struct StopHandle {
    stop: Arc<watch::Sender<bool>>,
    state: watch::Receiver<RunState>,
}

/// Grace periods used when stopping a child.
#[derive(Debug, Clone, Copy)]
pub struct ShutdownConfig {
    sigint_ms: u64,
    sigterm_ms: u64,
}

impl ShutdownConfig {
    pub fn new(sigint_ms: u64, sigterm_ms: u64) -> Self {
        Self {
            sigint_ms,
            sigterm_ms,
        }
    }

    fn sigint_timeout(&self) -> Duration {
        Duration::from_millis(self.sigint_ms)
    }

    fn sigterm_timeout(&self) -> Duration {
        Duration::from_millis(self.sigterm_ms)
    }

    fn sigint_enabled(&self) -> bool {
        self.sigint_ms > 0
    }

    fn sigterm_enabled(&self) -> bool {
        self.sigterm_ms > 0
    }

    /// Longest time a stop can take before the child is force-killed.
    pub fn grace_period(&self) -> Duration {
        self.sigint_timeout() + self.sigterm_timeout()
    }
}

impl StopHandle {
    /// Asks the runner to stop without waiting for it. A request made before the
    /// run starts cancels it.
    pub fn request(&self) {
        self.stop.send_replace(true);
    }

    /// Stops the current run and returns once its child process has been reaped.
    ///
    /// Calling this on an idle or finished runner is a no-op.
    pub async fn stop(&self) {
        let mut state = self.state.clone();
        let active = state.borrow_and_update().is_active();
        if !active {
            return;
        }
        self.stop.send_replace(true);
        let _ = state.wait_for(|state| !state.is_active()).await;
    }

    pub fn state(&self) -> RunState {
        self.state.borrow().clone()
    }
}

/// A run driven on its own task. Dropping it without [`RunTask::join`] asks the
/// runner to stop, so an early return never leaves the project running unseen.
pub struct RunTask {
    stop: StopHandle,
    handle: Option<JoinHandle<RunOutcome>>,
}

impl RunTask {
    /// Spawns `run`, which must be driven by the runner `stop` belongs to.
    pub fn spawn<F>(stop: StopHandle, run: F) -> Self
    where
        F: Future<Output = RunOutcome> + Send + 'static,
    {
        Self {
            stop,
            handle: Some(tokio::spawn(run)),
        }
    }

    pub fn stop_handle(&self) -> &StopHandle {
        &self.stop
    }

    /// Waits for the run to finish and returns its outcome.
    pub async fn join(mut self) -> Result<RunOutcome> {
        let handle = self.handle.take().context("run task already joined")?;
        handle.await.context("runner task failed")
    }
}

impl Drop for RunTask {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop.request();
        }
    }
}

impl Runner {
    pub fn new(shutdown: ShutdownConfig) -> Self {
        let (state, state_rx) = watch::channel(RunState::Idle);
        let (stop, _) = watch::channel(false);
        Self {
            shutdown,
            state,
            state_rx,
            stop: Arc::new(stop),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            stop: Arc::clone(&self.stop),
            state: self.state_rx.clone(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state_rx.borrow().clone()
    }

    /// Installs dependencies for and launches the project at `root`.
    pub async fn run(
        &mut self,
        root: &Path,
        kind: ProjectType,
        sink: mpsc::Sender<RunEvent>,
    ) -> RunOutcome {
        let install = commands::install_command(kind, root);
        let command = commands::run_command(kind, root);
        tracing::info!(
            path = %root.display(),
            project_type = %kind,
            command = %command,
            "starting project"
        );
        self.run_commands(install, command, sink).await
    }

    /// Runs `install` (if any) to completion, then `command` until it exits or is stopped.
    ///
    /// Every state change is sent to `sink`, followed by a final
    /// [`RunEvent::Finished`].
    pub async fn run_commands(
        &mut self,
        install: Option<RunCommand>,
        command: RunCommand,
        sink: mpsc::Sender<RunEvent>,
    ) -> RunOutcome {
        let mut stop_rx = self.stop.subscribe();
        self.state.send_replace(RunState::Idle);

        let outcome = self.drive(install, command, &sink, &mut stop_rx).await;

        self.stop.send_replace(false);
        match &outcome {
            RunOutcome::Failed(err) => tracing::warn!(error = %err, "run failed"),
            other => tracing::info!(outcome = ?other, "run finished"),
        }
        self.set_state(outcome.clone().into_state(), &sink).await;
        let _ = sink.send(RunEvent::Finished(outcome.clone())).await;
        outcome
    }

    async fn drive(
        &mut self,
        install: Option<RunCommand>,
        command: RunCommand,
        sink: &mpsc::Sender<RunEvent>,
        stop_rx: &mut watch::Receiver<bool>,
    ) -> RunOutcome {
        if *stop_rx.borrow_and_update() {
            return RunOutcome::Stopped { code: None };
        }
        self.set_state(RunState::Installing, sink).await;
        if let Some(install) = install {
            if let Some(outcome) = self.install(&install, sink, stop_rx).await {
                return outcome;
            }
        }

        self.set_state(RunState::Starting, sink).await;
        if let Some(message) = command.diagnostic_message() {
            let _ = sink
                .send(RunEvent::Output {
                    kind: classify(&message),
                    line: message,
                    phase: Phase::Run,
                })
                .await;
            return RunOutcome::Exited { code: None };
        }
        if *stop_rx.borrow() {
            return RunOutcome::Stopped { code: None };
        }

        let (mut child, lines) = match spawn_merged(&command, Phase::Run) {
            Ok(spawned) => spawned,
            Err(err) => return RunOutcome::Failed(err),
        };
        let pid = child.id().unwrap_or(0);
        tracing::info!(pid, command = %command, "project process started");
        let _ = sink
            .send(RunEvent::Started(RunSession::new(pid, command)))
            .await;
        self.set_state(RunState::Running, sink).await;
        let forwarder = forward_output(lines, sink.clone());

        let outcome = tokio::select! {
            status = child.wait() => {
                kill_group(pid);
                match status {
                    Ok(status) => RunOutcome::Exited { code: status.code() },
                    Err(err) => RunOutcome::Failed(RunError::Io {
                        message: err.to_string(),
                    }),
                }
            }
            _ = stop_requested(stop_rx) => {
                let code = self.terminate(&mut child).await;
                RunOutcome::Stopped { code }
            }
        };
        drain_output(forwarder).await;
        outcome
    }

    // Returns `Some` when the run must end here.
    async fn install(
        &self,
        command: &RunCommand,
        sink: &mpsc::Sender<RunEvent>,
        stop_rx: &mut watch::Receiver<bool>,
    ) -> Option<RunOutcome> {
        tracing::info!(command = %command, "installing dependencies");
        let (mut child, lines) = match spawn_merged(command, Phase::Install) {
            Ok(spawned) => spawned,
            Err(err) => return Some(RunOutcome::Failed(err)),
        };
        let forwarder = forward_output(lines, sink.clone());
        let pid = child.id().unwrap_or(0);
        let result = tokio::select! {
            status = child.wait() => {
                kill_group(pid);
                match status {
                    Ok(status) if status.success() => None,
                    Ok(status) => Some(RunOutcome::Failed(RunError::DependencyInstallFailed {
                        command: command.to_string(),
                        code: status.code(),
                    })),
                    Err(err) => Some(RunOutcome::Failed(RunError::Io {
                        message: err.to_string(),
                    })),
                }
            }
            _ = stop_requested(stop_rx) => {
                let code = self.terminate(&mut child).await;
                Some(RunOutcome::Stopped { code })
            }
        };
        drain_output(forwarder).await;
        result
    }

    /// SIGINT, then SIGTERM, then SIGKILL, waiting the configured grace period
    /// between steps. The whole process group is swept afterwards.
    async fn terminate(&self, child: &mut Child) -> Option<i32> {
        let pid = child.id();
        let mut code = None;
        let mut exited = false;

        let stages = [
            (
                self.shutdown.sigint_enabled(),
                ProcessSignal::SigInt,
                self.shutdown.sigint_timeout(),
            ),
            (
                self.shutdown.sigterm_enabled(),
                ProcessSignal::SigTerm,
                self.shutdown.sigterm_timeout(),
            ),
        ];
        for (enabled, signal, timeout) in stages {
            if !enabled {
                continue;
            }
            if let Some(pid) = pid {
                tracing::debug!(pid, signal = signal.label(), "sending signal");
                send_os_signal(pid, signal);
            }
            if let Ok(Some(status)) = wait_for_exit(child, timeout).await {
                code = status.code();
                exited = true;
                break;
            }
        }

        if !exited {
            tracing::warn!(pid, "child ignored shutdown signals, killing");
            if let Some(pid) = pid {
                kill_group(pid);
            }
            let _ = child.kill().await;
            code = child.wait().await.ok().and_then(|status| status.code());
        }
        if let Some(pid) = pid {
            kill_group(pid);
        }
        code
    }

    async fn set_state(&self, state: RunState, sink: &mpsc::Sender<RunEvent>) {
        tracing::debug!(state = %state, "runner state changed");
        self.state.send_replace(state.clone());
        let _ = sink.send(RunEvent::State(state)).await;
    }
}

async fn stop_requested(stop_rx: &mut watch::Receiver<bool>) {
    if stop_rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Waits for buffered output to reach the sink. A forwarder still running after
/// [`READER_DRAIN`] is aborted so nothing arrives after `Finished`.
async fn drain_output(mut forwarder: JoinHandle<()>) {
    if tokio::time::timeout(READER_DRAIN, &mut forwarder).await.is_err() {
        tracing::debug!("output still open after the child exited, detaching reader");
        forwarder.abort();
        let _ = forwarder.await;
    }
}

/// Relays reader output to `sink`. Only this task holds the caller's sender, so
/// aborting it releases the sink even while an orphan keeps the pipe open.
fn forward_output(
    mut lines: mpsc::Receiver<RunEvent>,
    sink: mpsc::Sender<RunEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = lines.recv().await {
            if sink.send(event).await.is_err() {
                break;
            }
        }
    })
}

/// Spawns `command` with stdout and stderr attached to the same pipe, and a
/// reader thread that turns each line into an output event on the returned channel.
fn spawn_merged(
    command: &RunCommand,
    phase: Phase,
) -> Result<(Child, mpsc::Receiver<RunEvent>), RunError> {
    if !command.cwd.is_dir() {
        return Err(RunError::Spawn {
            command: command.to_string(),
            message: format!("working directory {} does not exist", command.cwd.display()),
        });
    }
    let (reader, writer) = std::io::pipe().map_err(|err| spawn_error(command, err))?;
    let stderr = writer
        .try_clone()
        .map_err(|err| spawn_error(command, err))?;

    let mut process = Command::new(&command.program);
    process
        .args(&command.args)
        .current_dir(&command.cwd)
        .stdin(Stdio::null())
        .stdout(writer)
        .stderr(stderr)
        .kill_on_drop(true);

    #[cfg(windows)]
    {
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x00000200;
        process.creation_flags(CREATE_NEW_PROCESS_GROUP);
    }

    #[cfg(unix)]
    unsafe {
        process.pre_exec(|| {
            let _ = libc::setpgid(0, 0);
            Ok(())
        });
    }

    let spawned = process.spawn();
    // The command still owns our copies of the pipe's write end; the reader only
    // sees EOF once they are closed.
    drop(process);
    let child = spawned.map_err(|err| spawn_error(command, err))?;

    let (lines_tx, lines_rx) = mpsc::channel(OUTPUT_BUFFER);
    spawn_reader(reader, phase, lines_tx);
    Ok((child, lines_rx))
}

fn spawn_error(command: &RunCommand, err: std::io::Error) -> RunError {
    if err.kind() == std::io::ErrorKind::NotFound {
        RunError::ExecutableNotFound {
            program: command.program.clone(),
        }
    } else {
        RunError::Spawn {
            command: command.to_string(),
            message: err.to_string(),
        }
    }
}

fn spawn_reader(reader: PipeReader, phase: Phase, lines: mpsc::Sender<RunEvent>) {
    std::thread::spawn(move || {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf)
                        .trim_end_matches(|c| c == '\n' || c == '\r')
                        .to_string();
                    let kind = classify(&line);
                    if lines
                        .blocking_send(RunEvent::Output { kind, line, phase })
                        .is_err()
                    {
                        break;
                    }
                }
            }
        }
    });
}

#[cfg(unix)]
fn send_os_signal(pid: u32, signal: ProcessSignal) {
    unsafe {
        let sig = match signal {
            ProcessSignal::SigInt => libc::SIGINT,
            ProcessSignal::SigTerm => libc::SIGTERM,
        };
        let pid = pid as i32;
        let _ = libc::kill(-pid, sig);
        let _ = libc::kill(pid, sig);
    }
}

#[cfg(not(unix))]
fn send_os_signal(pid: u32, signal: ProcessSignal) {
    send_ctrl_break(pid, signal);
}

#[cfg(all(not(unix), windows))]
fn send_ctrl_break(pid: u32, signal: ProcessSignal) {
    use windows_sys::Win32::System::Console::GenerateConsoleCtrlEvent;
    use windows_sys::Win32::System::Console::CTRL_BREAK_EVENT;
    // Windows has no SIGTERM/SIGINT; CTRL_BREAK is the closest console signal.
    let _ = signal;
    unsafe {
        let _ = GenerateConsoleCtrlEvent(CTRL_BREAK_EVENT, pid);
    }
}

#[cfg(all(not(unix), not(windows)))]
fn send_ctrl_break(_pid: u32, _signal: ProcessSignal) {}

#[cfg(unix)]
fn kill_group(pid: u32) {
    // -0 would address our own process group.
    if pid == 0 {
        return;
    }
    unsafe {
        let _ = libc::kill(-(pid as i32), libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}

async fn wait_for_exit(child: &mut Child, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
    if timeout.is_zero() {
        return Ok(None);
    }
    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => Ok(Some(status)),
        Ok(Err(err)) => Err(err),
        Err(_) => Ok(None),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::detect;
    use crate::output::LineKind;
    use std::fs;
    use std::time::Instant;
    use tempfile::TempDir;

    fn sh(script: &str, cwd: &Path) -> RunCommand {
        RunCommand::new("sh", &["-c", script], cwd)
    }

    fn drain(rx: &mut mpsc::Receiver<RunEvent>) -> Vec<RunEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn output_lines(events: &[RunEvent]) -> Vec<(LineKind, String, Phase)> {
        events
            .iter()
            .filter_map(|event| match event {
                RunEvent::Output { kind, line, phase } => Some((*kind, line.clone(), *phase)),
                _ => None,
            })
            .collect()
    }

    fn states(events: &[RunEvent]) -> Vec<RunState> {
        events
            .iter()
            .filter_map(|event| match event {
                RunEvent::State(state) => Some(state.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn nextjs_project_installs_then_runs() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{"dependencies": {"next": "13.0.0"}}"#,
        )
        .unwrap();
        let kind = detect::detect(dir.path());
        assert_eq!(kind, ProjectType::NextJs);

        let install = commands::install_command(kind, dir.path()).unwrap();
        let run = commands::run_command(kind, dir.path());
        assert_eq!(install.tokens(), ["npm", "install"]);
        assert_eq!(run.tokens(), ["npm", "run", "dev"]);

        // Stand-in for npm that records its arguments.
        let stub = dir.path().join("npm-stub.sh");
        fs::write(
            &stub,
            "echo \"$*\" >> npm-calls.log\n\
             if [ \"$1\" = run ]; then echo 'ready - started server on 0.0.0.0:3000'; fi\n",
        )
        .unwrap();
        let through_stub = |command: RunCommand| {
            let stub = stub.display().to_string();
            let mut args = vec![stub.as_str()];
            args.extend(command.args.iter().map(String::as_str));
            RunCommand::new("sh", &args, &command.cwd)
        };

        let (tx, mut rx) = mpsc::channel(64);
        let mut runner = Runner::new(ShutdownConfig::new(200, 200));
        let outcome = runner
            .run_commands(Some(through_stub(install)), through_stub(run), tx)
            .await;
        assert_eq!(outcome, RunOutcome::Exited { code: Some(0) });

        let calls = fs::read_to_string(dir.path().join("npm-calls.log")).unwrap();
        assert_eq!(calls, "install\nrun dev\n");

        let events = drain(&mut rx);
        let lines = output_lines(&events);
        assert_eq!(
            lines,
            vec![(
                LineKind::Ready,
                "ready - started server on 0.0.0.0:3000".to_string(),
                Phase::Run
            )]
        );
        assert_eq!(
            states(&events),
            vec![
                RunState::Installing,
                RunState::Starting,
                RunState::Running,
                RunState::Stopped {
                    code: Some(0),
                    cancelled: false
                },
            ]
        );
        assert!(matches!(events.last(), Some(RunEvent::Finished(_))));
    }

    #[tokio::test]
    async fn stop_terminates_running_child() {
        let dir = TempDir::new().unwrap();
        let shutdown = ShutdownConfig::new(200, 200);
        let mut runner = Runner::new(shutdown);
        let handle = runner.stop_handle();
        let (tx, mut rx) = mpsc::channel(64);
        let command = sh("echo server running; exec sleep 30", dir.path());
        let task = tokio::spawn(async move {
            let outcome = runner.run_commands(None, command, tx).await;
            (runner, outcome)
        });

        let mut pid = None;
        while let Some(event) = rx.recv().await {
            match event {
                RunEvent::Started(session) => pid = Some(session.pid),
                RunEvent::Output { .. } => break,
                _ => {}
            }
        }
        let pid = pid.expect("child started");

        let started = Instant::now();
        tokio::time::timeout(Duration::from_secs(5), handle.stop())
            .await
            .expect("stop returned");
        assert!(started.elapsed() < shutdown.grace_period() + Duration::from_secs(1));
        assert_eq!(
            handle.state(),
            RunState::Stopped {
                code: None,
                cancelled: true
            }
        );
        let alive = unsafe { libc::kill(pid as i32, 0) } == 0;
        assert!(!alive, "child {} still running", pid);

        let (_runner, outcome) = task.await.unwrap();
        assert!(matches!(outcome, RunOutcome::Stopped { .. }));
    }

    fn pid_alive(pid: u32) -> bool {
        unsafe { libc::kill(pid as i32, 0) == 0 }
    }

    /// Receives events until the first output line, returning the run's pid if
    /// one was started by then.
    async fn wait_for_output(
        rx: &mut mpsc::Receiver<RunEvent>,
    ) -> (Option<u32>, Vec<RunEvent>) {
        let mut pid = None;
        let mut seen = Vec::new();
        while let Some(event) = rx.recv().await {
            let is_output = matches!(event, RunEvent::Output { .. });
            if let RunEvent::Started(session) = &event {
                pid = Some(session.pid);
            }
            seen.push(event);
            if is_output {
                break;
            }
        }
        (pid, seen)
    }

    #[tokio::test]
    async fn stop_kills_child_that_ignores_signals() {
        let dir = TempDir::new().unwrap();
        let shutdown = ShutdownConfig::new(150, 150);
        let mut runner = Runner::new(shutdown);
        let handle = runner.stop_handle();
        let (tx, mut rx) = mpsc::channel(64);
        let command = sh(
            "trap '' INT TERM; echo armed; while true; do sleep 0.1; done",
            dir.path(),
        );
        let task = tokio::spawn(async move { runner.run_commands(None, command, tx).await });

        let (pid, _) = wait_for_output(&mut rx).await;
        let pid = pid.expect("child started");
        let started = Instant::now();
        tokio::time::timeout(Duration::from_secs(5), handle.stop())
            .await
            .expect("stop returned");
        assert!(started.elapsed() < shutdown.grace_period() + Duration::from_secs(1));
        assert!(!pid_alive(pid), "child {} survived the forced kill", pid);
        assert_eq!(task.await.unwrap(), RunOutcome::Stopped { code: None });
    }

    #[tokio::test]
    async fn stop_during_install_skips_the_project() {
        let dir = TempDir::new().unwrap();
        let mut runner = Runner::new(ShutdownConfig::new(200, 200));
        let handle = runner.stop_handle();
        let (tx, mut rx) = mpsc::channel(64);
        let install = sh("echo installing; exec sleep 30", dir.path());
        let command = sh("echo should not run", dir.path());
        let task =
            tokio::spawn(async move { runner.run_commands(Some(install), command, tx).await });

        let (_, mut events) = wait_for_output(&mut rx).await;
        assert_eq!(handle.state(), RunState::Installing);
        tokio::time::timeout(Duration::from_secs(5), handle.stop())
            .await
            .expect("stop returned");
        let outcome = task.await.unwrap();
        assert!(matches!(outcome, RunOutcome::Stopped { .. }));

        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert!(!events
            .iter()
            .any(|event| matches!(event, RunEvent::Started(_))));
        assert_eq!(
            output_lines(&events),
            vec![(LineKind::Default, "installing".to_string(), Phase::Install)]
        );
        assert!(matches!(
            states(&events).last(),
            Some(RunState::Stopped {
                cancelled: true,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn background_children_do_not_hold_the_sink_open() {
        let dir = TempDir::new().unwrap();
        let mut runner = Runner::new(ShutdownConfig::new(100, 100));
        let (tx, mut rx) = mpsc::channel(64);
        let started = Instant::now();
        let outcome = runner
            .run_commands(None, sh("sleep 4 & echo hi", dir.path()), tx)
            .await;
        assert_eq!(outcome, RunOutcome::Exited { code: Some(0) });

        let mut events = Vec::new();
        let closed = tokio::time::timeout(Duration::from_secs(2), async {
            while let Some(event) = rx.recv().await {
                events.push(event);
            }
        })
        .await;
        assert!(closed.is_ok(), "sink still open after {:?}", started.elapsed());
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(output_lines(&events).len(), 1);
        assert!(matches!(events.last(), Some(RunEvent::Finished(_))));
    }

    #[tokio::test]
    async fn dropping_a_run_task_stops_the_project() {
        let dir = TempDir::new().unwrap();
        let mut runner = Runner::new(ShutdownConfig::new(100, 100));
        let handle = runner.stop_handle();
        let (tx, mut rx) = mpsc::channel(64);
        let command = sh("echo up; exec sleep 30", dir.path());
        let task = RunTask::spawn(runner.stop_handle(), async move {
            runner.run_commands(None, command, tx).await
        });

        let (pid, _) = wait_for_output(&mut rx).await;
        let pid = pid.expect("child started");
        drop(task);
        drop(rx);

        let deadline = Instant::now() + Duration::from_secs(3);
        while pid_alive(pid) && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(!pid_alive(pid), "child {} outlived its run task", pid);
        tokio::time::timeout(Duration::from_secs(3), handle.stop())
            .await
            .expect("runner settled");
        assert!(matches!(handle.state(), RunState::Stopped { cancelled: true, .. }));
    }

    #[tokio::test]
    async fn joined_run_task_returns_the_outcome() {
        let dir = TempDir::new().unwrap();
        let mut runner = Runner::new(ShutdownConfig::new(100, 100));
        let (tx, _rx) = mpsc::channel(64);
        let command = sh("exit 4", dir.path());
        let task = RunTask::spawn(runner.stop_handle(), async move {
            runner.run_commands(None, command, tx).await
        });
        assert_eq!(task.join().await.unwrap(), RunOutcome::Exited { code: Some(4) });
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut runner = Runner::new(ShutdownConfig::new(100, 100));
        let handle = runner.stop_handle();
        handle.stop().await;
        assert_eq!(handle.state(), RunState::Idle);

        let (tx, _rx) = mpsc::channel(64);
        runner.run_commands(None, sh("exit 0", dir.path()), tx).await;
        handle.stop().await;
        handle.stop().await;
        assert_eq!(
            runner.state(),
            RunState::Stopped {
                code: Some(0),
                cancelled: false
            }
        );
    }

    #[tokio::test]
    async fn request_before_run_cancels_it() {
        let dir = TempDir::new().unwrap();
        let mut runner = Runner::new(ShutdownConfig::new(100, 100));
        runner.stop_handle().request();
        let (tx, mut rx) = mpsc::channel(64);
        let outcome = runner
            .run_commands(None, sh("echo should not run", dir.path()), tx)
            .await;
        assert_eq!(outcome, RunOutcome::Stopped { code: None });
        assert!(output_lines(&drain(&mut rx)).is_empty());

        let (tx, _rx) = mpsc::channel(64);
        let outcome = runner.run_commands(None, sh("exit 0", dir.path()), tx).await;
        assert_eq!(outcome, RunOutcome::Exited { code: Some(0) });
    }

    #[tokio::test]
    async fn failed_install_never_starts_project() {
        let dir = TempDir::new().unwrap();
        let (tx, mut rx) = mpsc::channel(64);
        let mut runner = Runner::new(ShutdownConfig::new(100, 100));
        let outcome = runner
            .run_commands(
                Some(sh("echo 'npm ERR! missing script'; exit 3", dir.path())),
                sh("echo should not run", dir.path()),
                tx,
            )
            .await;
        match outcome {
            RunOutcome::Failed(RunError::DependencyInstallFailed { code, .. }) => {
                assert_eq!(code, Some(3))
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        let events = drain(&mut rx);
        assert!(!events
            .iter()
            .any(|event| matches!(event, RunEvent::Started(_))));
        assert_eq!(
            output_lines(&events),
            vec![(
                LineKind::Default,
                "npm ERR! missing script".to_string(),
                Phase::Install
            )]
        );
        assert!(matches!(runner.state(), RunState::Failed { .. }));
    }

    #[tokio::test]
    async fn missing_executable_is_reported() {
        let dir = TempDir::new().unwrap();
        let (tx, _rx) = mpsc::channel(64);
        let mut runner = Runner::new(ShutdownConfig::new(100, 100));
        let outcome = runner
            .run_commands(
                None,
                RunCommand::new("limebox-no-such-program", &[], dir.path()),
                tx,
            )
            .await;
        assert_eq!(
            outcome,
            RunOutcome::Failed(RunError::ExecutableNotFound {
                program: "limebox-no-such-program".into()
            })
        );
    }

    #[tokio::test]
    async fn unknown_project_reports_without_spawning() {
        let dir = TempDir::new().unwrap();
        let (tx, mut rx) = mpsc::channel(64);
        let mut runner = Runner::new(ShutdownConfig::new(100, 100));
        let outcome = runner.run(dir.path(), ProjectType::Unknown, tx).await;
        assert_eq!(outcome, RunOutcome::Exited { code: None });
        let events = drain(&mut rx);
        assert!(!events
            .iter()
            .any(|event| matches!(event, RunEvent::Started(_))));
        let lines = output_lines(&events);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].1, "Unknown project type");
    }

    #[tokio::test]
    async fn merged_output_keeps_write_order_and_exit_code() {
        let dir = TempDir::new().unwrap();
        let (tx, mut rx) = mpsc::channel(64);
        let mut runner = Runner::new(ShutdownConfig::new(100, 100));
        let outcome = runner
            .run_commands(
                None,
                sh("echo one; echo 'error: two' 1>&2; echo three; exit 2", dir.path()),
                tx,
            )
            .await;
        assert_eq!(outcome, RunOutcome::Exited { code: Some(2) });
        let lines = output_lines(&drain(&mut rx));
        let texts: Vec<&str> = lines.iter().map(|(_, line, _)| line.as_str()).collect();
        assert_eq!(texts, ["one", "error: two", "three"]);
        assert_eq!(lines[1].0, LineKind::Error);
    }
}
