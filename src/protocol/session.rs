//! Session Lifecycle
//!
//! `ShellSessionManager` owns one shell: the byte channel, the pump task
//! that fans its output out to the emulator, the detector and subscribers,
//! and the session model. Foreground work is serialized by holding the
//! session lock for the whole run; background dispatches and preemptive
//! interrupts bypass it.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::detector::CompletionDetector;
use super::directory::{DirectoryTracker, ProtocolRunner};
use super::sentinel::{Sentinel, SentinelInstaller, ShellProfile};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{ExecutionState, SessionState, ShellSession, ShellType};
use crate::pty::channel::{ByteChannel, ChannelSpawner};
use crate::pty::events::{SessionEvent, SessionEventBus, SessionEventSubscription};
use crate::pty::process::PtySpawner;
use crate::terminal::{ScrollbackBuffer, TerminalEmulator};

/// How a command should be run
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Write the command and return at once
    pub background: bool,
    /// Bound on the wait for the completion signal
    pub timeout: Option<Duration>,
    /// Interrupt a running command instead of queueing behind it
    pub preempt: bool,
}

impl ExecuteOptions {
    pub fn background() -> Self {
        Self {
            background: true,
            ..Self::default()
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::default()
        }
    }
}

struct ActiveChannel {
    channel: Arc<dyn ByteChannel>,
    pump: JoinHandle<()>,
}

/// Lock-free view of the session for accessors
#[derive(Debug, Clone, Default)]
struct Status {
    shell_type: ShellType,
    sentinel: Option<Sentinel>,
    state: SessionState,
    degraded: bool,
}

/// Owns one interactive shell and the protocol state around it
pub struct ShellSessionManager {
    config: Config,
    spawner: Arc<dyn ChannelSpawner>,
    emulator: Arc<dyn TerminalEmulator>,
    detector: Arc<CompletionDetector>,
    tracker: DirectoryTracker,
    events: SessionEventBus,
    session: Mutex<ShellSession>,
    channel: RwLock<Option<ActiveChannel>>,
    status: RwLock<Status>,
    resize_generation: Arc<AtomicU64>,
    fixed_sentinel: Option<Sentinel>,
}

impl ShellSessionManager {
    pub fn new(
        config: Config,
        spawner: Arc<dyn ChannelSpawner>,
        emulator: Arc<dyn TerminalEmulator>,
    ) -> Self {
        let detector = CompletionDetector::new(
            Arc::clone(&emulator),
            config.protocol.clone(),
            config.output.clone(),
        );
        let tracker = DirectoryTracker::new(config.protocol.directory_timeout());

        Self {
            config,
            spawner,
            emulator,
            detector: Arc::new(detector),
            tracker,
            events: SessionEventBus::default(),
            session: Mutex::new(ShellSession::new()),
            channel: RwLock::new(None),
            status: RwLock::new(Status::default()),
            resize_generation: Arc::new(AtomicU64::new(0)),
            fixed_sentinel: None,
        }
    }

    /// Manager backed by a real PTY and the built-in scrollback
    pub fn with_pty(config: Config) -> Self {
        let emulator = Arc::new(ScrollbackBuffer::with_columns(
            config.protocol.scrollback_limit,
            config.shell.dimensions.0,
        ));
        Self::new(config, Arc::new(PtySpawner::new()), emulator)
    }

    /// Use `sentinel` instead of generating one per session
    pub fn with_sentinel(mut self, sentinel: Sentinel) -> Self {
        self.fixed_sentinel = Some(sentinel);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn emulator(&self) -> &Arc<dyn TerminalEmulator> {
        &self.emulator
    }

    /// Subscribe to output, lifecycle and notice events
    pub fn subscribe(&self) -> SessionEventSubscription {
        self.events.subscribe()
    }

    pub fn shell_type(&self) -> ShellType {
        self.status().shell_type
    }

    pub fn sentinel(&self) -> Option<Sentinel> {
        self.status().sentinel.clone()
    }

    pub fn state(&self) -> SessionState {
        self.status().state
    }

    pub fn is_degraded(&self) -> bool {
        self.status().degraded
    }

    pub fn execution_state(&self) -> ExecutionState {
        self.detector.execution_state()
    }

    /// Spawn the shell and install the sentinel
    ///
    /// A live session is reused: it is interrupted and its scrollback
    /// cleared. A session whose shell has exited is replaced.
    pub async fn create_shell_session(&self) -> Result<()> {
        let mut session = self.session.lock().await;

        if let Some(channel) = self.live_channel() {
            if session.is_ready() {
                info!("Reusing live shell session {}", session.id);
                if let Err(e) = self.detector.interrupt(channel.as_ref(), &session).await {
                    warn!("Interrupt on reuse failed: {}", e);
                }
                self.emulator.clear();
                return Ok(());
            }
        }

        self.stop_channel();
        session.reset_for_respawn();
        self.sync_status(&session);

        let spawned = self.spawner.spawn(&self.config.shell).await?;
        let (cols, rows) = self.config.shell.dimensions;
        self.emulator.resize(cols, rows);
        session.attach_program(&spawned.program);
        if let Some(sentinel) = &self.fixed_sentinel {
            if session.sentinel() != Some(sentinel) {
                session.set_sentinel(sentinel.clone())?;
            }
        }

        self.detector.reset();
        let pump = self.start_pump(spawned.output);
        *self.channel_mut() = Some(ActiveChannel {
            channel: Arc::clone(&spawned.channel),
            pump,
        });

        let installer = SentinelInstaller::new(
            spawned.channel.as_ref(),
            self.emulator.as_ref(),
            &self.events,
            self.config.protocol.settle_delay(),
        );
        if let Err(e) = installer.install(&mut session).await {
            error!("Sentinel installation failed: {}", e);
            self.sync_status(&session);
            return Err(e);
        }

        session.set_state(SessionState::Ready);
        self.sync_status(&session);
        info!(
            "Shell session {} ready ({}{})",
            session.id,
            session.shell_type,
            if session.is_degraded() { ", degraded" } else { "" }
        );
        Ok(())
    }

    /// Run a command and return its captured output
    pub async fn execute_shell_command(
        &self,
        command: &str,
        options: ExecuteOptions,
    ) -> Result<String> {
        if command.trim().is_empty() {
            return Err(Error::EmptyCommand);
        }

        if options.background {
            let channel = self.ready_channel_unlocked()?;
            return self
                .detector
                .dispatch_background(channel.as_ref(), self.shell_type(), command);
        }

        if options.preempt && self.detector.is_busy() {
            self.write_interrupt()?;
        }

        let mut session = self.session.lock().await;
        let channel = self.ready_channel(&session)?;
        let result = self
            .detector
            .execute(channel.as_ref(), &session, command, options.timeout)
            .await;
        self.tracker.observe(&mut session, command);
        self.sync_status(&session);
        result
    }

    /// Stop the foreground job and wait for the shell to be idle
    pub async fn interrupt_shell_session(&self) -> Result<()> {
        if self.detector.is_busy() {
            self.write_interrupt()?;
        }

        let session = self.session.lock().await;
        let channel = self.ready_channel(&session)?;
        self.detector.interrupt(channel.as_ref(), &session).await
    }

    /// The shell's working directory
    pub async fn get_current_directory(&self) -> Result<PathBuf> {
        let mut session = self.session.lock().await;
        let channel = self.ready_channel(&session)?;
        let runner = self.runner(channel);
        let result = self.tracker.current_directory(&mut session, &runner).await;
        self.sync_status(&session);
        result
    }

    /// Change the shell's directory and return where it ended up
    pub async fn navigate_to_directory(&self, path: &Path) -> Result<PathBuf> {
        let mut session = self.session.lock().await;
        let channel = self.ready_channel(&session)?;

        let profile = ShellProfile::for_shell(session.shell_type);
        let command = profile.cd_command(&path.to_string_lossy());
        let output = self
            .detector
            .execute(
                channel.as_ref(),
                &session,
                &command,
                Some(self.config.protocol.drain_timeout()),
            )
            .await;
        self.tracker.observe(&mut session, &command);
        match output {
            Ok(text) if !text.trim().is_empty() => warn!("{}: {}", command, text.trim()),
            Ok(_) => {}
            Err(e) => warn!("{} did not complete: {}", command, e),
        }

        let runner = self.runner(channel);
        let result = self.tracker.current_directory(&mut session, &runner).await;
        self.sync_status(&session);
        result
    }

    /// Forward new dimensions once requests stop arriving
    ///
    /// Only the newest request inside the debounce window reaches the
    /// channel.
    pub async fn resize_terminal_window(&self, cols: u16, rows: u16) -> Result<()> {
        if cols == 0 || rows == 0 {
            return Err(Error::PtyResizeFailed {
                cols,
                rows,
                reason: "dimensions must be greater than 0".to_string(),
            });
        }
        let channel = self.live_channel().ok_or(Error::SessionNotCreated)?;

        let generation = self.resize_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let latest = Arc::clone(&self.resize_generation);
        let debounce = self.config.protocol.resize_debounce();
        let emulator = Arc::clone(&self.emulator);

        tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            if latest.load(Ordering::SeqCst) != generation {
                return;
            }
            match channel.resize(cols, rows) {
                Ok(()) => {
                    emulator.resize(cols, rows);
                    debug!("Resized to {}x{}", cols, rows);
                }
                Err(e) => warn!("Resize to {}x{} failed: {}", cols, rows, e),
            }
        });
        Ok(())
    }

    /// Kill the shell and abort anything in flight
    pub async fn close_shell_session(&self) -> Result<()> {
        // Wakes a waiter holding the session lock
        self.detector.shutdown();
        let active = self.channel_mut().take();

        let mut session = self.session.lock().await;
        if let Some(active) = active {
            active.pump.abort();
            if let Err(e) = active.channel.kill() {
                warn!("Failed to kill shell: {}", e);
            }
            info!("Closed shell session {}", session.id);
        }
        session.set_state(SessionState::Closed);
        self.sync_status(&session);
        Ok(())
    }

    fn start_pump(&self, mut output: UnboundedReceiver<Vec<u8>>) -> JoinHandle<()> {
        let emulator = Arc::clone(&self.emulator);
        let detector = Arc::clone(&self.detector);
        let events = self.events.clone();

        tokio::spawn(async move {
            while let Some(chunk) = output.recv().await {
                // The emulator must hold the prompt before the waiter wakes
                emulator.feed(&chunk);
                detector.feed(&chunk);
                events.publish(SessionEvent::Output { data: chunk });
            }
            debug!("Shell output stream closed");
            detector.abort_pending();
            events.publish(SessionEvent::Exited);
        })
    }

    fn runner(&self, channel: Arc<dyn ByteChannel>) -> ProtocolRunner<'_> {
        ProtocolRunner {
            detector: &self.detector,
            channel,
            emulator: self.emulator.as_ref(),
            events: &self.events,
            settle_delay: self.config.protocol.settle_delay(),
        }
    }

    fn write_interrupt(&self) -> Result<()> {
        let channel = self.live_channel().ok_or(Error::SessionNotCreated)?;
        let profile = ShellProfile::for_shell(self.shell_type());
        debug!("Preempting running command");
        channel.write(&[profile.interrupt_byte])
    }

    fn channel_ref(&self) -> RwLockReadGuard<'_, Option<ActiveChannel>> {
        self.channel.read().unwrap_or_else(|e| e.into_inner())
    }

    fn channel_mut(&self) -> RwLockWriteGuard<'_, Option<ActiveChannel>> {
        self.channel.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Channel whose pump is still running
    fn live_channel(&self) -> Option<Arc<dyn ByteChannel>> {
        self.channel_ref()
            .as_ref()
            .filter(|active| !active.pump.is_finished())
            .map(|active| Arc::clone(&active.channel))
    }

    fn ready_channel(&self, session: &ShellSession) -> Result<Arc<dyn ByteChannel>> {
        match session.state() {
            SessionState::Ready => self.live_channel().ok_or(Error::SessionClosed),
            SessionState::Closed => Err(Error::SessionClosed),
            _ => Err(Error::SessionNotCreated),
        }
    }

    fn ready_channel_unlocked(&self) -> Result<Arc<dyn ByteChannel>> {
        match self.state() {
            SessionState::Ready => self.live_channel().ok_or(Error::SessionClosed),
            SessionState::Closed => Err(Error::SessionClosed),
            _ => Err(Error::SessionNotCreated),
        }
    }

    fn stop_channel(&self) {
        if let Some(active) = self.channel_mut().take() {
            debug!("Discarding previous shell channel");
            active.pump.abort();
            if let Err(e) = active.channel.kill() {
                debug!("Previous shell already gone: {}", e);
            }
        }
    }

    fn status(&self) -> RwLockReadGuard<'_, Status> {
        self.status.read().unwrap_or_else(|e| e.into_inner())
    }

    fn sync_status(&self, session: &ShellSession) {
        let mut status = self.status.write().unwrap_or_else(|e| e.into_inner());
        let changed = status.state != session.state();

        *status = Status {
            shell_type: session.shell_type,
            sentinel: session.sentinel().cloned(),
            state: session.state(),
            degraded: session.is_degraded(),
        };
        drop(status);

        if changed {
            self.events.publish(SessionEvent::StateChanged {
                state: session.state(),
            });
        }
    }
}

impl Drop for ShellSessionManager {
    fn drop(&mut self) {
        if let Some(active) = self.channel_mut().take() {
            active.pump.abort();
            let _ = active.channel.kill();
        }
    }
}
