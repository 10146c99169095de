//! PTY Process Spawning
//!
//! Spawns the interactive shell inside a pseudoterminal using the
//! portable-pty crate. Blocking PTY reads and writes live on dedicated
//! threads and are bridged to the async side through channels.

use async_trait::async_trait;
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::mpsc::{channel, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

use super::channel::{ByteChannel, ChannelSpawner, SpawnedChannel};
use crate::config::ShellConfig;
use crate::error::{Error, Result};

/// Spawns shells in native pseudoterminals
#[derive(Debug, Default, Clone)]
pub struct PtySpawner;

impl PtySpawner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ChannelSpawner for PtySpawner {
    async fn spawn(&self, config: &ShellConfig) -> Result<SpawnedChannel> {
        let program = config
            .program
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(get_user_shell);

        let (cols, rows) = config.dimensions;
        let pair = native_pty_system()
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| Error::PtyCreationFailed {
                command: program.clone(),
                reason: e.to_string(),
            })?;

        let mut cmd_builder = CommandBuilder::new(&program);
        cmd_builder.args(&config.args);

        // CommandBuilder starts from the parent environment
        cmd_builder.env_clear();
        for (key, value) in get_effective_environment(&config.environment, config.inherit_env) {
            cmd_builder.env(key, value);
        }

        if let Some(dir) = &config.working_directory {
            cmd_builder.cwd(dir);
        }

        let child = pair
            .slave
            .spawn_command(cmd_builder)
            .map_err(|e| Error::CommandSpawnFailed {
                command: program.clone(),
                reason: e.to_string(),
            })?;

        // The slave end belongs to the child now; keeping it open would hide EOF
        drop(pair.slave);

        info!(
            "Spawned shell '{}' (pid {:?}) at {}x{}",
            program,
            child.process_id(),
            cols,
            rows
        );

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| Error::PtyReaderCloneFailed {
                reason: e.to_string(),
            })?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| Error::PtyWriterTakeFailed {
                reason: e.to_string(),
            })?;

        let (tx_out, rx_out) = unbounded_channel::<Vec<u8>>();
        let (tx_in, rx_in) = channel::<Vec<u8>>();

        spawn_reader_thread(reader, tx_out);
        spawn_writer_thread(writer, rx_in);

        let channel = PtyChannel {
            input: Mutex::new(tx_in),
            master: Mutex::new(pair.master),
            child: Mutex::new(child),
        };

        Ok(SpawnedChannel {
            channel: Arc::new(channel),
            output: rx_out,
            program,
        })
    }
}

/// Byte channel backed by a PTY master
pub struct PtyChannel {
    input: Mutex<Sender<Vec<u8>>>,
    master: Mutex<Box<dyn MasterPty + Send>>,
    child: Mutex<Box<dyn Child + Send + Sync>>,
}

impl ByteChannel for PtyChannel {
    fn write(&self, data: &[u8]) -> Result<()> {
        let input = self.input.lock().map_err(|e| Error::PtyInputSendFailed {
            reason: e.to_string(),
        })?;
        input
            .send(data.to_vec())
            .map_err(|e| Error::PtyInputSendFailed {
                reason: e.to_string(),
            })
    }

    fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        let failed = |reason: String| Error::PtyResizeFailed { cols, rows, reason };
        let master = self.master.lock().map_err(|e| failed(e.to_string()))?;
        master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| failed(e.to_string()))
    }

    fn kill(&self) -> Result<()> {
        let mut child = self.child.lock().map_err(|e| Error::PtyKillFailed {
            reason: e.to_string(),
        })?;

        // Already exited: nothing to kill
        if let Ok(Some(status)) = child.try_wait() {
            debug!("Shell already exited with {:?}", status);
            return Ok(());
        }

        child.kill().map_err(|e| Error::PtyKillFailed {
            reason: e.to_string(),
        })
    }
}

/// Reader thread: read from PTY master and forward to async channel
fn spawn_reader_thread(mut reader: Box<dyn Read + Send>, tx: UnboundedSender<Vec<u8>>) {
    thread::spawn(move || {
        let mut buf = [0u8; 4096];
        let mut consecutive_errors = 0;
        const MAX_CONSECUTIVE_ERRORS: u32 = 5;

        loop {
            match reader.read(&mut buf) {
                Ok(0) => {
                    debug!("PTY read EOF - shell terminated");
                    break;
                }
                Ok(n) => {
                    consecutive_errors = 0;
                    if tx.send(buf[..n].to_vec()).is_err() {
                        debug!("PTY read: receiver dropped, stopping reader thread");
                        break;
                    }
                }
                Err(e) => {
                    if e.kind() == std::io::ErrorKind::Interrupted {
                        continue;
                    }

                    if e.kind() == std::io::ErrorKind::WouldBlock {
                        thread::sleep(std::time::Duration::from_millis(10));
                        continue;
                    }

                    consecutive_errors += 1;
                    warn!(
                        "PTY read error ({}): {} (attempt {}/{})",
                        e.kind(),
                        e,
                        consecutive_errors,
                        MAX_CONSECUTIVE_ERRORS
                    );

                    if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        error!("PTY read: too many consecutive errors, stopping reader thread");
                        break;
                    }

                    thread::sleep(std::time::Duration::from_millis(50));
                }
            }
        }
        debug!("PTY reader thread exiting");
    });
}

/// Writer thread: receive input and write it to the PTY master
fn spawn_writer_thread(mut writer: Box<dyn Write + Send>, rx: std::sync::mpsc::Receiver<Vec<u8>>) {
    thread::spawn(move || {
        let mut consecutive_errors = 0;
        const MAX_CONSECUTIVE_ERRORS: u32 = 3;

        while let Ok(data) = rx.recv() {
            let mut attempts = 0;
            const MAX_ATTEMPTS: u32 = 3;

            loop {
                match writer.write_all(&data) {
                    Ok(()) => {
                        consecutive_errors = 0;
                        if let Err(e) = writer.flush() {
                            debug!("PTY flush error: {}", e);
                        }
                        break;
                    }
                    Err(e) => {
                        attempts += 1;

                        if e.kind() == std::io::ErrorKind::Interrupted {
                            continue;
                        }

                        if e.kind() == std::io::ErrorKind::WouldBlock && attempts < MAX_ATTEMPTS {
                            thread::sleep(std::time::Duration::from_millis(10));
                            continue;
                        }

                        consecutive_errors += 1;
                        warn!(
                            "PTY write error ({}): {} (consecutive errors: {}/{})",
                            e.kind(),
                            e,
                            consecutive_errors,
                            MAX_CONSECUTIVE_ERRORS
                        );

                        if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                            error!("PTY write: too many consecutive errors, stopping writer thread");
                            return;
                        }

                        break;
                    }
                }
            }
        }
        debug!("PTY writer thread exiting");
    });
}

/// Get the default shell for the current platform
pub fn get_default_shell() -> String {
    if cfg!(windows) {
        "powershell.exe".to_string()
    } else if cfg!(target_os = "macos") {
        "/bin/zsh".to_string()
    } else {
        "/bin/bash".to_string()
    }
}

/// Get the current user's shell from environment
pub fn get_user_shell() -> String {
    std::env::var("SHELL")
        .ok()
        .filter(|shell| !shell.is_empty())
        .unwrap_or_else(get_default_shell)
}

/// Get effective environment for process spawning
pub fn get_effective_environment(
    custom_env: &HashMap<String, String>,
    inherit: bool,
) -> HashMap<String, String> {
    let mut env = if inherit {
        std::env::vars().collect()
    } else {
        HashMap::new()
    };

    for (key, value) in custom_env {
        env.insert(key.clone(), value.clone());
    }

    env
}
