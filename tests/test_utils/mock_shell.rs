//! Scripted Shell for Testing
//!
//! Behaves like an interactive bash on a PTY: it echoes typed lines, prints
//! a prompt after each command and, once the `PROMPT_COMMAND` install line
//! arrives, prefixes every prompt with the sentinel it decodes from it.

use async_trait::async_trait;
use shellbridge::config::ShellConfig;
use shellbridge::error::{Error, Result};
use shellbridge::pty::{ByteChannel, ChannelSpawner, SpawnedChannel};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::{self, UnboundedSender};

/// Knobs for a scripted shell
#[derive(Debug, Clone)]
pub struct MockShellOptions {
    /// Program name reported to the session
    pub program: String,
    /// Initial working directory
    pub cwd: PathBuf,
    /// Echo typed lines the way readline wraps them at this width
    pub wrap_columns: Option<usize>,
}

impl Default for MockShellOptions {
    fn default() -> Self {
        Self {
            program: "/bin/bash".to_string(),
            cwd: std::env::temp_dir(),
            wrap_columns: None,
        }
    }
}

/// Visible width of the `$ ` prompt; the sentinel takes no columns
const PROMPT_WIDTH: usize = 2;

#[derive(Debug, Default)]
struct MockState {
    line: String,
    cwd: PathBuf,
    sentinel: Option<String>,
    /// A foreground job is running; only an interrupt ends it
    hung: bool,
    /// Number of upcoming `pwd` invocations that hang
    pwd_hangs: usize,
    lines: Vec<String>,
    interrupts: usize,
    resizes: Vec<(u16, u16)>,
    killed: bool,
}

/// One scripted shell process
pub struct MockShell {
    output: Mutex<Option<UnboundedSender<Vec<u8>>>>,
    state: Mutex<MockState>,
    wrap_columns: Option<usize>,
}

impl MockShell {
    pub fn new(output: UnboundedSender<Vec<u8>>, options: &MockShellOptions) -> Self {
        let shell = Self {
            output: Mutex::new(Some(output)),
            state: Mutex::new(MockState {
                cwd: options.cwd.clone(),
                ..MockState::default()
            }),
            wrap_columns: options.wrap_columns,
        };
        shell.emit("Welcome to the mock shell\r\n$ ");
        shell
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Lines the shell received, in order
    pub fn lines(&self) -> Vec<String> {
        self.state().lines.clone()
    }

    pub fn interrupts(&self) -> usize {
        self.state().interrupts
    }

    pub fn resizes(&self) -> Vec<(u16, u16)> {
        self.state().resizes.clone()
    }

    pub fn is_killed(&self) -> bool {
        self.state().killed
    }

    pub fn cwd(&self) -> PathBuf {
        self.state().cwd.clone()
    }

    pub fn sentinel(&self) -> Option<String> {
        self.state().sentinel.clone()
    }

    /// Make the next `count` `pwd` invocations hang until interrupted
    pub fn hang_pwd(&self, count: usize) {
        self.state().pwd_hangs = count;
    }

    /// Close the output stream as if the shell exited
    pub fn exit(&self) {
        self.output.lock().unwrap().take();
    }

    /// Push raw bytes to the output stream
    pub fn emit(&self, text: &str) {
        if let Some(tx) = self.output.lock().unwrap().as_ref() {
            let _ = tx.send(text.as_bytes().to_vec());
        }
    }

    fn prompt(state: &MockState) -> String {
        format!("{}$ ", state.sentinel.as_deref().unwrap_or(""))
    }

    /// Echo of a typed line, with readline's ` \r` at the right margin
    fn echo(&self, line: &str) -> String {
        let Some(columns) = self.wrap_columns else {
            return format!("{}\r\n", line);
        };
        let mut out = String::new();
        let mut col = PROMPT_WIDTH;
        for c in line.chars() {
            out.push(c);
            col += 1;
            if col == columns {
                out.push_str(" \r");
                col = 0;
            }
        }
        out.push_str("\r\n");
        out
    }

    fn interrupt(&self) {
        let reply = {
            let mut state = self.state();
            state.interrupts += 1;
            state.hung = false;
            state.line.clear();
            format!("^C\r\n{}", Self::prompt(&state))
        };
        self.emit(&reply);
    }

    fn run_line(&self, line: &str) {
        let mut state = self.state();
        state.lines.push(line.to_string());
        if state.hung {
            return;
        }

        let mut out = self.echo(line);
        let command = line.trim();
        let (program, arg) = command.split_once(' ').unwrap_or((command, ""));

        match program {
            "" => {}
            "export" | "true" => {}
            "exit" => {
                drop(state);
                self.emit(&out);
                self.exit();
                return;
            }
            "echo" => out.push_str(&format!("{}\r\n", arg)),
            "printf" => out.push_str(arg),
            "pwd" if state.pwd_hangs > 0 => {
                state.pwd_hangs -= 1;
                state.hung = true;
            }
            "pwd" => out.push_str(&format!("{}\r\n", state.cwd.display())),
            "cd" => {
                let target = PathBuf::from(unquote(arg));
                let target = if target.is_absolute() {
                    target
                } else {
                    state.cwd.join(target)
                };
                if target.is_dir() {
                    state.cwd = target;
                } else {
                    out.push_str(&format!("bash: cd: {}: No such file or directory\r\n", arg));
                }
            }
            "ls" => out.push_str("\x1b[1;34malpha\x1b[0m  beta.txt\r\ngamma.rs\r\n"),
            "seq" => {
                let count: usize = arg.parse().unwrap_or(0);
                for i in 1..=count {
                    out.push_str(&format!("{}\r\n", i));
                }
            }
            "sleep" => state.hung = true,
            _ if command.starts_with("PROMPT_COMMAND=") => {
                state.sentinel = decode_octal(command);
            }
            _ => out.push_str(&format!("bash: {}: command not found\r\n", program)),
        }

        if !state.hung {
            out.push_str(&Self::prompt(&state));
        }
        drop(state);
        self.emit(&out);
    }
}

impl ByteChannel for MockShell {
    fn write(&self, data: &[u8]) -> Result<()> {
        if self.state().killed {
            return Err(Error::PtyInputSendFailed {
                reason: "shell killed".to_string(),
            });
        }

        for &byte in data {
            match byte {
                0x03 => self.interrupt(),
                b'\n' | b'\r' => {
                    let line = std::mem::take(&mut self.state().line);
                    self.run_line(&line);
                }
                _ => self.state().line.push(byte as char),
            }
        }
        Ok(())
    }

    fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        self.state().resizes.push((cols, rows));
        Ok(())
    }

    fn kill(&self) -> Result<()> {
        self.state().killed = true;
        self.exit();
        Ok(())
    }
}

/// `'a b'` to `a b`
fn unquote(arg: &str) -> String {
    arg.trim()
        .trim_matches('\'')
        .replace(r"'\''", "'")
}

/// The sentinel encoded in a bash install line as `\NNN` escapes
fn decode_octal(line: &str) -> Option<String> {
    let start = line.find('\\')?;
    let escaped = &line[start..line.rfind('"')?];
    let bytes: Option<Vec<u8>> = escaped
        .split('\\')
        .filter(|part| !part.is_empty())
        .map(|part| u8::from_str_radix(part, 8).ok())
        .collect();
    String::from_utf8(bytes?).ok()
}

/// Spawner handing out scripted shells
#[derive(Default)]
pub struct MockSpawner {
    options: MockShellOptions,
    shells: Mutex<Vec<Arc<MockShell>>>,
}

impl MockSpawner {
    pub fn new(options: MockShellOptions) -> Self {
        Self {
            options,
            shells: Mutex::new(Vec::new()),
        }
    }

    /// Number of shells spawned so far
    pub fn spawn_count(&self) -> usize {
        self.shells.lock().unwrap().len()
    }

    /// The most recently spawned shell
    pub fn shell(&self) -> Arc<MockShell> {
        Arc::clone(self.shells.lock().unwrap().last().expect("no shell spawned"))
    }
}

#[async_trait]
impl ChannelSpawner for MockSpawner {
    async fn spawn(&self, _config: &ShellConfig) -> Result<SpawnedChannel> {
        let (tx, rx) = mpsc::unbounded_channel();
        let shell = Arc::new(MockShell::new(tx, &self.options));
        self.shells.lock().unwrap().push(Arc::clone(&shell));

        Ok(SpawnedChannel {
            channel: shell,
            output: rx,
            program: self.options.program.clone(),
        })
    }
}
