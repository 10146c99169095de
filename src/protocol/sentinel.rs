//! Sentinel Installation
//!
//! Makes the shell print a marker right after every prompt redraw so the
//! protocol can tell from the output stream alone that the shell is idle.
//! Each flavor is described by a `ShellProfile` row; adding a shell means
//! adding a row, the state machine never branches on the flavor.

use std::fmt::Write as _;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{SessionState, ShellSession, ShellType};
use crate::pty::channel::ByteChannel;
use crate::pty::events::{SessionEvent, SessionEventBus};
use crate::terminal::{PromptDetector, TerminalEmulator};

/// Control byte that asks the foreground job to stop
pub const INTERRUPT: u8 = 0x03;

const WORD_JOINER: char = '\u{2060}';
const ZERO_BIT: char = '\u{200B}';
const ONE_BIT: char = '\u{200C}';
const TERMINATOR: char = '\u{200D}';
const NONCE_BITS: u32 = 16;

/// Marker the shell emits after each prompt
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sentinel {
    text: String,
}

impl Sentinel {
    /// Fresh sentinel with a random per-session nonce
    pub fn generate(shell_type: ShellType) -> Self {
        let nonce = Uuid::new_v4().as_u128() as u32;
        Self::from_nonce(shell_type, nonce)
    }

    /// Sentinel for a fixed nonce
    ///
    /// POSIX shells get an invisible run of zero-width characters encoding
    /// the low 16 bits; PowerShell gets a visible `SB-xxxxxxxx ` prefix.
    pub fn from_nonce(shell_type: ShellType, nonce: u32) -> Self {
        let text = match shell_type {
            ShellType::PowerShell => format!("SB-{:08x} ", nonce),
            _ => {
                let mut text = String::with_capacity(NONCE_BITS as usize + 2);
                text.push(WORD_JOINER);
                for bit in (0..NONCE_BITS).rev() {
                    text.push(if (nonce >> bit) & 1 == 1 { ONE_BIT } else { ZERO_BIT });
                }
                text.push(TERMINATOR);
                text
            }
        };
        Self { text }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Remove every occurrence from `text`
    pub fn strip_from(&self, text: &str) -> String {
        text.replace(&self.text, "")
    }
}

impl std::fmt::Display for Sentinel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text.escape_unicode())
    }
}

/// Per-flavor recipe for talking to a shell
pub struct ShellProfile {
    /// Flavor this row describes
    pub shell_type: ShellType,
    /// Appended to every dispatched command
    pub line_terminator: &'static str,
    /// Prints the working directory on its own line
    pub pwd_command: &'static str,
    /// Byte written to interrupt the foreground job
    pub interrupt_byte: u8,
    install: Option<fn(&Sentinel) -> Vec<String>>,
    cd: fn(&str) -> String,
}

impl std::fmt::Debug for ShellProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellProfile")
            .field("shell_type", &self.shell_type)
            .field("line_terminator", &self.line_terminator)
            .field("pwd_command", &self.pwd_command)
            .field("can_install", &self.can_install())
            .finish()
    }
}

static PROFILES: [ShellProfile; 4] = [
    ShellProfile {
        shell_type: ShellType::Bash,
        line_terminator: "\n",
        pwd_command: "pwd",
        interrupt_byte: INTERRUPT,
        install: Some(bash_install),
        cd: posix_cd,
    },
    ShellProfile {
        shell_type: ShellType::Zsh,
        line_terminator: "\n",
        pwd_command: "pwd",
        interrupt_byte: INTERRUPT,
        install: Some(zsh_install),
        cd: posix_cd,
    },
    ShellProfile {
        shell_type: ShellType::Fish,
        line_terminator: "\n",
        pwd_command: "pwd",
        interrupt_byte: INTERRUPT,
        install: Some(fish_install),
        cd: fish_cd,
    },
    ShellProfile {
        shell_type: ShellType::PowerShell,
        line_terminator: "\r",
        pwd_command: "(Get-Location).Path",
        interrupt_byte: INTERRUPT,
        install: Some(powershell_install),
        cd: powershell_cd,
    },
];

/// Used for shells without a recipe: POSIX conventions, nothing to install
static FALLBACK: ShellProfile = ShellProfile {
    shell_type: ShellType::Unknown,
    line_terminator: "\n",
    pwd_command: "pwd",
    interrupt_byte: INTERRUPT,
    install: None,
    cd: posix_cd,
};

impl ShellProfile {
    /// Profile row for a flavor
    pub fn for_shell(shell_type: ShellType) -> &'static ShellProfile {
        PROFILES
            .iter()
            .find(|p| p.shell_type == shell_type)
            .unwrap_or(&FALLBACK)
    }

    /// Whether a sentinel can be installed
    pub fn can_install(&self) -> bool {
        self.install.is_some()
    }

    /// Lines that make the shell emit `sentinel` after each prompt
    ///
    /// None of them contains the sentinel literally, so their echo cannot be
    /// mistaken for a completed command.
    pub fn install_lines(&self, sentinel: &Sentinel) -> Vec<String> {
        self.install.map(|f| f(sentinel)).unwrap_or_default()
    }

    /// Command that changes directory to `path`, quoted for this shell
    pub fn cd_command(&self, path: &str) -> String {
        (self.cd)(path)
    }

    /// `command` with the line terminator appended
    pub fn terminate(&self, command: &str) -> String {
        format!("{}{}", command, self.line_terminator)
    }
}

/// `\NNN` octal escapes of the UTF-8 bytes, understood by bash and zsh `printf`
fn octal_escape(text: &str) -> String {
    text.bytes().fold(String::new(), |mut out, b| {
        let _ = write!(out, "\\{:03o}", b);
        out
    })
}

/// `\uXXXX` escapes, understood by fish `printf`
fn unicode_escape(text: &str) -> String {
    text.chars().fold(String::new(), |mut out, c| {
        let _ = write!(out, "\\u{:04x}", c as u32);
        out
    })
}

fn bash_install(sentinel: &Sentinel) -> Vec<String> {
    vec![
        "export BROWSER=true".to_string(),
        format!("PROMPT_COMMAND='printf \"{}\"'", octal_escape(sentinel.as_str())),
    ]
}

fn zsh_install(sentinel: &Sentinel) -> Vec<String> {
    vec![
        "export BROWSER=true".to_string(),
        format!(
            "__shellbridge_sentinel() {{ printf '{}' }}; precmd_functions+=(__shellbridge_sentinel)",
            octal_escape(sentinel.as_str())
        ),
    ]
}

fn fish_install(sentinel: &Sentinel) -> Vec<String> {
    vec![
        "set -gx BROWSER true".to_string(),
        format!(
            "function __shellbridge_sentinel --on-event fish_prompt; printf '{}'; end",
            unicode_escape(sentinel.as_str())
        ),
    ]
}

fn powershell_install(sentinel: &Sentinel) -> Vec<String> {
    let text = sentinel.as_str();
    let nonce = text
        .strip_prefix("SB-")
        .and_then(|rest| rest.strip_suffix(' '))
        .unwrap_or(text);
    vec![
        "$env:BROWSER = 'none'".to_string(),
        format!(
            "function prompt {{ ('SB-' + '{}' + ' ') + \"$(Get-Location)> \" }}",
            nonce
        ),
    ]
}

fn posix_cd(path: &str) -> String {
    format!("cd '{}'", path.replace('\'', r"'\''"))
}

fn fish_cd(path: &str) -> String {
    format!("cd '{}'", path.replace('\\', r"\\").replace('\'', r"\'"))
}

fn powershell_cd(path: &str) -> String {
    format!("Set-Location -LiteralPath '{}'", path.replace('\'', "''"))
}

/// Writes the install sequence for a session's flavor
pub struct SentinelInstaller<'a> {
    channel: &'a dyn ByteChannel,
    emulator: &'a dyn TerminalEmulator,
    events: &'a SessionEventBus,
    settle_delay: Duration,
}

impl<'a> SentinelInstaller<'a> {
    pub fn new(
        channel: &'a dyn ByteChannel,
        emulator: &'a dyn TerminalEmulator,
        events: &'a SessionEventBus,
        settle_delay: Duration,
    ) -> Self {
        Self {
            channel,
            emulator,
            events,
            settle_delay,
        }
    }

    /// Install (or reinstall) the session's sentinel
    ///
    /// Unsupported flavors are not an error: the session is marked degraded
    /// and a notice is published.
    pub async fn install(&self, session: &mut ShellSession) -> Result<()> {
        session.set_state(SessionState::Installing);
        self.events.publish(SessionEvent::StateChanged {
            state: SessionState::Installing,
        });

        let profile = ShellProfile::for_shell(session.shell_type);
        if !profile.can_install() {
            let err = Error::UnsupportedShell {
                program: session.program.clone().unwrap_or_default(),
            };
            warn!("{}", err);
            let guess = PromptDetector::new().detect_shell_type(&self.emulator.tail(5));
            if guess != ShellType::Unknown {
                info!("Prompt looks like {}, falling back to prompt matching", guess);
            }
            session.mark_degraded();
            self.events.notice(err.to_string());
            return Ok(());
        }

        let sentinel = match session.sentinel() {
            Some(sentinel) => sentinel.clone(),
            None => {
                let sentinel = Sentinel::generate(session.shell_type);
                session.set_sentinel(sentinel.clone())?;
                sentinel
            }
        };

        debug!(
            "Installing sentinel {} for {} session {}",
            sentinel, session.shell_type, session.id
        );
        for line in profile.install_lines(&sentinel) {
            self.channel.write(profile.terminate(&line).as_bytes())?;
        }

        tokio::time::sleep(self.settle_delay).await;
        self.emulator.clear();
        Ok(())
    }
}
