//! Outbound command formatting.
//!
//! Commands are short ASCII lines terminated by the configured line ending.
//! The `#` suffix on query commands asks the controller to echo the address
//! back in its reply, which is what makes reply matching possible.

use crate::address::{LoadAddress, SwitchAddress};
use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Handshake written once after connect, unless overridden in config.
pub const DEFAULT_HANDSHAKE: &str = "VCL 1 0\r\n";

/// Line terminator for outbound commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineEnding {
    /// `\r\n` (default).
    #[default]
    CrLf,
    /// `\r` only; some controller firmware revisions require this.
    Cr,
}

impl LineEnding {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineEnding::CrLf => "\r\n",
            LineEnding::Cr => "\r",
        }
    }
}

/// A command addressed to the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `VGS# m s b`: read the state of a switch.
    SwitchRead(SwitchAddress),
    /// `VSW m s b v`: press or release a switch.
    SwitchWrite(SwitchAddress, u8),
    /// `VLB# m e mod l level [fade]`: set a load level, optionally fading.
    LoadSet {
        addr: LoadAddress,
        level: u8,
        fade: Option<f32>,
    },
    /// `VGB# m e mod l`: read a load level.
    LoadRead(LoadAddress),
    /// An arbitrary line passed through untouched.
    Raw(String),
}

impl Command {
    /// Validates parameters and renders the command line without terminator.
    pub fn render(&self) -> ProtocolResult<String> {
        match self {
            Command::SwitchRead(sa) => {
                Ok(format!("VGS# {} {} {}", sa.master, sa.station, sa.button))
            }
            Command::SwitchWrite(sa, v) => {
                if *v > 1 {
                    return Err(ProtocolError::InvalidParameter(format!(
                        "switch state {} not in {{0,1}}",
                        v
                    )));
                }
                Ok(format!("VSW {} {} {} {}", sa.master, sa.station, sa.button, v))
            }
            Command::LoadSet { addr, level, fade } => {
                if *level > 100 {
                    return Err(ProtocolError::InvalidParameter(format!(
                        "level {} not in 0..=100",
                        level
                    )));
                }
                if let Some(f) = fade {
                    if !(0.0..=6553.0).contains(f) {
                        return Err(ProtocolError::InvalidParameter(format!(
                            "fade {} not in 0..=6553",
                            f
                        )));
                    }
                }
                let base = format!(
                    "VLB# {} {} {} {} {}",
                    addr.master, addr.enclosure, addr.module, addr.load, level
                );
                Ok(match fade {
                    Some(f) => format!("{} {}", base, format_fade(*f)),
                    None => base,
                })
            }
            Command::LoadRead(la) => Ok(format!(
                "VGB# {} {} {} {}",
                la.master, la.enclosure, la.module, la.load
            )),
            Command::Raw(line) => Ok(line.clone()),
        }
    }

    /// Renders the command and appends the line terminator.
    pub fn encode(&self, ending: LineEnding) -> ProtocolResult<Vec<u8>> {
        let mut line = self.render()?;
        line.push_str(ending.as_str());
        Ok(line.into_bytes())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.render() {
            Ok(line) => write!(f, "{}", line),
            Err(_) => write!(f, "<invalid command>"),
        }
    }
}

/// Whole-second fades print as integers; the controller rejects "3.0".
fn format_fade(fade: f32) -> String {
    if fade.fract() == 0.0 {
        format!("{}", fade as u32)
    } else {
        format!("{}", fade)
    }
}
