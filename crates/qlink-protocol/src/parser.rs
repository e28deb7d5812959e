//! Inbound line classification.
//!
//! One line can carry several records: the controller occasionally packs
//! multiple `SW` press events into a single line, and reply tokens arrive
//! with or without the `#` echo marker. Classification is best-effort; a
//! line that matches nothing classifies to an empty set so the reader loop
//! can skip it and keep going.

use crate::address::{LoadAddress, SwitchAddress};
use regex::Regex;

/// Which token carried a switch reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchToken {
    Rgs,
    Vgs,
}

impl SwitchToken {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwitchToken::Rgs => "RGS",
            SwitchToken::Vgs => "VGS",
        }
    }
}

/// Which token carried a load reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadToken {
    Rlb,
    Rgb,
}

impl LoadToken {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadToken::Rlb => "RLB",
            LoadToken::Rgb => "RGB",
        }
    }
}

/// A typed record parsed from one controller line.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Addressed switch state reply. `value` is normalized to 0 or 1.
    Switch {
        addr: SwitchAddress,
        value: u8,
        token: SwitchToken,
        raw: String,
    },
    /// Addressed load level reply.
    Load {
        addr: LoadAddress,
        level: u8,
        fade: Option<f32>,
        token: LoadToken,
        raw: String,
    },
    /// A reply that is exactly `0` or `1`, attributed via the bare FIFO.
    Bare(u8),
    /// Unsolicited physical switch event.
    Push { addr: SwitchAddress, value: u8 },
}

/// Line classifier with pre-compiled patterns.
pub struct Parser {
    switch_re: Regex,
    rlb_re: Regex,
    rgb_re: Regex,
    push_re: Regex,
}

impl Parser {
    pub fn new() -> Self {
        Self {
            switch_re: Regex::new(
                r"^\s*(RGS|VGS)#?\s+(\d+)\s+(\d+)\s+(\d+)\s+(\d+)\s*$",
            )
            .unwrap(),
            rlb_re: Regex::new(
                r"^\s*RLB#?\s+(\d+)\s+(\d+)\s+(\d+)\s+(\d+)\s+(\d+)(?:\s+(\d+(?:\.\d+)?))?\s*$",
            )
            .unwrap(),
            rgb_re: Regex::new(r"^\s*RGB#?\s+(\d+)\s+(\d+)\s+(\d+)\s+(\d+)\s+(\d+)\s*$").unwrap(),
            // (?:^|\s) keeps the token from matching inside VSW echoes.
            push_re: Regex::new(r"(?:^|\s)SW\s+(\d+)\s+(\d+)\s+(\d+)\s+([01])\b").unwrap(),
        }
    }

    /// Classifies one framed line into zero or more typed records.
    pub fn parse_line(&self, line: &str) -> Vec<Reply> {
        let trimmed = line.trim();

        match trimmed {
            "0" => return vec![Reply::Bare(0)],
            "1" => return vec![Reply::Bare(1)],
            _ => {}
        }

        if let Some(caps) = self.switch_re.captures(trimmed) {
            let token = match &caps[1] {
                "RGS" => SwitchToken::Rgs,
                _ => SwitchToken::Vgs,
            };
            if let (Ok(m), Ok(s), Ok(b), Ok(v)) = (
                caps[2].parse::<u16>(),
                caps[3].parse::<u16>(),
                caps[4].parse::<u16>(),
                caps[5].parse::<i64>(),
            ) {
                return vec![Reply::Switch {
                    addr: SwitchAddress::new(m, s, b),
                    value: u8::from(v != 0),
                    token,
                    raw: trimmed.to_string(),
                }];
            }
            return Vec::new();
        }

        if let Some(caps) = self.rlb_re.captures(trimmed) {
            if let Some(reply) = Self::load_reply(&caps, LoadToken::Rlb, trimmed) {
                return vec![reply];
            }
            return Vec::new();
        }

        if let Some(caps) = self.rgb_re.captures(trimmed) {
            if let Some(reply) = Self::load_reply(&caps, LoadToken::Rgb, trimmed) {
                return vec![reply];
            }
            return Vec::new();
        }

        self.push_re
            .captures_iter(trimmed)
            .filter_map(|caps| {
                let m = caps[1].parse::<u16>().ok()?;
                let s = caps[2].parse::<u16>().ok()?;
                let b = caps[3].parse::<u16>().ok()?;
                let v = caps[4].parse::<u8>().ok()?;
                Some(Reply::Push {
                    addr: SwitchAddress::new(m, s, b),
                    value: v,
                })
            })
            .collect()
    }

    fn load_reply(caps: &regex::Captures<'_>, token: LoadToken, raw: &str) -> Option<Reply> {
        let m = caps[1].parse::<u16>().ok()?;
        let e = caps[2].parse::<u8>().ok()?;
        let module = caps[3].parse::<u8>().ok()?;
        let l = caps[4].parse::<u8>().ok()?;
        let level = caps[5].parse::<u8>().ok()?;
        if level > 100 {
            return None;
        }
        let fade = caps.get(6).and_then(|f| f.as_str().parse::<f32>().ok());
        let addr = LoadAddress::new(m, e, module, l).ok()?;
        Some(Reply::Load {
            addr,
            level,
            fade,
            token,
            raw: raw.to_string(),
        })
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}
