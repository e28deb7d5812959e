//! Switch and load addresses.
//!
//! A switch is addressed by `(master, station, button)`; a load by
//! `(master, enclosure, module, load)` where enclosure and module are 1..=4
//! and load is 1..=8. Both carry two canonical string forms: a display form
//! with `/` separators and a wire key with `-` separators.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Address of a physical switch button: `(master, station, button)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SwitchAddress {
    pub master: u16,
    pub station: u16,
    pub button: u16,
}

impl SwitchAddress {
    pub fn new(master: u16, station: u16, button: u16) -> Self {
        Self {
            master,
            station,
            button,
        }
    }

    /// Canonical key form used in maps and on the wire: `"m-s-b"`.
    pub fn key(&self) -> String {
        format!("{}-{}-{}", self.master, self.station, self.button)
    }
}

impl fmt::Display for SwitchAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.master, self.station, self.button)
    }
}

impl FromStr for SwitchAddress {
    type Err = ProtocolError;

    /// Parses `"m-s-b"` or `"m/s/b"`.
    fn from_str(s: &str) -> ProtocolResult<Self> {
        let parts: Vec<&str> = s.split(['-', '/']).collect();
        if parts.len() != 3 {
            return Err(ProtocolError::MalformedAddress(s.to_string()));
        }
        let nums: Vec<u16> = parts
            .iter()
            .map(|p| p.trim().parse::<u16>())
            .collect::<Result<_, _>>()
            .map_err(|_| ProtocolError::MalformedAddress(s.to_string()))?;
        Ok(Self::new(nums[0], nums[1], nums[2]))
    }
}

/// Address of a dimmable load: `(master, enclosure, module, load)`.
///
/// Constructed through [`LoadAddress::new`], which enforces the hardware
/// ranges: enclosure 1..=4, module 1..=4, load 1..=8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoadAddress {
    pub master: u16,
    pub enclosure: u8,
    pub module: u8,
    pub load: u8,
}

impl LoadAddress {
    pub fn new(master: u16, enclosure: u8, module: u8, load: u8) -> ProtocolResult<Self> {
        if !(1..=4).contains(&enclosure) {
            return Err(ProtocolError::InvalidAddress(format!(
                "enclosure {} out of range 1..=4",
                enclosure
            )));
        }
        if !(1..=4).contains(&module) {
            return Err(ProtocolError::InvalidAddress(format!(
                "module {} out of range 1..=4",
                module
            )));
        }
        if !(1..=8).contains(&load) {
            return Err(ProtocolError::InvalidAddress(format!(
                "load {} out of range 1..=8",
                load
            )));
        }
        Ok(Self {
            master,
            enclosure,
            module,
            load,
        })
    }

    /// Canonical key form: `"m-e-mod-l"`.
    pub fn key(&self) -> String {
        format!(
            "{}-{}-{}-{}",
            self.master, self.enclosure, self.module, self.load
        )
    }
}

impl fmt::Display for LoadAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.master, self.enclosure, self.module, self.load
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_switch_address_forms() {
        let sa = SwitchAddress::new(2, 20, 7);
        assert_eq!(sa.to_string(), "2/20/7");
        assert_eq!(sa.key(), "2-20-7");
    }

    #[test]
    fn test_switch_address_parse() {
        assert_eq!(
            "2-20-7".parse::<SwitchAddress>().unwrap(),
            SwitchAddress::new(2, 20, 7)
        );
        assert_eq!(
            "3/9/34".parse::<SwitchAddress>().unwrap(),
            SwitchAddress::new(3, 9, 34)
        );
        assert!("2-20".parse::<SwitchAddress>().is_err());
        assert!("a-b-c".parse::<SwitchAddress>().is_err());
    }

    #[test]
    fn test_switch_address_equality_by_component() {
        assert_eq!(SwitchAddress::new(1, 2, 3), SwitchAddress::new(1, 2, 3));
        assert_ne!(SwitchAddress::new(1, 2, 3), SwitchAddress::new(1, 2, 4));
    }

    #[test]
    fn test_load_address_ranges() {
        assert!(LoadAddress::new(3, 1, 1, 2).is_ok());
        assert!(LoadAddress::new(3, 4, 4, 8).is_ok());
        assert!(LoadAddress::new(3, 0, 1, 1).is_err());
        assert!(LoadAddress::new(3, 5, 1, 1).is_err());
        assert!(LoadAddress::new(3, 1, 0, 1).is_err());
        assert!(LoadAddress::new(3, 1, 1, 0).is_err());
        assert!(LoadAddress::new(3, 1, 1, 9).is_err());
    }

    #[test]
    fn test_load_address_key() {
        let la = LoadAddress::new(3, 1, 1, 2).unwrap();
        assert_eq!(la.key(), "3-1-1-2");
        assert_eq!(la.to_string(), "3/1/1/2");
    }
}
