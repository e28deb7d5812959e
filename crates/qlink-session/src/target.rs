//! Controller connection targets.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A configured controller endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectTarget {
    /// Human-readable name shown in status output.
    pub name: String,
    pub host: String,
    pub port: u16,
}

impl ConnectTarget {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ConnectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.addr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addr_and_display() {
        let t = ConnectTarget {
            name: "main".to_string(),
            host: "10.0.0.5".to_string(),
            port: 3040,
        };
        assert_eq!(t.addr(), "10.0.0.5:3040");
        assert_eq!(t.to_string(), "main (10.0.0.5:3040)");
    }

    #[test]
    fn test_serde_roundtrip() {
        let t = ConnectTarget {
            name: "main".to_string(),
            host: "127.0.0.1".to_string(),
            port: 3040,
        };
        let json = serde_json::to_string(&t).unwrap();
        let back: ConnectTarget = serde_json::from_str(&json).unwrap();
        assert_eq!(back, t);
    }
}
