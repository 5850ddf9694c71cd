//! Canonical MAC address representation.
//!
//! Gateways report MACs in several spellings: bare hex (`AC233FA04E21`),
//! colon-separated (`AC:23:3F:A0:4E:21`), and occasionally lowercase. Every
//! map in the engine is keyed by the canonical form -- colon-separated,
//! uppercase -- so the same physical device never occupies two slots.

use std::fmt;

use serde::Serialize;

/// A MAC address in canonical colon-separated uppercase form.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct MacAddr(String);

impl MacAddr {
    /// Canonicalize a raw MAC string.
    ///
    /// Uppercases the input; when it contains no separator, a `:` is
    /// inserted after every two characters. Input that already carries
    /// separators is kept intact (aside from case). The operation is
    /// idempotent: `canonicalize(canonicalize(x)) == canonicalize(x)`.
    pub fn canonicalize(raw: &str) -> Self {
        let trimmed = raw.trim().to_ascii_uppercase();

        if trimmed.contains(':') {
            return Self(trimmed);
        }

        let mut out = String::with_capacity(trimmed.len() + trimmed.len() / 2);
        for (i, c) in trimmed.chars().enumerate() {
            if i > 0 && i % 2 == 0 {
                out.push(':');
            }
            out.push(c);
        }
        Self(out)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
