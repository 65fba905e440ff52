// SPDX-License-Identifier: Apache-2.0

//! A validated Linux network interface name.

use std::convert::TryFrom;

const MAX_LEN: usize = 15;

/// A string checked to be a legal Linux network interface name: alphanumeric
/// ASCII plus `.`, `-`, `_`, at most 15 characters (16 including the kernel's
/// trailing NUL).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InterfaceName(String);

impl InterfaceName {
    pub const MAX_LEN: usize = MAX_LEN;
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, thiserror::Error)]
pub enum IllegalInterfaceName {
    #[error("interface name {0:?} is longer than {MAX_LEN} characters")]
    TooLong(String),
    #[error("interface name {0:?} is not ascii")]
    NotAscii(String),
    #[error("interface name {0:?} contains illegal characters (only alphanumeric ASCII and .-_ are permitted)")]
    IllegalCharacters(String),
    #[error("interface name must not be empty")]
    Empty,
}

impl TryFrom<String> for InterfaceName {
    type Error = IllegalInterfaceName;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        const LEGAL_PUNCT: [char; 3] = ['.', '-', '_'];
        if value.is_empty() {
            return Err(IllegalInterfaceName::Empty);
        }
        if !value.is_ascii() {
            return Err(IllegalInterfaceName::NotAscii(value));
        }
        if value.len() > MAX_LEN {
            return Err(IllegalInterfaceName::TooLong(value));
        }
        if value.chars().any(|c| !c.is_ascii_alphanumeric() && !LEGAL_PUNCT.contains(&c)) {
            return Err(IllegalInterfaceName::IllegalCharacters(value));
        }
        Ok(InterfaceName(value))
    }
}

impl TryFrom<&str> for InterfaceName {
    type Error = IllegalInterfaceName;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        InterfaceName::try_from(value.to_string())
    }
}

impl From<InterfaceName> for String {
    fn from(value: InterfaceName) -> Self {
        value.0
    }
}

impl AsRef<str> for InterfaceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InterfaceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
