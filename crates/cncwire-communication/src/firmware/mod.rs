//! Firmware dialects
//!
//! Each dialect contributes an ordered chain of [`LineRule`]s. The
//! [`ParserFacade`] runs a chain over inbound lines and always yields a
//! [`ParseResult`](cncwire_core::ParseResult).

pub mod cirqoid;
pub mod grbl;
mod parser;

pub use parser::{LineRule, ParserFacade};
pub(crate) use parser::{line_regex, number};

use cncwire_core::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Controller firmware dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Grbl 0.9 / 1.1
    #[default]
    Grbl,
    /// Cirqoid (Marlin-style text protocol)
    Cirqoid,
}

impl Dialect {
    /// Build the parser chain for this dialect
    pub fn parser(&self) -> ParserFacade {
        match self {
            Dialect::Grbl => grbl::parser(),
            Dialect::Cirqoid => cirqoid::parser(),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Grbl => write!(f, "grbl"),
            Dialect::Cirqoid => write!(f, "cirqoid"),
        }
    }
}

impl FromStr for Dialect {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grbl" => Ok(Dialect::Grbl),
            "cirqoid" => Ok(Dialect::Cirqoid),
            _ => Err(ProtocolError::UnsupportedDialect {
                dialect: s.to_string(),
            }),
        }
    }
}
