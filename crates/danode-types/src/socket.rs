use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Network address an operator advertises on chain.
///
/// Encoded as `host:dispersal_port;retrieval_port`, which is the form stored
/// in the on-chain registry and compared by the socket watchers.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OperatorSocket {
    host: String,
    dispersal_port: u16,
    retrieval_port: u16,
}

impl OperatorSocket {
    pub fn new(host: impl Into<String>, dispersal_port: u16, retrieval_port: u16) -> Self {
        Self {
            host: host.into(),
            dispersal_port,
            retrieval_port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn dispersal_port(&self) -> u16 {
        self.dispersal_port
    }

    pub fn retrieval_port(&self) -> u16 {
        self.retrieval_port
    }

    /// `host:dispersal_port`
    pub fn dispersal_address(&self) -> String {
        format!("{}:{}", self.host, self.dispersal_port)
    }

    /// `host:retrieval_port`
    pub fn retrieval_address(&self) -> String {
        format!("{}:{}", self.host, self.retrieval_port)
    }
}

impl fmt::Display for OperatorSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{};{}",
            self.host, self.dispersal_port, self.retrieval_port
        )
    }
}

impl FromStr for OperatorSocket {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| TypeError::InvalidSocket {
            socket: s.to_string(),
            reason: reason.to_string(),
        };
        let (address, retrieval) = s
            .split_once(';')
            .ok_or_else(|| invalid("missing ';' before retrieval port"))?;
        let (host, dispersal) = address
            .rsplit_once(':')
            .ok_or_else(|| invalid("missing ':' before dispersal port"))?;
        if host.is_empty() {
            return Err(invalid("empty host"));
        }
        let dispersal_port = dispersal
            .parse()
            .map_err(|_| invalid("invalid dispersal port"))?;
        let retrieval_port = retrieval
            .parse()
            .map_err(|_| invalid("invalid retrieval port"))?;
        Ok(Self::new(host, dispersal_port, retrieval_port))
    }
}

impl TryFrom<String> for OperatorSocket {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OperatorSocket> for String {
    fn from(socket: OperatorSocket) -> Self {
        socket.to_string()
    }
}
