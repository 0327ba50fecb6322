//! Line protocol spoken between ring nodes.
//!
//! Every exchange is one request line answered by at most one response line:
//!
//! | request              | response                        |
//! |----------------------|---------------------------------|
//! | `CLOSEST_<id>`       | `MYCLOSEST_<ip:port>`           |
//! | `YOURSUCC`           | `MYSUCC_<ip:port>` or `NOTHING` |
//! | `FINDPRE`            | `PRERES_<ip:port>` or `NOTHING` |
//! | `FINDSUCC_<id>`      | `FOUNDSUCC_<ip:port>`           |
//! | `PREFOUND_<ip:port>` | `NOTIFIED`                      |
//! | `KEEP`               | `ALIVE`                         |

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use thiserror::Error;

use crate::identifier::RingId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("empty line")]
    Empty,
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
    #[error("{0} requires an argument")]
    MissingArgument(&'static str),
    #[error("{0} takes no argument")]
    UnexpectedArgument(&'static str),
    #[error("invalid identifier {0:?}")]
    InvalidId(String),
    #[error("invalid address {0:?}")]
    InvalidAddress(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    // Closest preceding finger for an identifier
    Closest(RingId),
    // Who is your successor
    YourSuccessor,
    // Who is your predecessor
    FindPredecessor,
    // Resolve the node responsible for an identifier
    FindSuccessor(RingId),
    // The sender believes it is the receiver's predecessor
    PredecessorFound(SocketAddr),
    // Liveness probe
    Keep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    MyClosest(SocketAddr),
    MySuccessor(SocketAddr),
    PredecessorResult(SocketAddr),
    FoundSuccessor(SocketAddr),
    // The asked node has nothing to report and stands for itself
    Nothing,
    Notified,
    Alive,
}

impl Response {
    /// Address carried by the response, if any.
    pub fn address(&self) -> Option<SocketAddr> {
        match *self {
            Response::MyClosest(address)
            | Response::MySuccessor(address)
            | Response::PredecessorResult(address)
            | Response::FoundSuccessor(address) => Some(address),
            Response::Nothing | Response::Notified | Response::Alive => None,
        }
    }
}

impl Request {
    /// Whether `response` is a valid answer to this request.
    pub fn accepts(&self, response: &Response) -> bool {
        matches!(
            (self, response),
            (Request::Closest(_), Response::MyClosest(_))
                | (Request::YourSuccessor, Response::MySuccessor(_) | Response::Nothing)
                | (Request::FindPredecessor, Response::PredecessorResult(_) | Response::Nothing)
                | (Request::FindSuccessor(_), Response::FoundSuccessor(_))
                | (Request::PredecessorFound(_), Response::Notified)
                | (Request::Keep, Response::Alive)
        )
    }
}

/// Decodes `ip:port`, tolerating a `/` (or `host/`) in front of the ip.
pub fn parse_address(text: &str) -> Result<SocketAddr, ProtocolError> {
    let trimmed = text.trim();
    let ip_and_port = trimmed.rsplit('/').next().unwrap_or(trimmed);
    ip_and_port
        .parse()
        .map_err(|_| ProtocolError::InvalidAddress(text.to_string()))
}

fn parse_id(text: &str) -> Result<RingId, ProtocolError> {
    text.trim()
        .parse()
        .map_err(|_| ProtocolError::InvalidId(text.to_string()))
}

// Splits `KEYWORD_argument` into its keyword and optional argument.
fn split_line(line: &str) -> Result<(&str, Option<&str>), ProtocolError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ProtocolError::Empty);
    }
    Ok(match line.split_once('_') {
        Some((keyword, argument)) => (keyword, Some(argument)),
        None => (line, None),
    })
}

fn required<'a>(keyword: &'static str, argument: Option<&'a str>) -> Result<&'a str, ProtocolError> {
    argument
        .filter(|a| !a.trim().is_empty())
        .ok_or(ProtocolError::MissingArgument(keyword))
}

fn none(keyword: &'static str, argument: Option<&str>) -> Result<(), ProtocolError> {
    match argument {
        Some(_) => Err(ProtocolError::UnexpectedArgument(keyword)),
        None => Ok(()),
    }
}

impl FromStr for Request {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let (keyword, argument) = split_line(line)?;
        match keyword {
            "CLOSEST" => Ok(Request::Closest(parse_id(required("CLOSEST", argument)?)?)),
            "YOURSUCC" => none("YOURSUCC", argument).map(|_| Request::YourSuccessor),
            "FINDPRE" => none("FINDPRE", argument).map(|_| Request::FindPredecessor),
            "FINDSUCC" => Ok(Request::FindSuccessor(parse_id(required("FINDSUCC", argument)?)?)),
            "PREFOUND" => Ok(Request::PredecessorFound(parse_address(required(
                "PREFOUND", argument,
            )?)?)),
            "KEEP" => none("KEEP", argument).map(|_| Request::Keep),
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Closest(id) => write!(f, "CLOSEST_{}", id),
            Request::YourSuccessor => f.write_str("YOURSUCC"),
            Request::FindPredecessor => f.write_str("FINDPRE"),
            Request::FindSuccessor(id) => write!(f, "FINDSUCC_{}", id),
            Request::PredecessorFound(address) => write!(f, "PREFOUND_{}", address),
            Request::Keep => f.write_str("KEEP"),
        }
    }
}

impl FromStr for Response {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let (keyword, argument) = split_line(line)?;
        match keyword {
            "MYCLOSEST" => Ok(Response::MyClosest(parse_address(required("MYCLOSEST", argument)?)?)),
            "MYSUCC" => Ok(Response::MySuccessor(parse_address(required("MYSUCC", argument)?)?)),
            "PRERES" => Ok(Response::PredecessorResult(parse_address(required(
                "PRERES", argument,
            )?)?)),
            "FOUNDSUCC" => Ok(Response::FoundSuccessor(parse_address(required(
                "FOUNDSUCC", argument,
            )?)?)),
            "NOTHING" => none("NOTHING", argument).map(|_| Response::Nothing),
            "NOTIFIED" => none("NOTIFIED", argument).map(|_| Response::Notified),
            "ALIVE" => none("ALIVE", argument).map(|_| Response::Alive),
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::MyClosest(address) => write!(f, "MYCLOSEST_{}", address),
            Response::MySuccessor(address) => write!(f, "MYSUCC_{}", address),
            Response::PredecessorResult(address) => write!(f, "PRERES_{}", address),
            Response::FoundSuccessor(address) => write!(f, "FOUNDSUCC_{}", address),
            Response::Nothing => f.write_str("NOTHING"),
            Response::Notified => f.write_str("NOTIFIED"),
            Response::Alive => f.write_str("ALIVE"),
        }
    }
}
