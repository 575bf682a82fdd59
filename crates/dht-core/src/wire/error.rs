use thiserror::Error;

/// Decoding is strict: any malformed datagram is dropped and counted, never
/// logged above `debug` (spec §4.1, §7 "Protocol-semantic" class).
#[derive(Debug, Error)]
pub enum WireError {
    #[error("not a valid bencoded dictionary: {0}")]
    Bencode(#[from] serde_bencode::Error),
    #[error("unknown message type {0:?}")]
    UnknownMessageType(String),
    #[error("query is missing its method name")]
    MissingQueryMethod,
    #[error("unsupported query method {0:?}")]
    UnknownQueryMethod(String),
    #[error("query is missing required argument {0:?}")]
    MissingArgument(&'static str),
    #[error("response is missing its body")]
    MissingResponse,
    #[error("error message is missing its [code, message] pair")]
    MissingError,
    #[error("node id is not {expected} bytes")]
    BadId { expected: usize },
    #[error("announce_peer port {0} is out of range")]
    BadPort(i64),
}
