//! Command-level errors. Each one becomes an error reply; none closes the
//! connection.

use crate::protocol::RespValue;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Invalid command")]
    UnknownCommand,

    #[error("ERR empty command")]
    EmptyCommand,

    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(&'static str),

    /// INCR/DECR against a value that does not hold an integer
    #[error("ERR value is not an integer")]
    NotAnInteger,

    /// A numeric command argument failed to parse
    #[error("ERR value is not an integer or out of range")]
    InvalidNumber,

    #[error("ERR increment or decrement would overflow")]
    Overflow,

    #[error("WRONGTYPE existing value is not a list")]
    WrongType,

    #[error("ERR syntax error")]
    Syntax,

    #[error("ERR snapshot failed: {0}")]
    Snapshot(String),
}

impl From<CommandError> for RespValue {
    fn from(err: CommandError) -> Self {
        RespValue::Error(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_replies() {
        assert_eq!(
            RespValue::from(CommandError::UnknownCommand).serialize(),
            b"-Invalid command\r\n"
        );
        assert_eq!(
            RespValue::from(CommandError::WrongArity("get")),
            RespValue::error("ERR wrong number of arguments for 'get' command")
        );
    }
}
