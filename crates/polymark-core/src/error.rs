use thiserror::Error;

/// Errors the parser reports on its return channel. Malformed input is
/// never an error: a construct that fails to close is re-read as plain
/// text, so any byte sequence yields a tree.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
pub enum ParseError {
    #[error("maximum parse depth {0} exceeded")]
    DepthExceeded(usize),
}
