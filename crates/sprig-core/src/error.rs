use std::any::Any;

use thiserror::Error;

use crate::part::PartKind;
use crate::tree::HostError;
use crate::value::Key;

#[derive(Debug, Error)]
pub enum Error {
    /// A binding received a value outside the shape it accepts.
    #[error("{binding} binding expects {expected}")]
    ValueShape {
        binding: &'static str,
        expected: &'static str,
    },
    #[error("directive `{directive}` cannot be bound to a {part} part")]
    PartMismatch {
        directive: &'static str,
        part: PartKind,
    },
    /// Two items of one list snapshot produced the same key. The list keeps
    /// its previous state.
    #[error("duplicate key {0:?} in list")]
    DuplicateKey(Key),
    #[error(transparent)]
    Host(#[from] HostError),
    #[error("block was removed while its update was pending")]
    BlockMissing,
    #[error("task panicked: {0}")]
    Panicked(String),
    #[error("task was dropped before it ran")]
    Canceled,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else {
            "Unknown panic".to_string()
        };
        Error::Panicked(message)
    }
}
