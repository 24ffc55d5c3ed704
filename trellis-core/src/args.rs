//! Event argument bundles.
//!
//! Every posted event carries an ordered sequence of dynamically-typed
//! values. The engine never inspects them; they are handed verbatim to
//! entry callbacks, transition actions, and guards.

/// One dynamically-typed argument value.
///
/// The set is deliberately small: richer payloads belong in client state,
/// not in the event stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
}

/// Ordered argument sequence attached to a posted event.
pub type ArgList = Vec<ArgValue>;

impl ArgValue {
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ArgValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ArgValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            ArgValue::UInt(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ArgValue::Float(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::Str(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ArgValue::Bytes(value) => Some(value),
            _ => None,
        }
    }
}

impl From<bool> for ArgValue {
    fn from(value: bool) -> Self {
        ArgValue::Bool(value)
    }
}

impl From<i32> for ArgValue {
    fn from(value: i32) -> Self {
        ArgValue::Int(i64::from(value))
    }
}

impl From<i64> for ArgValue {
    fn from(value: i64) -> Self {
        ArgValue::Int(value)
    }
}

impl From<u32> for ArgValue {
    fn from(value: u32) -> Self {
        ArgValue::UInt(u64::from(value))
    }
}

impl From<u64> for ArgValue {
    fn from(value: u64) -> Self {
        ArgValue::UInt(value)
    }
}

impl From<f64> for ArgValue {
    fn from(value: f64) -> Self {
        ArgValue::Float(value)
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        ArgValue::Str(value.to_owned())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        ArgValue::Str(value)
    }
}

impl From<Vec<u8>> for ArgValue {
    fn from(value: Vec<u8>) -> Self {
        ArgValue::Bytes(value)
    }
}

/// Builds an [`ArgList`] from a comma-separated list of values, each of
/// which must convert into [`ArgValue`].
///
/// ```rust
/// use trellis_core::args;
///
/// let empty = args![];
/// let mixed = args![1, "resume", true];
/// assert!(empty.is_empty());
/// assert_eq!(mixed.len(), 3);
/// ```
#[macro_export]
macro_rules! args {
    () => {
        $crate::args::ArgList::new()
    };
    ($($value:expr),+ $(,)?) => {
        vec![$($crate::args::ArgValue::from($value)),+]
    };
}
