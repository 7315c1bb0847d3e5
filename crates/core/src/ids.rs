use serde::{Deserialize, Serialize};
use std::fmt;

const MAX_ROWID: u64 = i64::MAX as u64;

/// Store-assigned record identifiers. Callers receive them from `add` and never mint their own.
macro_rules! record_id {
    ($name:ident) => {
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "u64", into = "u64")]
        pub struct $name(u64);

        impl $name {
            /// Unchecked; ids built this way go through [`Self::check`] before a write.
            pub fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            pub fn get(&self) -> u64 {
                self.0
            }

            /// Fails unless the id fits a SQLite rowid.
            pub fn check(&self) -> Result<(), crate::CoreError> {
                if self.0 > MAX_ROWID {
                    return Err(crate::CoreError::InvalidData(format!(
                        "{} out of range: {}",
                        stringify!($name),
                        self.0
                    )));
                }
                Ok(())
            }

            /// SQLite rowids are signed. Callers check the id first.
            pub fn as_i64(&self) -> i64 {
                i64::try_from(self.0).unwrap_or(i64::MAX)
            }

            pub fn from_i64(raw: i64) -> Result<Self, crate::CoreError> {
                u64::try_from(raw).map(Self).map_err(|_| {
                    crate::CoreError::InvalidData(format!(
                        "negative {}: {raw}",
                        stringify!($name)
                    ))
                })
            }
        }

        impl TryFrom<u64> for $name {
            type Error = crate::CoreError;

            fn try_from(raw: u64) -> Result<Self, Self::Error> {
                let id = Self(raw);
                id.check()?;
                Ok(id)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> u64 {
                id.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

record_id!(TaskId);
record_id!(CategoryId);
