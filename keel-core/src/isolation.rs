use crate::{KeelError, Result};
use std::{
    fmt::{self, Display},
    str::FromStr,
};

/// Transaction isolation level.
///
/// `None` leaves the driver default untouched, every other level is applied
/// to the driver connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IsolationLevel {
    #[default]
    None,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// Name as accepted in a dbspec.
    pub const fn name(&self) -> &'static str {
        match self {
            IsolationLevel::None => "none",
            IsolationLevel::ReadUncommitted => "read-uncommitted",
            IsolationLevel::ReadCommitted => "read-committed",
            IsolationLevel::RepeatableRead => "repeatable-read",
            IsolationLevel::Serializable => "serializable",
        }
    }

    pub const fn is_none(&self) -> bool {
        matches!(self, IsolationLevel::None)
    }

    /// Explicit per call level, falling back to the configured default.
    pub fn resolve(explicit: Option<IsolationLevel>, default: IsolationLevel) -> IsolationLevel {
        explicit.unwrap_or(default)
    }
}

impl FromStr for IsolationLevel {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        Ok(match normalized.as_str() {
            "none" => IsolationLevel::None,
            "read-uncommitted" => IsolationLevel::ReadUncommitted,
            "read-committed" => IsolationLevel::ReadCommitted,
            "repeatable-read" => IsolationLevel::RepeatableRead,
            "serializable" => IsolationLevel::Serializable,
            _ => {
                return Err(KeelError::configuration(format!(
                    "unknown isolation level `{}`, expected one of none, read-uncommitted, read-committed, repeatable-read, serializable",
                    s
                ))
                .into());
            }
        })
    }
}

impl Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_kind;

    #[test]
    fn parse_names() {
        assert_eq!(
            "serializable".parse::<IsolationLevel>().unwrap(),
            IsolationLevel::Serializable
        );
        assert_eq!(
            "READ_COMMITTED".parse::<IsolationLevel>().unwrap(),
            IsolationLevel::ReadCommitted
        );
        assert_eq!(
            "repeatable read".parse::<IsolationLevel>().unwrap(),
            IsolationLevel::RepeatableRead
        );
        assert_eq!(
            "none".parse::<IsolationLevel>().unwrap(),
            IsolationLevel::None
        );
        let error = "snapshot".parse::<IsolationLevel>().unwrap_err();
        assert!(matches!(
            error_kind(&error),
            Some(KeelError::Configuration { .. })
        ));
    }

    #[test]
    fn explicit_wins_over_default() {
        assert_eq!(
            IsolationLevel::resolve(Some(IsolationLevel::ReadCommitted), IsolationLevel::Serializable),
            IsolationLevel::ReadCommitted
        );
        assert_eq!(
            IsolationLevel::resolve(None, IsolationLevel::Serializable),
            IsolationLevel::Serializable
        );
        assert_eq!(
            IsolationLevel::resolve(Some(IsolationLevel::None), IsolationLevel::Serializable),
            IsolationLevel::None
        );
    }

    #[test]
    fn round_trip_names() {
        for level in [
            IsolationLevel::None,
            IsolationLevel::ReadUncommitted,
            IsolationLevel::ReadCommitted,
            IsolationLevel::RepeatableRead,
            IsolationLevel::Serializable,
        ] {
            assert_eq!(level.name().parse::<IsolationLevel>().unwrap(), level);
        }
    }
}
