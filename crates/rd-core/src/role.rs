//! Participant role shared by presence and dispatch.

use std::str::FromStr;

use crate::CoreError;

/// Which side of the marketplace a participant is currently on.
///
/// Each role owns its own proximity index; a proximity query issued by one
/// role always searches the [`counterpart`](Role::counterpart) index.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Role {
    Driver,
    Passenger,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Driver, Role::Passenger];

    /// The role whose index a query from `self` searches.
    #[inline]
    pub fn counterpart(self) -> Role {
        match self {
            Role::Driver    => Role::Passenger,
            Role::Passenger => Role::Driver,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Driver    => "driver",
            Role::Passenger => "passenger",
        }
    }

    /// Name of the geospatial set backing this role's index.
    pub fn index_key(self) -> &'static str {
        match self {
            Role::Driver    => "geo:drivers",
            Role::Passenger => "geo:passengers",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Role, CoreError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "driver"    => Ok(Role::Driver),
            "passenger" => Ok(Role::Passenger),
            other       => Err(CoreError::UnknownRole(other.to_string())),
        }
    }
}
