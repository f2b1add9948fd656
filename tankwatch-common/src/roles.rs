//! Dashboard roles
//!
//! The dashboard serves three kinds of operator. Only admins and warehouse
//! staff may read or change tank inventory; drivers work elsewhere.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Driver,
    Warehouse,
}

impl Role {
    /// Whether this role may view and bulk-update tank levels
    pub fn can_manage_inventory(self) -> bool {
        matches!(self, Role::Admin | Role::Warehouse)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Driver => "driver",
            Role::Warehouse => "warehouse",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "driver" => Ok(Role::Driver),
            "warehouse" => Ok(Role::Warehouse),
            other => Err(Error::InvalidInput(format!("Unknown role: {}", other))),
        }
    }
}
