//! `permissions` rows.
//!
//! One table holds both menu categories and the menu entries beneath them;
//! `parent_id` points at another row of the same table.

use serde::{Deserialize, Serialize};
use sqlx::mysql::{MySql, MySqlTypeInfo, MySqlValueRef};
use sqlx::{Database, Decode, Encode, FromRow, Type};
use std::fmt;
use std::str::FromStr;

use crate::ids::PermissionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionKind {
    Category,
    Menu,
}

impl PermissionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Category => "category",
            Self::Menu => "menu",
        }
    }
}

impl fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "category" => Ok(Self::Category),
            "menu" => Ok(Self::Menu),
            other => Err(format!("unknown permission type '{}'", other)),
        }
    }
}

// Stored as a plain string column.
impl Type<MySql> for PermissionKind {
    fn type_info() -> MySqlTypeInfo {
        <str as Type<MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        <str as Type<MySql>>::compatible(ty)
    }
}

impl<'q> Encode<'q, MySql> for PermissionKind {
    fn encode_by_ref(
        &self,
        buf: &mut <MySql as Database>::ArgumentBuffer<'q>,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <&str as Encode<'q, MySql>>::encode_by_ref(&self.as_str(), buf)
    }
}

impl<'r> Decode<'r, MySql> for PermissionKind {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let raw = <&str as Decode<'r, MySql>>::decode(value)?;
        Ok(raw.parse()?)
    }
}

/// Values of the `status` column.
pub struct PermissionStatus;

impl PermissionStatus {
    pub const ACTIVE: i32 = 1;
    pub const ARCHIVED: i32 = 0;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Permission {
    pub id: PermissionId,
    pub name: String,
    pub code: String,
    #[sqlx(rename = "type")]
    pub kind: PermissionKind,
    pub parent_id: Option<PermissionId>,
    pub path: Option<String>,
    pub component: Option<String>,
    pub icon: Option<String>,
    pub sort: i32,
    pub status: i32,
}

impl Permission {
    pub fn is_active(&self) -> bool {
        self.status == PermissionStatus::ACTIVE
    }

    pub fn is_category(&self) -> bool {
        self.kind == PermissionKind::Category
    }
}
