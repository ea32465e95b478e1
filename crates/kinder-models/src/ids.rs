//! Strongly-typed ID newtypes for application tables.
//!
//! The application's MySQL tables use auto-increment integer keys. Wrapping
//! them prevents passing a `RoleId` where a `PermissionId` is expected when
//! building `role_permissions` rows.
//!
//! # Example
//!
//! ```ignore
//! use kinder_models::ids::{PermissionId, RoleId};
//!
//! fn link(role: RoleId, permission: PermissionId) { /* ... */ }
//!
//! link(RoleId::from(1), PermissionId::from(42));    // OK
//! // link(PermissionId::from(42), RoleId::from(1)); // Compile error!
//! ```

use serde::{Deserialize, Serialize};
use sqlx::mysql::{MySql, MySqlTypeInfo, MySqlValueRef};
use sqlx::{Database, Decode, Encode, Type, ValueRef};
use std::fmt;

/// Macro to define a strongly-typed integer ID newtype.
///
/// Decoding accepts both signed and unsigned integer columns since the
/// schema is not consistent about `INT UNSIGNED`.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            #[inline]
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            #[inline]
            pub const fn into_inner(self) -> i64 {
                self.0
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

        impl From<i64> for $name {
            #[inline]
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            #[inline]
            fn from(id: $name) -> i64 {
                id.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }

        impl Type<MySql> for $name {
            fn type_info() -> MySqlTypeInfo {
                <i64 as Type<MySql>>::type_info()
            }

            fn compatible(ty: &MySqlTypeInfo) -> bool {
                <i64 as Type<MySql>>::compatible(ty) || <u64 as Type<MySql>>::compatible(ty)
            }
        }

        impl<'q> Encode<'q, MySql> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut <MySql as Database>::ArgumentBuffer<'q>,
            ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
                <i64 as Encode<'q, MySql>>::encode_by_ref(&self.0, buf)
            }
        }

        impl<'r> Decode<'r, MySql> for $name {
            fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
                let ty = value.type_info().into_owned();
                if !<i64 as Type<MySql>>::compatible(&ty) && <u64 as Type<MySql>>::compatible(&ty) {
                    let raw = <u64 as Decode<'r, MySql>>::decode(value)?;
                    return Ok(Self(i64::try_from(raw)?));
                }
                <i64 as Decode<'r, MySql>>::decode(value).map(Self)
            }
        }
    };
}

define_id!(
    /// ID of a `permissions` row.
    PermissionId
);

define_id!(
    /// ID of a `roles` row.
    RoleId
);

define_id!(
    /// ID of a `users` row.
    UserId
);

define_id!(
    /// ID of an `assessment_questions` row.
    QuestionId
);

define_id!(
    /// ID of a `classes` row.
    ClassId
);

define_id!(
    /// ID of a `students` row.
    StudentId
);

define_id!(
    /// ID of a `parents` row.
    ParentId
);

define_id!(
    /// ID of a `teachers` row.
    TeacherId
);
