#![cfg_attr(docsrs, feature(doc_cfg))]
//! Oracle driver for SQLx, speaking to the database through the OCI client
//! library.
//!
//! See [`oci8`] for an overview.

pub use sqlx_core::column::{Column, ColumnIndex};
pub use sqlx_core::connection::{ConnectOptions, Connection};
pub use sqlx_core::error::{self, Error, ErrorKind, Result};
pub use sqlx_core::type_info::TypeInfo;

pub use sqlx_core::oci8;

pub use sqlx_core::oci8::{
    Oci8Arguments, Oci8ConnectOptions, Oci8Connection, Oci8Row, Oci8Value, Oci8Worker,
};

/// Conversions between Rust and SQL types.
pub mod types {
    pub use sqlx_core::oci8::types::{Decode, Encode, Type};
}

/// Convenience re-export of common traits.
pub mod prelude {
    pub use super::Column;
    pub use super::{ConnectOptions, Connection};
    pub use super::TypeInfo;
    pub use super::types::{Decode, Encode, Type};
}
