//! Core of the SQLx Oracle driver.
//! Not intended to be used directly.
#![warn(future_incompatible, rust_2018_idioms)]
#![allow(
    clippy::needless_doctest_main,
    clippy::type_complexity,
    clippy::result_large_err,
    clippy::len_without_is_empty,
    clippy::module_inception
)]
// The native client library is reached through the `OciApi` trait; nothing
// in this crate needs raw pointers.
#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]

#[macro_use]
pub mod error;

pub mod column;
pub mod connection;
mod logger;
pub mod type_info;

pub mod oci8;

pub use error::{Error, ErrorKind, Result};
