//! Shared utility functions.

pub mod url_utils;

pub use url_utils::{domain_of, domain_of_parsed, is_valid_url, normalize_url, path_extension};
