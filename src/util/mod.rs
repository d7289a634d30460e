//! Utility functions for common operations.
//!
//! - **URL validation**: Security-focused validation to prevent SSRF attacks
//!   before a feed is fetched or an article is opened in the browser

mod url_validator;

pub use url_validator::{hostname, validate_url, AddressPolicy, UrlValidationError};
