// SPDX-License-Identifier: MIT

//! Middleware modules.

pub mod security;

pub use security::add_response_headers;
