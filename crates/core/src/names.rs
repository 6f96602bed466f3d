// SPDX-License-Identifier: Apache-2.0
// Copyright (c) contributors to Project Ocre

//! Name validation and container ID generation.
//!
//! Image names and container IDs share one validator, and the random ID
//! generator draws from the same alphabet, so every generated ID is also a
//! valid user-supplied one.

/// Length of auto-generated container IDs.
pub const RANDOM_ID_LEN: usize = 7;

const HEX: [char; 16] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f',
];

/// Returns true iff `s` is a valid image name or container ID.
///
/// Valid names are nonempty, do not begin with `.`, and contain only
/// lowercase alphanumerics, `.`, `_`, and `-`.
pub fn is_valid_name(s: &str) -> bool {
    if s.is_empty() || s.starts_with('.') {
        return false;
    }

    s.bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'.' || b == b'_' || b == b'-')
}

/// Generate a random 7-hex container ID.
pub fn random_id() -> String {
    nanoid::nanoid!(RANDOM_ID_LEN, &HEX)
}

#[cfg(test)]
#[path = "names_tests.rs"]
mod tests;
