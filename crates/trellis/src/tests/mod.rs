//! Crate-level behavioural tests.
