//! Database infrastructure - connection lifecycle and diagnostics.

pub mod db;
