//! ATOM/OPDS catalog feeds: a streaming feed reader and a SQLite store for
//! catalog network links.

pub mod atom;
pub mod config;
pub mod storage;
pub mod xml;
