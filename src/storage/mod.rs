//! SQLite persistence for catalog network links.

mod extras;
mod links;
mod schema;
mod types;

pub use schema::{Database, CURRENT_VERSION};
pub use types::{DatabaseError, NetworkLink, UnknownUrlType, UrlInfo, UrlType};
