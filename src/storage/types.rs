use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds the database lock
    #[error("The link database is locked by another process. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return DatabaseError::InstanceLocked;
        }
        DatabaseError::Other(err)
    }
}

// SQLITE_BUSY (5): database is locked
// SQLITE_LOCKED (6): database table is locked
// SQLITE_CANTOPEN (14): unable to open database file
pub(crate) fn is_lock_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
        || message.contains("unable to open database file")
}

// ============================================================================
// URL Keys
// ============================================================================

/// Role of a URL stored for a network link. Stored by name in `LinkUrls.key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum UrlType {
    Catalog,
    Search,
    Image,
    Thumbnail,
    SignIn,
    SignOut,
    SignUp,
    TopUp,
    RecoverPassword,
}

impl UrlType {
    pub const ALL: [UrlType; 9] = [
        UrlType::Catalog,
        UrlType::Search,
        UrlType::Image,
        UrlType::Thumbnail,
        UrlType::SignIn,
        UrlType::SignOut,
        UrlType::SignUp,
        UrlType::TopUp,
        UrlType::RecoverPassword,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            UrlType::Catalog => "Catalog",
            UrlType::Search => "Search",
            UrlType::Image => "Image",
            UrlType::Thumbnail => "Thumbnail",
            UrlType::SignIn => "SignIn",
            UrlType::SignOut => "SignOut",
            UrlType::SignUp => "SignUp",
            UrlType::TopUp => "TopUp",
            UrlType::RecoverPassword => "RecoverPassword",
        }
    }
}

impl fmt::Display for UrlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown URL type: {0}")]
pub struct UnknownUrlType(pub String);

impl FromStr for UrlType {
    type Err = UnknownUrlType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UrlType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownUrlType(s.to_string()))
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// A URL together with the time it was last refreshed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UrlInfo {
    pub url: Option<String>,
    pub updated: Option<DateTime<Utc>>,
}

impl UrlInfo {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            updated: None,
        }
    }

    /// `update_time` column value (milliseconds since the epoch).
    pub(crate) fn update_time_millis(&self) -> Option<i64> {
        self.updated.map(|t| t.timestamp_millis())
    }

    pub(crate) fn from_row(url: Option<String>, update_time: Option<i64>) -> Self {
        Self {
            url,
            updated: update_time.and_then(DateTime::<Utc>::from_timestamp_millis),
        }
    }
}

/// A catalog network link definition.
///
/// `id` is `None` until the link is first saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkLink {
    pub id: Option<i64>,
    /// Site identifier, unique across links.
    pub catalog_id: String,
    pub title: String,
    pub summary: Option<String>,
    pub is_predefined: bool,
    pub is_enabled: bool,
    pub urls: BTreeMap<UrlType, UrlInfo>,
}

impl NetworkLink {
    /// A new, enabled, user-defined link.
    pub fn new(catalog_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: None,
            catalog_id: catalog_id.into(),
            title: title.into(),
            summary: None,
            is_predefined: false,
            is_enabled: true,
            urls: BTreeMap::new(),
        }
    }

    pub fn url(&self, key: UrlType) -> Option<&str> {
        self.urls.get(&key).and_then(|info| info.url.as_deref())
    }

    pub fn set_url(&mut self, key: UrlType, info: UrlInfo) {
        self.urls.insert(key, info);
    }

    pub fn remove_url(&mut self, key: UrlType) -> Option<UrlInfo> {
        self.urls.remove(&key)
    }
}

/// Row of the `Links` table.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct LinkRow {
    pub link_id: i64,
    pub catalog_id: Option<String>,
    pub title: String,
    pub summary: Option<String>,
    pub is_predefined: Option<i64>,
    pub is_enabled: Option<i64>,
}

impl LinkRow {
    pub(crate) fn into_link(self, urls: BTreeMap<UrlType, UrlInfo>) -> NetworkLink {
        NetworkLink {
            id: Some(self.link_id),
            catalog_id: self.catalog_id.unwrap_or_default(),
            title: self.title,
            summary: self.summary,
            is_predefined: self.is_predefined.unwrap_or(0) > 0,
            is_enabled: self.is_enabled.unwrap_or(0) > 0,
            urls,
        }
    }
}

/// Row of the `LinkUrls` table.
pub(crate) type UrlRow = (i64, String, Option<String>, Option<i64>);
