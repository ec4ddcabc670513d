//! Admin sessions.
//!
//! Credentials live in a sheet whose header row names the `EMAIL`, `PASS`
//! and `ACCES` columns. A successful login yields a [`Session`] that the
//! [`SessionStore`] keeps on disk until logout.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::table::{display, RecordTable};

pub const EMAIL_COLUMN: &str = "EMAIL";
pub const PASSWORD_COLUMN: &str = "PASS";
pub const PERMISSION_COLUMN: &str = "ACCES";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid data structure from server")]
    MissingColumns,

    #[error("Email ou mot de passe incorrect")]
    InvalidCredentials,

    #[error("Invalid permission type: {0}")]
    InvalidPermission(String),

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("{actual} session cannot access the {required} area")]
    Forbidden {
        required: Permission,
        actual: Permission,
    },

    #[error("session file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("session encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Permission {
    Superadmin,
    Pointage,
    Laboural,
}

impl Permission {
    pub const ALL: [Permission; 3] = [Permission::Superadmin, Permission::Pointage, Permission::Laboural];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "SUPERADMIN" => Some(Permission::Superadmin),
            "POINTAGE" => Some(Permission::Pointage),
            "LABOURAL" => Some(Permission::Laboural),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Permission::Superadmin => "SUPERADMIN",
            Permission::Pointage => "POINTAGE",
            Permission::Laboural => "LABOURAL",
        }
    }

    /// Admin area a session with this permission lands on.
    pub fn admin_path(self) -> &'static str {
        match self {
            Permission::Superadmin => "/admin/superadmin",
            Permission::Pointage => "/admin/pointage",
            Permission::Laboural => "/admin/laboural",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub email: String,
    pub permission: Permission,
    pub is_authenticated: bool,
}

/// Look `email` / `password` up in the credential sheet.
///
/// The email is compared case-insensitively, the password exactly against the
/// cell's text (numeric passwords included).
pub fn authenticate(table: &RecordTable, email: &str, password: &str) -> Result<Session, AuthError> {
    let header = table.header().ok_or(AuthError::MissingColumns)?;
    let column = |name: &str| header.iter().position(|cell| cell.as_str() == Some(name));
    let (Some(email_idx), Some(password_idx), Some(permission_idx)) =
        (column(EMAIL_COLUMN), column(PASSWORD_COLUMN), column(PERMISSION_COLUMN))
    else {
        return Err(AuthError::MissingColumns);
    };

    let email = email.to_lowercase();
    let user = table
        .data_rows()
        .filter_map(|row| row.as_array())
        .find(|row| {
            display(row.get(email_idx)).to_lowercase() == email && display(row.get(password_idx)) == password
        })
        .ok_or(AuthError::InvalidCredentials)?;

    let access = display(user.get(permission_idx));
    let permission = Permission::parse(&access).ok_or(AuthError::InvalidPermission(access))?;

    Ok(Session {
        email,
        permission,
        is_authenticated: true,
    })
}

// ============================================================================
// Store
// ============================================================================

/// The current session, mirrored to a JSON file.
#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    current: Option<Session>,
}

impl SessionStore {
    /// Load whatever session was saved at `path`. An unreadable file is
    /// removed and the store starts logged out.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let current = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<Session>(&contents) {
                Ok(session) => Some(session),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Discarding corrupt session file");
                    if let Err(e) = fs::remove_file(&path) {
                        warn!(path = %path.display(), error = %e, "Could not remove session file");
                    }
                    None
                }
            },
            Err(_) => None,
        };
        Self { path, current }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.as_ref().map_or(false, |s| s.is_authenticated)
    }

    pub fn login(&mut self, table: &RecordTable, email: &str, password: &str) -> Result<&Session, AuthError> {
        let session = authenticate(table, email, password)?;
        fs::write(&self.path, serde_json::to_string(&session)?)?;
        info!(email = %session.email, permission = %session.permission, "Logged in");
        Ok(self.current.insert(session))
    }

    pub fn logout(&mut self) -> Result<(), AuthError> {
        self.current = None;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// The session, if it may enter the area reserved to `required`.
    pub fn require(&self, required: Permission) -> Result<&Session, AuthError> {
        let session = self
            .current
            .as_ref()
            .filter(|s| s.is_authenticated)
            .ok_or(AuthError::NotAuthenticated)?;
        if session.permission != required {
            return Err(AuthError::Forbidden {
                required,
                actual: session.permission,
            });
        }
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn credentials() -> RecordTable {
        RecordTable::from_value(json!([
            ["NOM", "EMAIL", "PASS", "ACCES"],
            ["Amina", "Amina@Example.com", 1234, "POINTAGE"],
            ["Root", "root@example.com", "s3cret", "SUPERADMIN"],
            ["Ghost", "ghost@example.com", "boo", "VISITEUR"]
        ]))
        .unwrap()
    }

    #[test]
    fn test_authenticate() {
        let session = authenticate(&credentials(), "AMINA@example.com", "1234").unwrap();
        assert_eq!(session.email, "amina@example.com");
        assert_eq!(session.permission, Permission::Pointage);
        assert_eq!(session.permission.admin_path(), "/admin/pointage");

        assert!(matches!(
            authenticate(&credentials(), "root@example.com", "S3CRET"),
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            authenticate(&credentials(), "ghost@example.com", "boo"),
            Err(AuthError::InvalidPermission(p)) if p == "VISITEUR"
        ));
    }

    #[test]
    fn test_missing_columns() {
        let table = RecordTable::from_value(json!([["EMAIL", "PASSWORD"], ["a@b.c", "x"]])).unwrap();
        assert!(matches!(authenticate(&table, "a@b.c", "x"), Err(AuthError::MissingColumns)));
    }

    #[test]
    fn test_store_persists_and_gates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let mut store = SessionStore::open(&path);
        assert!(!store.is_authenticated());
        store.login(&credentials(), "root@example.com", "s3cret").unwrap();
        assert!(path.exists());

        let reopened = SessionStore::open(&path);
        assert_eq!(reopened.current().map(|s| s.permission), Some(Permission::Superadmin));
        assert!(reopened.require(Permission::Superadmin).is_ok());
        assert!(matches!(
            reopened.require(Permission::Laboural),
            Err(AuthError::Forbidden { .. })
        ));

        store.logout().unwrap();
        assert!(!path.exists());
        assert!(matches!(store.require(Permission::Superadmin), Err(AuthError::NotAuthenticated)));
    }

    #[test]
    fn test_corrupt_file_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "{not json").unwrap();

        let store = SessionStore::open(&path);
        assert!(store.current().is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_failed_login_keeps_previous_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SessionStore::open(dir.path().join("session.json"));
        store.login(&credentials(), "root@example.com", "s3cret").unwrap();
        assert!(store.login(&credentials(), "root@example.com", "nope").is_err());
        assert_eq!(store.current().map(|s| s.email.as_str()), Some("root@example.com"));
    }
}
