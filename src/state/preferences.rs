//! User preferences
//!
//! Loaded once at start from the catalog and written back on every change.
//! Nothing reads preferences from global state; the value is handed to
//! whoever needs it.

use log::info;
use std::path::{Path, PathBuf};

use super::catalog::Catalog;
use crate::error::Result;

const USE_REMOTE_SYNC: &str = "use_remote_sync";
const ASKED_ABOUT_REMOTE_SYNC: &str = "asked_about_remote_sync";
const SYNC_TOKEN: &str = "sync_token";
const CURRENT_DOCUMENT: &str = "current_document";

/// How the sync account token compares to the one seen last time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenChange {
    Unchanged,
    /// A token is present and none was stored before
    FirstSeen,
    /// A different account is signed in
    Changed,
    /// A token was stored but the account is gone
    SignedOut,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preferences {
    use_remote_sync: bool,
    asked_about_remote_sync: bool,
    sync_token: Option<String>,
    current_document: Option<PathBuf>,
}

impl Preferences {
    pub fn load(catalog: &Catalog) -> Result<Self> {
        let flag = |key: &str| -> Result<bool> {
            Ok(catalog.get_preference(key)?.as_deref() == Some("true"))
        };

        Ok(Self {
            use_remote_sync: flag(USE_REMOTE_SYNC)?,
            asked_about_remote_sync: flag(ASKED_ABOUT_REMOTE_SYNC)?,
            sync_token: catalog.get_preference(SYNC_TOKEN)?,
            current_document: catalog.get_preference(CURRENT_DOCUMENT)?.map(PathBuf::from),
        })
    }

    pub fn use_remote_sync(&self) -> bool {
        self.use_remote_sync
    }

    pub fn asked_about_remote_sync(&self) -> bool {
        self.asked_about_remote_sync
    }

    pub fn sync_token(&self) -> Option<&str> {
        self.sync_token.as_deref()
    }

    pub fn current_document(&self) -> Option<&Path> {
        self.current_document.as_deref()
    }

    /// Remote sync is in use only when the user opted in and an account is signed in
    pub fn using_remote_sync(&self, current_token: Option<&str>) -> bool {
        self.use_remote_sync && current_token.is_some()
    }

    /// True when an account is available but the user was never asked about it
    pub fn needs_sync_prompt(&self, current_token: Option<&str>) -> bool {
        current_token.is_some() && !self.asked_about_remote_sync
    }

    /// Record the user's answer to the sync prompt
    pub fn set_use_remote_sync(&mut self, catalog: &Catalog, enabled: bool) -> Result<()> {
        catalog.set_preference(USE_REMOTE_SYNC, Some(bool_str(enabled)))?;
        catalog.set_preference(ASKED_ABOUT_REMOTE_SYNC, Some(bool_str(true)))?;
        self.use_remote_sync = enabled;
        self.asked_about_remote_sync = true;
        Ok(())
    }

    pub fn set_current_document(&mut self, catalog: &Catalog, location: Option<&Path>) -> Result<()> {
        let value = location.map(|path| path.to_string_lossy().into_owned());
        catalog.set_preference(CURRENT_DOCUMENT, value.as_deref())?;
        self.current_document = location.map(Path::to_path_buf);
        Ok(())
    }

    /// Compare the signed-in account against the stored one and store the
    /// current token.
    pub fn check_sync_token(&mut self, catalog: &Catalog, current_token: Option<&str>) -> Result<TokenChange> {
        let change = match (self.sync_token.as_deref(), current_token) {
            (None, None) => TokenChange::Unchanged,
            (Some(_), None) => TokenChange::SignedOut,
            (None, Some(_)) => TokenChange::FirstSeen,
            (Some(stored), Some(current)) if stored == current => TokenChange::Unchanged,
            (Some(_), Some(_)) => TokenChange::Changed,
        };

        if change != TokenChange::Unchanged {
            info!("Sync account token {change:?}");
            catalog.set_preference(SYNC_TOKEN, current_token)?;
            self.sync_token = current_token.map(str::to_string);
        }
        Ok(change)
    }
}

fn bool_str(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}
