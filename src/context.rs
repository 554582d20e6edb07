use std::cell::Cell;

use crate::changelist::{self, ChangelistError};
use crate::config::{ConfigError, Settings};
use crate::git::Git;
use crate::prompt::{CredentialsProvider, TerminalPrompt};
use crate::review::ReviewService;

/// Everything a command needs for one invocation: the git gateway, the
/// review service, the credentials source, the settings cache and the
/// one-shot migration flag.
pub struct Context {
    git: Box<dyn Git>,
    review: Box<dyn ReviewService>,
    credentials: Box<dyn CredentialsProvider>,
    pub settings: Settings,
    migrated: Cell<bool>,
}

impl Context {
    pub fn new(git: Box<dyn Git>, review: Box<dyn ReviewService>) -> Self {
        Self {
            git,
            review,
            credentials: Box::new(TerminalPrompt),
            settings: Settings::new(),
            migrated: Cell::new(false),
        }
    }

    /// Replace the terminal prompt as the source of credentials.
    pub fn with_credentials(mut self, credentials: Box<dyn CredentialsProvider>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn git(&self) -> &dyn Git {
        self.git.as_ref()
    }

    pub fn review(&self) -> &dyn ReviewService {
        self.review.as_ref()
    }

    pub fn credentials(&self) -> &dyn CredentialsProvider {
        self.credentials.as_ref()
    }

    pub fn server(&self) -> Result<String, ConfigError> {
        self.settings.server(self.git())
    }

    /// Convert the legacy mapping file, at most once per process.
    /// Returns how many entries were migrated by this call.
    pub fn ensure_migrated(&self) -> Result<usize, ChangelistError> {
        if self.migrated.get() {
            return Ok(0);
        }
        let migrated = changelist::migrate_legacy_mapping(self.git())?;
        self.migrated.set(true);
        Ok(migrated)
    }
}
