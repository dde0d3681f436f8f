//! Automated message state.
//!
//! At most one automated message is ever created per install: a welcome
//! message when the user opens the message center on purpose, or a "no love"
//! message when they arrive from a negative rating prompt. Whichever comes
//! first wins and the other is never sent.

use engage_codec::{decode_versioned, encode_versioned};
use engage_storage::{BlobStore, StorageError, StorageResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Storage key of the automated message state.
pub const AUTO_MESSAGE_KEY: &str = "auto_message";

const AUTO_MESSAGE_FORMAT: u16 = 1;

/// Which automated message was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutoMessageKind {
    /// Greeting for a user who opened the message center themselves.
    Welcome,
    /// Follow-up for a user who said they do not love the app.
    NoLove,
}

impl AutoMessageKind {
    /// The kind for a request: forced requests get a welcome message.
    pub fn for_request(forced: bool) -> Self {
        if forced {
            Self::Welcome
        } else {
            Self::NoLove
        }
    }

    /// Default message text.
    pub fn default_body(self) -> &'static str {
        match self {
            Self::Welcome => "Welcome! Let us know if you have any questions or feedback.",
            Self::NoLove => "We're sorry to hear that. What could we do better?",
        }
    }

    /// Stable name used in payload bodies.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Welcome => "welcome",
            Self::NoLove => "no_love",
        }
    }
}

/// Persisted automated message state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutoMessageState {
    /// No automated message has been created.
    #[default]
    NotShown,
    /// This automated message was created; no other will be.
    Shown(AutoMessageKind),
}

impl AutoMessageState {
    /// Returns true once any automated message was created.
    pub fn is_shown(&self) -> bool {
        matches!(self, Self::Shown(_))
    }
}

/// The boolean flags older installs stored instead of [`AutoMessageState`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LegacyAutoMessageFlags {
    /// Any automated message was shown.
    pub shown_auto_message: bool,
    /// The message center was opened manually (welcome shown).
    pub shown_manual: bool,
    /// The "no love" message was shown.
    pub shown_no_love: bool,
}

/// Maps legacy flags onto the state enum.
///
/// Any set flag means a message was already shown. The generic flag does not
/// say which one, so it maps to [`AutoMessageKind::Welcome`].
pub fn migrate_legacy(flags: LegacyAutoMessageFlags) -> AutoMessageState {
    if flags.shown_no_love {
        AutoMessageState::Shown(AutoMessageKind::NoLove)
    } else if flags.shown_manual || flags.shown_auto_message {
        AutoMessageState::Shown(AutoMessageKind::Welcome)
    } else {
        AutoMessageState::NotShown
    }
}

/// Owns the persisted [`AutoMessageState`].
pub struct AutoMessageStore {
    store: Arc<dyn BlobStore>,
    state: Mutex<AutoMessageState>,
}

impl AutoMessageStore {
    /// Loads the state, defaulting to [`AutoMessageState::NotShown`].
    pub fn open(store: Arc<dyn BlobStore>) -> Self {
        let state = match store.get(AUTO_MESSAGE_KEY) {
            Ok(Some(bytes)) => decode_versioned(AUTO_MESSAGE_FORMAT, &bytes).unwrap_or_else(|e| {
                warn!(error = %e, "discarding unreadable auto message state");
                AutoMessageState::NotShown
            }),
            Ok(None) => AutoMessageState::NotShown,
            Err(e) => {
                warn!(error = %e, "auto message state unavailable");
                AutoMessageState::NotShown
            }
        };
        Self {
            store,
            state: Mutex::new(state),
        }
    }

    /// Current state.
    pub fn state(&self) -> AutoMessageState {
        *self.state.lock()
    }

    /// Folds legacy flags into the state. A shown state is never undone.
    pub fn migrate(&self, flags: LegacyAutoMessageFlags) -> AutoMessageState {
        let mut state = self.state.lock();
        if *state == AutoMessageState::NotShown {
            let migrated = migrate_legacy(flags);
            if migrated.is_shown() {
                info!(state = ?migrated, "migrated legacy auto message flags");
                *state = migrated;
                self.persist(*state);
            }
        }
        *state
    }

    /// Claims the one automated message, if it is still available.
    ///
    /// Returns the kind to create, or `None` if one was already created.
    pub fn claim(&self, forced: bool) -> Option<AutoMessageKind> {
        let mut state = self.state.lock();
        if state.is_shown() {
            debug!(state = ?*state, "automated message already shown");
            return None;
        }
        let kind = AutoMessageKind::for_request(forced);
        *state = AutoMessageState::Shown(kind);
        self.persist(*state);
        Some(kind)
    }

    fn persist(&self, state: AutoMessageState) {
        if let Err(e) = write_state(self.store.as_ref(), state) {
            warn!(error = %e, "auto message state not durable this cycle");
        }
    }
}

fn write_state(store: &dyn BlobStore, state: AutoMessageState) -> StorageResult<()> {
    let bytes = encode_versioned(AUTO_MESSAGE_FORMAT, &state)
        .map_err(|e| StorageError::Unavailable(e.to_string()))?;
    store.put(AUTO_MESSAGE_KEY, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use engage_storage::InMemoryStore;

    #[test]
    fn legacy_migration() {
        assert_eq!(
            migrate_legacy(LegacyAutoMessageFlags::default()),
            AutoMessageState::NotShown
        );
        assert_eq!(
            migrate_legacy(LegacyAutoMessageFlags {
                shown_manual: true,
                ..Default::default()
            }),
            AutoMessageState::Shown(AutoMessageKind::Welcome)
        );
        assert_eq!(
            migrate_legacy(LegacyAutoMessageFlags {
                shown_auto_message: true,
                shown_no_love: true,
                ..Default::default()
            }),
            AutoMessageState::Shown(AutoMessageKind::NoLove)
        );
    }

    #[test]
    fn only_one_message_ever() {
        let store: Arc<dyn BlobStore> = Arc::new(InMemoryStore::new());
        let auto = AutoMessageStore::open(store.clone());

        assert_eq!(auto.claim(false), Some(AutoMessageKind::NoLove));
        assert_eq!(auto.claim(true), None);

        let reopened = AutoMessageStore::open(store);
        assert_eq!(
            reopened.state(),
            AutoMessageState::Shown(AutoMessageKind::NoLove)
        );
        assert_eq!(reopened.claim(true), None);
    }

    #[test]
    fn migrate_never_unshows() {
        let auto = AutoMessageStore::open(Arc::new(InMemoryStore::new()));
        auto.claim(true);
        let state = auto.migrate(LegacyAutoMessageFlags {
            shown_no_love: true,
            ..Default::default()
        });
        assert_eq!(state, AutoMessageState::Shown(AutoMessageKind::Welcome));
    }
}
