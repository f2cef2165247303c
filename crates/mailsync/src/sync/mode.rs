//! Run mode flags

use crate::error::{SyncError, SyncResult};

/// What a run is allowed to do.
///
/// Built through [`RunMode::builder`], which rejects `wipe` together with
/// `sync`. The value is immutable once built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunMode {
    fake: bool,
    wipe: bool,
    once: bool,
    sync: bool,
}

impl RunMode {
    pub fn builder() -> RunModeBuilder {
        RunModeBuilder::default()
    }

    /// Index and classify only; never mutate either store
    pub fn fake(&self) -> bool {
        self.fake
    }

    /// Delete each source message once it is known to be on the target
    pub fn wipe(&self) -> bool {
        self.wipe
    }

    /// Stop the whole run after the first copy
    pub fn once(&self) -> bool {
        self.once
    }

    /// Delete target messages that are absent from the source
    pub fn sync(&self) -> bool {
        self.sync
    }
}

/// Builder for [`RunMode`]
#[derive(Debug, Default)]
pub struct RunModeBuilder {
    mode: RunMode,
}

impl RunModeBuilder {
    pub fn fake(mut self, fake: bool) -> Self {
        self.mode.fake = fake;
        self
    }

    pub fn wipe(mut self, wipe: bool) -> Self {
        self.mode.wipe = wipe;
        self
    }

    pub fn once(mut self, once: bool) -> Self {
        self.mode.once = once;
        self
    }

    pub fn sync(mut self, sync: bool) -> Self {
        self.mode.sync = sync;
        self
    }

    pub fn build(self) -> SyncResult<RunMode> {
        if self.mode.wipe && self.mode.sync {
            return Err(SyncError::Configuration(
                "--wipe and --sync cannot be used together".to_string(),
            ));
        }
        Ok(self.mode)
    }
}
