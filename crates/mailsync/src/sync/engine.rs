//! Reconciliation of a source mail store into a target mail store

use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::index::{KeySet, MailboxIndex};
use super::mode::RunMode;
use super::report::{Counts, FolderReport, RunReport, StopReason};
use super::selector::FolderSelector;
use crate::error::{Side, SyncError, SyncResult};
use crate::models::{FolderDescriptor, Message};
use crate::storage::MailStore;

/// Everything a run needs besides the two stores
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub mode: RunMode,
    pub selector: FolderSelector,
    /// Set from outside to stop the run between messages
    pub interrupt: Option<Arc<AtomicBool>>,
}

impl SyncOptions {
    pub fn new(mode: RunMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn with_selector(mut self, selector: FolderSelector) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }
}

/// Progress events emitted while a run is in flight
#[derive(Debug)]
pub enum SyncProgress<'a> {
    /// A folder pair passed the skip policy and both sides are open
    FolderStarted {
        source: &'a str,
        target: &'a str,
        source_count: u32,
        target_count: u32,
    },
    /// Target index build progress
    Indexing { done: u32, total: u32 },
    /// A source message has been classified and acted on
    Message { counts: &'a Counts },
    /// A folder pair is finished (or was cut short by `once` or an interrupt)
    FolderFinished { report: &'a FolderReport },
}

/// Reconcile every eligible folder of `source` into `target`.
///
/// Folders are processed one at a time; within a folder the source is
/// walked from the highest position down so that wipe deletions never
/// shift a position that is still to be visited. Both stores are closed
/// before this returns, whatever the outcome.
pub fn reconcile<F>(
    source: &mut dyn MailStore,
    target: &mut dyn MailStore,
    options: &SyncOptions,
    on_progress: F,
) -> SyncResult<RunReport>
where
    F: FnMut(SyncProgress<'_>),
{
    info!(
        "Reconciling {} into {}",
        source.describe(),
        target.describe()
    );

    let result = Reconciler {
        source: &mut *source,
        target: &mut *target,
        options,
        on_progress,
        report: RunReport::default(),
    }
    .run();

    close_store(source, Side::Source);
    close_store(target, Side::Target);
    result
}

fn close_store(store: &mut dyn MailStore, side: Side) {
    if let Err(e) = store.close() {
        warn!("Failed to close {} store {}: {:#}", side, store.describe(), e);
    }
}

/// Whether to go on with the next folder
enum Flow {
    Continue,
    Stop(StopReason),
}

struct Reconciler<'a, F> {
    source: &'a mut dyn MailStore,
    target: &'a mut dyn MailStore,
    options: &'a SyncOptions,
    on_progress: F,
    report: RunReport,
}

impl<F> Reconciler<'_, F>
where
    F: FnMut(SyncProgress<'_>),
{
    fn run(mut self) -> SyncResult<RunReport> {
        let folders = self
            .source
            .list_folders("*")
            .map_err(|source| SyncError::Listing {
                side: Side::Source,
                source,
            })?;
        let source_subscribed: HashSet<String> = self
            .source
            .list_subscribed()
            .map_err(|source| SyncError::Listing {
                side: Side::Source,
                source,
            })?
            .into_iter()
            .collect();
        let mut target_subscribed: HashSet<String> = self
            .target
            .list_subscribed()
            .map_err(|source| SyncError::Listing {
                side: Side::Target,
                source,
            })?
            .into_iter()
            .collect();

        info!(
            "{} source folders, {} subscribed on source, {} subscribed on target",
            folders.len(),
            source_subscribed.len(),
            target_subscribed.len()
        );

        for folder in &folders {
            if self.interrupted() {
                self.report.stopped = StopReason::Interrupted;
                break;
            }
            if self.options.selector.should_skip(folder) {
                info!(
                    "Skipping {} (attributes {})",
                    folder.name,
                    folder.attributes.bits()
                );
                continue;
            }

            match self.reconcile_folder(folder, &source_subscribed, &mut target_subscribed)? {
                Flow::Continue => {}
                Flow::Stop(reason) => {
                    self.report.stopped = reason;
                    break;
                }
            }
        }

        match self.report.stopped {
            StopReason::Completed => info!("Run complete"),
            StopReason::Once => info!("Stopped after first copy"),
            StopReason::Interrupted => warn!("Run interrupted"),
        }
        Ok(self.report)
    }

    fn interrupted(&self) -> bool {
        self.options
            .interrupt
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn reconcile_folder(
        &mut self,
        folder: &FolderDescriptor,
        source_subscribed: &HashSet<String>,
        target_subscribed: &mut HashSet<String>,
    ) -> SyncResult<Flow> {
        let mode = self.options.mode;
        let source_name = folder.name.as_str();
        let target_name = self.options.selector.map_target_name(source_name);

        let source_stat = match self.source.select(source_name).and_then(|()| self.source.stat()) {
            Ok(stat) => stat,
            Err(source) => {
                let err = SyncError::FolderSelection {
                    side: Side::Source,
                    folder: source_name.to_string(),
                    source,
                };
                warn!("{}; skipping folder", err);
                self.fail_folder(FolderReport::failed(source_name, &target_name, err.to_string()));
                return Ok(Flow::Continue);
            }
        };
        if source_stat.is_empty() {
            debug!("{} is empty", source_name);
            return Ok(Flow::Continue);
        }

        let target_stat = self
            .target
            .select(&target_name)
            .and_then(|()| self.target.stat())
            .map_err(|source| SyncError::FolderSelection {
                side: Side::Target,
                folder: target_name.clone(),
                source,
            })?;

        info!(
            "{} ({} messages) -> {} ({} messages)",
            source_name, source_stat.message_count, target_name, target_stat.message_count
        );
        (self.on_progress)(SyncProgress::FolderStarted {
            source: source_name,
            target: &target_name,
            source_count: source_stat.message_count,
            target_count: target_stat.message_count,
        });

        let total = target_stat.message_count;
        let on_progress = &mut self.on_progress;
        let index = match MailboxIndex::build(&mut *self.target, total, |done| {
            on_progress(SyncProgress::Indexing { done, total })
        }) {
            Ok(index) => index,
            Err(e) => {
                warn!("Cannot index target folder '{}': {:#}; skipping folder", target_name, e);
                self.fail_folder(FolderReport::failed(
                    source_name,
                    &target_name,
                    format!("cannot index target folder {}: {:#}", target_name, e),
                ));
                return Ok(Flow::Continue);
            }
        };
        debug!("Indexed {} target messages", index.len());

        let mut report = FolderReport::new(source_name, &target_name);
        let mut seen = KeySet::new();
        let mut unread_keys = false;

        for position in (1..=source_stat.message_count).rev() {
            if self.interrupted() {
                self.finish_folder(report);
                return Ok(Flow::Stop(StopReason::Interrupted));
            }

            let meta = match self.source.stat_message(position) {
                Ok(meta) => meta,
                Err(source) => {
                    let err = SyncError::MetadataRead {
                        side: Side::Source,
                        folder: source_name.to_string(),
                        position,
                        source,
                    };
                    warn!("{}", err);
                    report.counts.unreadable += 1;
                    unread_keys = true;
                    continue;
                }
            };

            let key = meta.key();
            let present = index.contains(&key);
            seen.insert(key);

            if present {
                debug!("Already on target: {} '{}'", position, meta.subject);
                report.counts.skipped += 1;
                self.wipe_source(source_name, position, &mut report.counts);
            } else if self.copy_message(source_name, position, &meta, &mut report.counts) {
                self.wipe_source(source_name, position, &mut report.counts);
                if mode.once() && !mode.fake() {
                    (self.on_progress)(SyncProgress::Message {
                        counts: &report.counts,
                    });
                    self.finish_folder(report);
                    return Ok(Flow::Stop(StopReason::Once));
                }
            }

            (self.on_progress)(SyncProgress::Message {
                counts: &report.counts,
            });
        }

        if !mode.fake()
            && source_subscribed.contains(source_name)
            && !target_subscribed.contains(&target_name)
        {
            match self.target.set_subscribed(&target_name, true) {
                Ok(()) => {
                    info!("Subscribed {}", target_name);
                    target_subscribed.insert(target_name.clone());
                }
                Err(e) => warn!("Failed to subscribe {}: {:#}", target_name, e),
            }
        }

        if mode.sync() {
            let target_total = target_stat.message_count as usize + report.counts.copied;
            if target_total <= source_stat.message_count as usize {
                debug!("Target {} has no surplus", target_name);
            } else if unread_keys {
                warn!(
                    "Not removing surplus from {}: some source messages could not be read",
                    target_name
                );
            } else {
                self.delete_surplus(&target_name, &index, &seen, &mut report.counts);
            }
        }

        self.finish_folder(report);
        Ok(Flow::Continue)
    }

    /// Fetch the body and append it to the target. True when the message
    /// counts as copied.
    fn copy_message(
        &mut self,
        folder: &str,
        position: u32,
        meta: &Message,
        counts: &mut Counts,
    ) -> bool {
        let transferred = self.source.get_message(position).and_then(|message| {
            if self.options.mode.fake() {
                debug!("Would copy {} '{}'", position, meta.subject);
                Ok(())
            } else {
                self.target.put_message(&message)
            }
        });

        match transferred {
            Ok(()) => {
                debug!("Copied {} '{}'", position, meta.subject);
                counts.copied += 1;
                true
            }
            Err(source) => {
                let err = SyncError::BodyTransfer {
                    folder: folder.to_string(),
                    position,
                    source,
                };
                warn!("{}", err);
                counts.failed += 1;
                false
            }
        }
    }

    fn wipe_source(&mut self, folder: &str, position: u32, counts: &mut Counts) {
        let mode = self.options.mode;
        if !mode.wipe() || mode.fake() {
            return;
        }
        match self.source.delete_message(position) {
            Ok(()) => counts.wiped += 1,
            Err(e) => warn!(
                "Failed to remove message {} from source folder {}: {:#}",
                position, folder, e
            ),
        }
    }

    /// Remove pre-walk target entries the source walk never saw.
    /// Highest positions go first so the rest stay valid.
    fn delete_surplus(
        &mut self,
        target_name: &str,
        index: &MailboxIndex,
        seen: &KeySet,
        counts: &mut Counts,
    ) {
        for (key, entry) in index.surplus(seen) {
            if self.options.mode.fake() {
                debug!("Would delete {} {:?} from {}", entry.position, key, target_name);
                counts.deleted += 1;
                continue;
            }
            match self.target.delete_message(entry.position) {
                Ok(()) => {
                    debug!("Deleted {} '{}' from {}", entry.position, entry.subject, target_name);
                    counts.deleted += 1;
                }
                Err(e) => warn!(
                    "Failed to delete message {} from {}: {:#}",
                    entry.position, target_name, e
                ),
            }
        }
    }

    fn finish_folder(&mut self, report: FolderReport) {
        let counts = report.counts;
        info!(
            "{}: copied {}, skipped {}, deleted {}, wiped {}, failed {}",
            report.target_folder,
            counts.copied,
            counts.skipped,
            counts.deleted,
            counts.wiped,
            counts.failed + counts.unreadable
        );
        (self.on_progress)(SyncProgress::FolderFinished { report: &report });
        self.report.folders.push(report);
    }

    fn fail_folder(&mut self, report: FolderReport) {
        (self.on_progress)(SyncProgress::FolderFinished { report: &report });
        self.report.folders.push(report);
    }
}
