//! Round-robin passes over the retry queue
//!
//! The queue is held as two lists. `before` holds entries not yet looked at in
//! the current pass; `after` collects entries to look at again next pass. An
//! entry stays at the front of `before` until its outcome is known and is then
//! moved in one step, so dropping the run future at any await point leaves
//! every pending entry in exactly one of the two lists. [`RetryQueueManager::persist`]
//! writes both, which is what the binary does after an interrupt.

use crate::config::Config;
use crate::error::{FetchError, Result, display_chain};
use crate::fetcher::{ResourceFetcher, ResourceSource};
use crate::layout::{self, Layout};
use crate::metadata::BundleMetadata;
use crate::queue::file::QueueFile;
use crate::types::{
    Checksum, FetchedResource, ItemOutcome, PaperId, PassReport, QueueEntry, QueueReport,
    ResolvedSource, WorkItem,
};
use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Works through the retry queue of one archive root
#[derive(Debug)]
pub struct RetryQueueManager {
    layout: Layout,
    queue: QueueFile,
    fetcher: ResourceFetcher,
    item_delay: Duration,
    max_passes: Option<usize>,
    before: VecDeque<QueueEntry>,
    after: VecDeque<QueueEntry>,
}

impl RetryQueueManager {
    /// Load the queue file of `config.root`
    pub fn new(config: &Config) -> Result<Self> {
        let layout = Layout::new(config);
        let queue = QueueFile::new(layout.queue_file());
        let before: VecDeque<QueueEntry> = queue.load()?.into();
        info!(path = ?queue.path(), entries = before.len(), "retry queue loaded");

        Ok(Self {
            fetcher: ResourceFetcher::new(&config.fetch)?,
            item_delay: config.queue.item_delay,
            max_passes: config.queue.max_passes,
            layout,
            queue,
            before,
            after: VecDeque::new(),
        })
    }

    /// Every pending entry, in the order it would be written
    pub fn pending(&self) -> impl Iterator<Item = &QueueEntry> {
        self.before.iter().chain(self.after.iter())
    }

    /// Number of pending entries
    pub fn len(&self) -> usize {
        self.before.len() + self.after.len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write every pending entry to the queue file
    pub fn persist(&self) -> Result<()> {
        self.queue.persist(self.pending())?;
        debug!(path = ?self.queue.path(), entries = self.len(), "retry queue persisted");
        Ok(())
    }

    /// Pass over the queue until it is empty or the pass limit is reached
    ///
    /// The queue file is rewritten after every pass. If that fails the error
    /// is returned and the file keeps its previous contents.
    pub async fn run(&mut self) -> Result<QueueReport> {
        let mut report = QueueReport::default();

        while !self.before.is_empty() {
            if self.max_passes.is_some_and(|max| report.passes >= max) {
                info!(passes = report.passes, "pass limit reached");
                break;
            }

            let pass = self.run_pass().await;
            report.passes += 1;
            report.fetched += pass.fetched;

            std::mem::swap(&mut self.before, &mut self.after);
            self.persist()?;

            info!(
                pass = report.passes,
                fetched = pass.fetched,
                deferred = pass.deferred,
                failed = pass.failed,
                unparsed = pass.unparsed,
                remaining = pass.remaining(),
                "retry pass complete"
            );
        }

        report.remaining = self.len();
        Ok(report)
    }

    /// Look at every entry of `before` once, moving the ones to keep to `after`
    pub async fn run_pass(&mut self) -> PassReport {
        let mut report = PassReport::default();

        while let Some(front) = self.before.front() {
            let mut entry = front.clone();
            let mut attempted = false;

            let keep = match &mut entry {
                QueueEntry::Unparsed(line) => {
                    warn!(line = %line, "keeping unparsable queue line");
                    report.unparsed += 1;
                    true
                }
                QueueEntry::Item(item) => match layout::parse_article(&item.filename) {
                    None => {
                        warn!(filename = %item.filename, "keeping queue item with unrecognised filename");
                        report.unparsed += 1;
                        true
                    }
                    Some((paper_id, _)) => {
                        attempted = true;
                        match self.attempt(item, &paper_id).await {
                            ItemOutcome::Fetched => {
                                report.fetched += 1;
                                false
                            }
                            ItemOutcome::Deferred => {
                                debug!(filename = %item.filename, "bundle not available yet");
                                report.deferred += 1;
                                true
                            }
                            ItemOutcome::Failed(e) => {
                                warn!(
                                    filename = %item.filename,
                                    error = %display_chain(&e),
                                    "retry failed"
                                );
                                report.failed += 1;
                                true
                            }
                        }
                    }
                },
            };

            // no await between these two: the entry is always in exactly one list
            self.before.pop_front();
            if keep {
                self.after.push_back(entry);
            }

            if attempted {
                tokio::time::sleep(self.item_delay).await;
            }
        }

        report
    }

    async fn attempt(&self, item: &mut WorkItem, paper_id: &PaperId) -> ItemOutcome {
        let marker = self.layout.marker_path(paper_id);
        let bundle_present = tokio::fs::try_exists(&marker).await.unwrap_or(false);
        if !item.is_resolved() && !bundle_present {
            return ItemOutcome::Deferred;
        }

        match self.fetch_item(item, paper_id, &marker).await {
            Ok(fetched) => {
                info!(
                    filename = %item.filename,
                    path = ?fetched.path,
                    reused = fetched.reused,
                    "queued resource fetched"
                );
                ItemOutcome::Fetched
            }
            Err(e) => ItemOutcome::Failed(e),
        }
    }

    async fn fetch_item(
        &self,
        item: &mut WorkItem,
        paper_id: &PaperId,
        marker: &Path,
    ) -> std::result::Result<FetchedResource, FetchError> {
        let bundle_dir =
            tokio::fs::canonicalize(marker)
                .await
                .map_err(|source| FetchError::BundleUnavailable {
                    path: marker.to_path_buf(),
                    source,
                })?;
        let target = bundle_dir.join(&item.filename);

        if let Some(resolved) = &item.resolved {
            let checksum = Checksum::infer(&resolved.checksum)?;
            return self
                .fetcher
                .fetch(&target, Some(&checksum), &resolved.url)
                .await;
        }

        let metadata_path = bundle_dir.join(layout::metadata_name(paper_id));
        let metadata = BundleMetadata::load(&metadata_path).await?;
        let entry = metadata
            .find_resource(&item.filename)
            .ok_or_else(|| FetchError::ResourceNotFound {
                filename: item.filename.clone(),
            })?;
        let source = ResourceSource::from_entry(entry)?;

        // later passes go straight to the fetch
        item.resolved = Some(ResolvedSource {
            checksum: source.checksum.hex.clone(),
            url: source.url.clone(),
        });

        self.fetcher
            .fetch(&target, Some(&source.checksum), &source.url)
            .await
    }
}
