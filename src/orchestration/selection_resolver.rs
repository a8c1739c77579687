//! # Selection Resolver
//!
//! Turns a job's `ObjectSelection` into a stream of `LiteReference` batches.
//!
//! ## Overview
//!
//! - **Explicit** selections are resolved through the model collaborator in
//!   one call; identifiers that do not exist stay in the stream as failed
//!   references so they are reported instead of dropped. Repeated identifiers
//!   are kept once, in first-seen order.
//! - **Type** and **filter** selections page through the index, sorted by id,
//!   `index_page_size` identifiers at a time. Each page after the first starts
//!   after the last id fetched, so objects the job itself moves out of the
//!   filter do not shift later pages. Only the current page is held in memory.
//!
//! The first page is fetched when the stream is opened. A selection that cannot
//! be resolved at all (unknown filter field, index down past every retry) fails
//! `open` with `PluginError::Resolution` before any object is touched. A page
//! fetch failing later surfaces from `next_batch` and is accounted by the
//! caller for the objects that were never yielded.

use super::backoff::BackoffPolicy;
use crate::config::OrchestratorConfig;
use crate::models::{Filter, LiteReference, ObjectSelection, ObjectType, Sorter, Sublist};
use crate::plugins::{PluginError, PluginResult};
use crate::services::{IndexError, IndexResult, IndexService, ModelError, ModelService};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct SelectionResolver {
    model: Arc<dyn ModelService>,
    index: Arc<dyn IndexService>,
    page_size: usize,
    backoff: BackoffPolicy,
    commit_before_resolve: bool,
}

impl SelectionResolver {
    pub fn new(
        model: Arc<dyn ModelService>,
        index: Arc<dyn IndexService>,
        config: &OrchestratorConfig,
    ) -> Self {
        Self {
            model,
            index,
            page_size: config.index_page_size.max(1),
            backoff: BackoffPolicy::from(&config.retry),
            commit_before_resolve: config.commit_index_before_resolve,
        }
    }

    pub async fn open(&self, selection: &ObjectSelection) -> PluginResult<ReferenceStream> {
        match selection {
            ObjectSelection::Explicit { object_type, ids } => {
                self.open_explicit(object_type, ids).await
            }
            ObjectSelection::AllOfType { object_type } => {
                self.open_index(object_type, Filter::all()).await
            }
            ObjectSelection::Filter {
                object_type,
                filter,
            } => self.open_index(object_type, filter.clone()).await,
        }
    }

    async fn open_explicit(
        &self,
        object_type: &ObjectType,
        ids: &[String],
    ) -> PluginResult<ReferenceStream> {
        let mut seen = HashSet::with_capacity(ids.len());
        let unique: Vec<String> = ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect();
        if unique.len() < ids.len() {
            debug!(
                object_type = %object_type,
                repeated = ids.len() - unique.len(),
                "Dropped repeated identifiers from explicit selection"
            );
        }

        let model = &self.model;
        let ids = unique.as_slice();
        let references = self
            .backoff
            .retry(
                "model_resolve",
                move || model.resolve(object_type, ids),
                ModelError::is_unavailable,
            )
            .await
            .map_err(|error| PluginError::Resolution(error.to_string()))?;

        let unresolved = references.iter().filter(|r| !r.is_resolved()).count();
        info!(
            object_type = %object_type,
            requested = ids.len(),
            unresolved,
            "🎯 Explicit selection resolved"
        );
        Ok(ReferenceStream::fixed(references))
    }

    async fn open_index(
        &self,
        object_type: &ObjectType,
        filter: Filter,
    ) -> PluginResult<ReferenceStream> {
        if self.commit_before_resolve {
            if let Err(error) = self.index.commit(object_type).await {
                warn!(object_type = %object_type, error = %error, "Index commit before resolve failed");
            }
        }

        let first = fetch_page(
            self.index.as_ref(),
            &self.backoff,
            object_type,
            &filter,
            &Sublist::new(0, self.page_size),
        )
        .await
        .map_err(|error| PluginError::Resolution(error.to_string()))?;

        info!(
            object_type = %object_type,
            total = first.total_count,
            page_size = self.page_size,
            "🎯 Index selection opened"
        );

        let total = first.total_count;
        let mut stream = ReferenceStream {
            source: Source::Index(IndexCursor {
                index: Arc::clone(&self.index),
                backoff: self.backoff.clone(),
                object_type: object_type.clone(),
                filter,
                page_size: self.page_size,
                last_id: None,
            }),
            buffer: VecDeque::new(),
            total,
            yielded: 0,
        };
        stream.accept_page(first);
        Ok(stream)
    }
}

async fn fetch_page(
    index: &dyn IndexService,
    backoff: &BackoffPolicy,
    object_type: &ObjectType,
    filter: &Filter,
    sublist: &Sublist,
) -> Result<IndexResult, IndexError> {
    let sorter = Sorter::by_id();
    let sorter = &sorter;
    backoff
        .retry(
            "index_find",
            move || index.find(object_type, filter, sorter, sublist.clone()),
            IndexError::is_unavailable,
        )
        .await
}

struct IndexCursor {
    index: Arc<dyn IndexService>,
    backoff: BackoffPolicy,
    object_type: ObjectType,
    filter: Filter,
    page_size: usize,
    /// Last id taken from the index; the next page starts after it
    last_id: Option<String>,
}

enum Source {
    Fixed,
    Index(IndexCursor),
}

/// Lazily paged sequence of references with a known total
pub struct ReferenceStream {
    source: Source,
    buffer: VecDeque<LiteReference>,
    total: usize,
    yielded: usize,
}

impl ReferenceStream {
    /// Stream over references already in memory
    pub fn fixed(references: Vec<LiteReference>) -> Self {
        Self {
            source: Source::Fixed,
            total: references.len(),
            buffer: references.into(),
            yielded: 0,
        }
    }

    /// Objects the selection accounts for
    pub fn total(&self) -> usize {
        self.total
    }

    /// Objects not yielded yet
    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.yielded)
    }

    /// Next batch of at most `batch_size` references, `None` once exhausted
    pub async fn next_batch(&mut self, batch_size: usize) -> PluginResult<Option<Vec<LiteReference>>> {
        let batch_size = batch_size.max(1);
        while self.buffer.len() < batch_size && self.buffered_total() < self.total {
            if !self.fetch_next_page().await? {
                break;
            }
        }

        if self.buffer.is_empty() {
            if self.remaining() > 0 {
                return Err(PluginError::Resolution(format!(
                    "Index returned fewer identifiers than the {} it counted",
                    self.total
                )));
            }
            return Ok(None);
        }

        let take = batch_size.min(self.buffer.len());
        let batch: Vec<LiteReference> = self.buffer.drain(..take).collect();
        self.yielded += batch.len();
        Ok(Some(batch))
    }

    /// Drain every remaining reference into memory
    pub async fn collect_all(&mut self) -> PluginResult<Vec<LiteReference>> {
        let mut references = Vec::with_capacity(self.remaining());
        while let Some(batch) = self.next_batch(self.total.max(1)).await? {
            references.extend(batch);
        }
        Ok(references)
    }

    fn buffered_total(&self) -> usize {
        self.yielded + self.buffer.len()
    }

    /// Returns false when the source has nothing more to give
    async fn fetch_next_page(&mut self) -> PluginResult<bool> {
        let Source::Index(cursor) = &self.source else {
            return Ok(false);
        };
        let sublist = match &cursor.last_id {
            Some(last_id) => Sublist::after(last_id.clone(), cursor.page_size),
            None => Sublist::new(0, cursor.page_size),
        };
        let page = fetch_page(
            cursor.index.as_ref(),
            &cursor.backoff,
            &cursor.object_type,
            &cursor.filter,
            &sublist,
        )
        .await
        .map_err(|error| PluginError::Resolution(error.to_string()))?;

        if page.ids.is_empty() {
            return Ok(false);
        }
        self.accept_page(page);
        Ok(true)
    }

    fn accept_page(&mut self, page: IndexResult) {
        let Source::Index(cursor) = &mut self.source else {
            return;
        };
        // never yield more than the count the job was sized with
        let room = self.total.saturating_sub(self.yielded + self.buffer.len());
        let fetched = page.ids.len();
        let ids: Vec<String> = page.ids.into_iter().take(room).collect();
        if let Some(last) = ids.last() {
            cursor.last_id = Some(last.clone());
        }
        let object_type = cursor.object_type.clone();
        debug!(
            object_type = %object_type,
            after = cursor.last_id.as_deref().unwrap_or_default(),
            fetched,
            "Fetched index page"
        );
        self.buffer.extend(
            ids.into_iter()
                .map(|id| LiteReference::new(object_type.clone(), id)),
        );
    }
}
