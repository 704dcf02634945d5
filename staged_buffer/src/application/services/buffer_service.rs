// /////////////////////////////////////////////////////////////////////////////
// Staged Event Buffer
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Staged Buffer Engine
//!
//! The `StagedBuffer` application service owns all buffer state and exposes
//! the thread-safe operations producers and consumers use. It coordinates
//! three collections, each holding chunks in exactly one lifecycle stage:
//!
//! - **Stage**: per-metadata map of the currently accumulating chunk
//! - **Queue**: FIFO of chunks ready for delivery
//! - **Dequeued**: chunks handed to a consumer, awaiting acknowledgment
//!
//! A chunk is in at most one of these at any instant; acknowledgment
//! (`purge_chunk`) or close removes it entirely.
//!
//! ## Locking Discipline
//!
//! One buffer-global lock guards the three collections, the per-metadata
//! queued counters, the size counters, and the metadata registry. Each public
//! operation acquires it exactly once; internal helpers take
//! `&mut BufferState` so nested table operations reuse the already-held lock
//! instead of re-acquiring it.
//!
//! Per-chunk locks may be acquired *while holding* the global lock (the
//! short queue-maintenance critical sections below do this), but never the
//! other way around: a thread holding any chunk lock must release it before
//! touching the global lock. The write coordinator is structured around this
//! rule; see [`write_coordinator`](super::write_coordinator).
//!
//! ## Size Accounting
//!
//! `stage_size` tracks bytes across staged chunks. `queue_size` tracks bytes
//! across queued *and dequeued* chunks: dequeueing hands a chunk to a
//! consumer without releasing its memory, so the bytes stay counted until
//! the chunk is acknowledged and purged. `storable` admits writes while
//! `stage_size + queue_size` is strictly below the configured total limit.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, trace};

use staged_buffer_domain::{BufferError, BufferLimits, Chunk, ChunkId, ChunkStore, Metadata};

use super::chunk_handle::ChunkHandle;

/// Collections and counters guarded by the buffer-global lock.
pub(crate) struct BufferState {
    /// metadata → currently accumulating chunk; every chunk here is *staged*
    pub(crate) stage: HashMap<Arc<Metadata>, ChunkHandle>,
    /// FIFO of chunks awaiting delivery; every chunk here is *queued*
    pub(crate) queue: VecDeque<ChunkHandle>,
    /// chunk id → chunk handed to a consumer, not yet acknowledged
    pub(crate) dequeued: HashMap<ChunkId, ChunkHandle>,
    /// per-metadata count of chunks currently in `queue`
    pub(crate) queued_num: HashMap<Arc<Metadata>, usize>,
    /// canonical (interned) metadata instances
    pub(crate) metadata_list: Vec<Arc<Metadata>>,
    /// bytes across staged chunks; transiently negative while a concurrent
    /// write's staged bytes are enqueued before they are published
    pub(crate) stage_size: i64,
    /// bytes across queued and dequeued chunks
    pub(crate) queue_size: i64,
}

impl BufferState {
    fn new() -> Self {
        BufferState {
            stage: HashMap::new(),
            queue: VecDeque::new(),
            dequeued: HashMap::new(),
            queued_num: HashMap::new(),
            metadata_list: Vec::new(),
            stage_size: 0,
            queue_size: 0,
        }
    }
}

/// Chunked staging-and-queueing buffer engine.
///
/// All operations are callable from any thread between `start` and `close`.
/// Chunk storage is delegated to the injected [`ChunkStore`] backend; the
/// engine only ever sees chunks through their [`ChunkHandle`]s.
pub struct StagedBuffer {
    pub(crate) store: Arc<dyn ChunkStore>,
    pub(crate) limits: BufferLimits,
    pub(crate) state: Mutex<BufferState>,
}

impl StagedBuffer {
    /// Creates a buffer over the given backend and sizing policy.
    ///
    /// The buffer is inert until [`start`](StagedBuffer::start) recovers the
    /// backend's persisted content.
    pub fn new(store: Arc<dyn ChunkStore>, limits: BufferLimits) -> Self {
        StagedBuffer {
            store,
            limits,
            state: Mutex::new(BufferState::new()),
        }
    }

    /// Gets the sizing policy this buffer enforces
    pub fn limits(&self) -> &BufferLimits {
        &self.limits
    }

    // === Lifecycle =========================================================

    /// Recovers persisted stage and queue content from the backend and
    /// initializes counters and the metadata registry.
    pub fn start(&self) -> Result<(), BufferError> {
        let (stage_map, queue_list) = self.store.resume()?;
        let mut st = self.state.lock();
        for (metadata, chunk) in stage_map {
            let handle = ChunkHandle::new(chunk);
            if !st.metadata_list.contains(&metadata) {
                st.metadata_list.push(Arc::clone(&metadata));
            }
            st.stage_size += handle.bytesize() as i64;
            st.stage.insert(metadata, handle);
        }
        for chunk in queue_list {
            let handle = ChunkHandle::new(chunk);
            let metadata = Arc::clone(handle.metadata());
            if !st.metadata_list.contains(&metadata) {
                st.metadata_list.push(Arc::clone(&metadata));
            }
            *st.queued_num.entry(metadata).or_insert(0) += 1;
            st.queue_size += handle.bytesize() as i64;
            st.queue.push_back(handle);
        }
        debug!(stage_size = st.stage_size, queue_size = st.queue_size, "buffer started");
        Ok(())
    }

    /// Closes every dequeued, queued, and staged chunk and drains the queue
    /// and stage collections. Dequeued handles stay valid for consumers that
    /// still hold them, but their chunks no longer accept operations.
    pub fn close(&self) -> Result<(), BufferError> {
        let mut st = self.state.lock();
        debug!("closing buffer");
        for handle in st.dequeued.values() {
            handle.with_chunk_mut(|c| c.close())?;
        }
        while let Some(handle) = st.queue.pop_front() {
            handle.with_chunk_mut(|c| c.close())?;
        }
        for (_, handle) in st.stage.drain() {
            handle.with_chunk_mut(|c| c.close())?;
        }
        Ok(())
    }

    /// Drops every collection and zeroes all counters. The buffer must be
    /// closed first; terminate performs no chunk operations.
    pub fn terminate(&self) {
        let mut st = self.state.lock();
        st.stage.clear();
        st.queue.clear();
        st.dequeued.clear();
        st.queued_num.clear();
        st.metadata_list.clear();
        st.stage_size = 0;
        st.queue_size = 0;
    }

    // === Metadata registry =================================================

    /// Constructs a fresh (non-interned) metadata value
    pub fn new_metadata(
        timekey: Option<i64>,
        tag: Option<&str>,
        variables: Option<BTreeMap<String, String>>,
    ) -> Metadata {
        Metadata::new(timekey, tag.map(str::to_string), variables)
    }

    /// Interns a metadata value, returning the canonical shared instance.
    ///
    /// Equal descriptors produced at different call sites resolve to the
    /// same `Arc`, so stage and queue bookkeeping can key on it cheaply.
    pub fn add_metadata(&self, metadata: Metadata) -> Arc<Metadata> {
        let mut st = self.state.lock();
        Self::add_metadata_inner(&mut st, metadata)
    }

    fn add_metadata_inner(st: &mut BufferState, metadata: Metadata) -> Arc<Metadata> {
        match st.metadata_list.iter().find(|m| ***m == metadata) {
            Some(existing) => Arc::clone(existing),
            None => {
                let interned = Arc::new(metadata);
                st.metadata_list.push(Arc::clone(&interned));
                interned
            }
        }
    }

    /// Constructs and interns a metadata in one step
    pub fn metadata(
        &self,
        timekey: Option<i64>,
        tag: Option<&str>,
        variables: Option<BTreeMap<String, String>>,
    ) -> Arc<Metadata> {
        self.add_metadata(Self::new_metadata(timekey, tag, variables))
    }

    /// Gets a snapshot of the live metadata list, isolated from concurrent
    /// registry mutation
    pub fn metadata_list(&self) -> Vec<Arc<Metadata>> {
        self.state.lock().metadata_list.clone()
    }

    // === Size and queue queries ============================================

    /// Returns true while the buffer can admit more data
    pub fn storable(&self) -> bool {
        let st = self.state.lock();
        self.limits.storable(st.stage_size.max(0) as u64, st.queue_size.max(0) as u64)
    }

    /// Gets bytes across staged chunks
    pub fn stage_size(&self) -> u64 {
        self.state.lock().stage_size.max(0) as u64
    }

    /// Gets bytes across queued and dequeued chunks
    pub fn queue_size(&self) -> u64 {
        self.state.lock().queue_size.max(0) as u64
    }

    /// Gets the number of staged chunks
    pub fn stage_length(&self) -> usize {
        self.state.lock().stage.len()
    }

    /// Gets the number of queued chunks
    pub fn queue_length(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Returns true when any chunk is queued for delivery
    pub fn is_queued(&self) -> bool {
        !self.state.lock().queue.is_empty()
    }

    /// Returns true when at least one chunk of the given metadata is queued
    pub fn is_queued_for(&self, metadata: &Metadata) -> bool {
        self.state.lock().queued_num.get(metadata).is_some_and(|n| *n > 0)
    }

    /// Gets the record count across currently queued chunks
    pub fn queued_records(&self) -> usize {
        let st = self.state.lock();
        st.queue.iter().map(|handle| handle.record_count()).sum()
    }

    // === Stage and queue maintenance =======================================

    /// Moves the staged chunk of `metadata` onto the delivery queue.
    ///
    /// An empty staged chunk is closed instead of queued (nothing to
    /// deliver). No-op when the metadata has no staged chunk.
    pub fn enqueue_chunk(&self, metadata: &Metadata) -> Result<(), BufferError> {
        let mut st = self.state.lock();
        self.enqueue_chunk_inner(&mut st, metadata)
    }

    pub(crate) fn enqueue_chunk_inner(&self, st: &mut BufferState, metadata: &Metadata) -> Result<(), BufferError> {
        let Some(handle) = st.stage.remove(metadata) else {
            return Ok(());
        };
        trace!(chunk_id = %handle.unique_id(), %metadata, "enqueueing chunk");
        let (is_empty, bytesize) = {
            let guard = handle.lock();
            let mut chunk = guard.borrow_mut();
            let is_empty = chunk.is_empty();
            let bytesize = chunk.bytesize();
            if is_empty {
                chunk.close()?;
            } else {
                chunk.mark_queued();
            }
            (is_empty, bytesize)
        };
        st.stage_size -= bytesize as i64;
        if !is_empty {
            let metadata = Arc::clone(handle.metadata());
            st.queue.push_back(handle);
            *st.queued_num.entry(metadata).or_insert(0) += 1;
            st.queue_size += bytesize as i64;
        }
        Ok(())
    }

    /// Places a never-staged chunk directly onto the delivery queue
    pub fn enqueue_unstaged_chunk(&self, handle: ChunkHandle) -> Result<(), BufferError> {
        let mut st = self.state.lock();
        self.enqueue_unstaged_chunk_inner(&mut st, handle)
    }

    pub(crate) fn enqueue_unstaged_chunk_inner(
        &self,
        st: &mut BufferState,
        handle: ChunkHandle,
    ) -> Result<(), BufferError> {
        trace!(chunk_id = %handle.unique_id(), "enqueueing unstaged chunk");
        let bytesize = {
            let guard = handle.lock();
            let mut chunk = guard.borrow_mut();
            chunk.mark_queued();
            chunk.bytesize()
        };
        let metadata = Arc::clone(handle.metadata());
        st.queue.push_back(handle);
        *st.queued_num.entry(metadata).or_insert(0) += 1;
        st.queue_size += bytesize as i64;
        Ok(())
    }

    /// Enqueues every staged chunk
    pub fn enqueue_all(&self) -> Result<(), BufferError> {
        let mut st = self.state.lock();
        let metadatas: Vec<Arc<Metadata>> = st.stage.keys().cloned().collect();
        for metadata in metadatas {
            self.enqueue_chunk_inner(&mut st, &metadata)?;
        }
        Ok(())
    }

    /// Enqueues the staged chunks the predicate selects
    pub fn enqueue_all_with(
        &self,
        mut predicate: impl FnMut(&Metadata, &dyn Chunk) -> bool,
    ) -> Result<(), BufferError> {
        let mut st = self.state.lock();
        let metadatas: Vec<Arc<Metadata>> = st.stage.keys().cloned().collect();
        for metadata in metadatas {
            let Some(handle) = st.stage.get(metadata.as_ref()) else {
                continue;
            };
            let selected = handle.with_chunk(|chunk| predicate(&metadata, chunk));
            if selected {
                self.enqueue_chunk_inner(&mut st, &metadata)?;
            }
        }
        Ok(())
    }

    /// Pops the oldest queued chunk and hands it to the consumer.
    ///
    /// The chunk moves to the dequeued set until it is acknowledged with
    /// [`purge_chunk`](StagedBuffer::purge_chunk) or returned with
    /// [`takeback_chunk`](StagedBuffer::takeback_chunk). Returns `None` on an
    /// empty queue.
    pub fn dequeue_chunk(&self) -> Option<ChunkHandle> {
        let mut st = self.state.lock();
        let handle = st.queue.pop_front()?;
        st.dequeued.insert(handle.unique_id(), handle.clone());
        if let Some(n) = st.queued_num.get_mut(handle.metadata().as_ref()) {
            *n = n.saturating_sub(1);
        }
        Some(handle)
    }

    /// Returns a dequeued chunk to the *head* of the queue for redelivery.
    ///
    /// The taken-back chunk is the next one dequeued, preserving
    /// at-least-once retry ordering. Returns false when the id is not in the
    /// dequeued set.
    pub fn takeback_chunk(&self, chunk_id: ChunkId) -> bool {
        let mut st = self.state.lock();
        let Some(handle) = st.dequeued.remove(&chunk_id) else {
            return false;
        };
        let metadata = Arc::clone(handle.metadata());
        st.queue.push_front(handle);
        *st.queued_num.entry(metadata).or_insert(0) += 1;
        true
    }

    /// Acknowledges a dequeued chunk: releases its backend storage and drops
    /// it from all bookkeeping.
    ///
    /// When no staged or queued chunk of the same metadata remains, the
    /// metadata is retired from the registry. Backend purge errors are
    /// logged and swallowed; the chunk is dropped regardless.
    pub fn purge_chunk(&self, chunk_id: ChunkId) {
        let mut st = self.state.lock();
        let Some(handle) = st.dequeued.remove(&chunk_id) else {
            return;
        };
        let metadata = Arc::clone(handle.metadata());
        let bytesize = handle.bytesize();
        st.queue_size -= bytesize as i64;
        if let Err(e) = handle.with_chunk_mut(|c| c.purge()) {
            error!(chunk_id = %chunk_id, error = %e, "failed to purge buffer chunk");
        }

        let no_stage = !st.stage.contains_key(metadata.as_ref());
        let no_queued = st.queued_num.get(metadata.as_ref()).is_none_or(|n| *n < 1);
        if no_stage && no_queued {
            st.metadata_list.retain(|m| *m != metadata);
            st.queued_num.remove(metadata.as_ref());
        }
    }

    /// Drains and purges every queued chunk and resets the queue accounting.
    ///
    /// Individual purge failures are logged and swallowed so the queue
    /// always ends up empty.
    pub fn clear_queue(&self) {
        let mut st = self.state.lock();
        while let Some(handle) = st.queue.pop_front() {
            trace!(
                chunk_id = %handle.unique_id(),
                bytesize = handle.bytesize(),
                records = handle.record_count(),
                "purging a chunk in queue"
            );
            if let Err(e) = handle.with_chunk_mut(|c| c.purge()) {
                error!(error = %e, "unexpected error while clearing buffer queue");
            }
        }
        st.queue_size = 0;
        st.queued_num.clear();
    }
}
