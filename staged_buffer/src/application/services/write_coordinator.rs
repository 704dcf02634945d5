// /////////////////////////////////////////////////////////////////////////////
// Staged Event Buffer
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Write Coordinator
//!
//! The transactional admission path of the buffer: [`StagedBuffer::write`]
//! appends a batch of per-metadata payloads across one or more chunks, with
//! per-chunk locking, group commit, and a splitting protocol for payloads
//! that cannot fit into a single chunk.
//!
//! ## Phases of a Write
//!
//! 1. **Admission**: reject immediately with an overflow error when staged
//!    plus queued bytes already reach the total limit.
//! 2. **Operate**: for each `(metadata, records)` pair, append into the
//!    metadata's staged chunk (or, when splitting, into fresh *unstaged*
//!    chunks). Every touched chunk's lock is acquired and *kept held*.
//! 3. **Commit**: commit each operated chunk. The first commit is the
//!    point of no return — its failure aborts the write and rolls everything
//!    back. Later failures roll back only their own chunk and are reported
//!    after publication. Each chunk's lock is released as it completes.
//! 4. **Publish**: with no chunk lock held, re-acquire the buffer-global
//!    lock once: account staged bytes, enqueue chunks that are full (or when
//!    the caller asked to enqueue), queue unstaged overflow chunks, and
//!    promote at most one unstaged chunk into the freed stage slot.
//!
//! ## Lock Ordering
//!
//! The coordinator may hold many chunk locks at once, but never acquires the
//! buffer-global lock while holding any of them: all chunk locks are
//! released at the end of the commit phase, before publication. Inverting
//! this order deadlocks when two writes interleave on overlapping metadata.
//!
//! ## Retry Signals
//!
//! `ShouldRetry` (the `Retry` variants below) is strictly internal: it
//! restarts `write_once` or `write_step_by_step` after a racing enqueue
//! invalidated the target chunk, or after a chunk had to be flushed to make
//! room. It never escapes to callers.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{error, warn};

use staged_buffer_domain::{BufferError, ChunkId, ChunkState, Metadata, Record};

use super::buffer_service::StagedBuffer;
use super::chunk_handle::{ChunkHandle, OwnedChunkGuard};

/// Initial number of slices a too-large payload is split into.
///
/// A tenth of the original payload is small enough to fit into existing
/// chunks in most cases, while keeping the number of append operations low.
const DEFAULT_SPLITS_COUNT: usize = 10;

/// Serializes a batch of records into one contiguous byte payload.
///
/// Supplied by the producer when records should be formatted as a unit (the
/// record count is taken from the slice length). The formatter may be called
/// several times for different sub-slices while a payload is being split.
pub type RecordFormatter = dyn Fn(&[Record]) -> Result<Vec<u8>, BufferError> + Send + Sync;

/// Per-write options.
#[derive(Clone, Copy, Default)]
pub struct WriteOptions<'a> {
    /// Batch formatter; when absent, records are appended individually
    pub formatter: Option<&'a RecordFormatter>,
    /// Enqueue every written-to staged chunk after the write, full or not
    pub enqueue: bool,
}

/// Outcome of one `write_once` attempt.
enum WriteFailure {
    /// Restart the attempt; optionally flush the staged chunk first
    Retry { enqueue_before_retry: bool },
    /// Surface to the caller
    Fatal(BufferError),
}

/// Outcome of one `write_step_by_step` attempt.
enum StepFailure {
    /// Restart with `splits_count` slices; optionally flush the staged
    /// chunk first
    Retry {
        enqueue_before_retry: bool,
        splits_count: usize,
    },
    /// Surface to the caller
    Fatal(BufferError),
}

/// A chunk the current write touched, with its lock still held.
struct OperatedChunk {
    handle: ChunkHandle,
    guard: OwnedChunkGuard,
}

/// Callback invoked for every chunk a write touches, with the chunk's lock
/// transferred in (held until the commit phase releases it).
type OperateCallback<'a> = dyn FnMut(ChunkHandle, OwnedChunkGuard, u64) + 'a;

impl StagedBuffer {
    /// Admits a batch of per-metadata payloads.
    ///
    /// The batch is atomic with respect to overflow admission, but commits
    /// per chunk: chunks that commit successfully are published even when a
    /// later chunk's commit fails, and only the first backend error is
    /// returned. Chunks that never committed are rolled back (and purged if
    /// they were unstaged overflow chunks) before this method returns.
    ///
    /// # Errors
    /// * `BufferError::Overflow` - staged plus queued bytes reach the total
    ///   limit; nothing is written
    /// * `BufferError::ChunkOverflow` - a single record exceeds the chunk
    ///   size limit and can never be buffered
    /// * backend errors from append, commit, or enqueue operations
    pub fn write(&self, batch: &[(Arc<Metadata>, Vec<Record>)], options: &WriteOptions<'_>) -> Result<(), BufferError> {
        if batch.is_empty() {
            return Ok(());
        }
        {
            let st = self.state.lock();
            if !self.limits.storable(st.stage_size.max(0) as u64, st.queue_size.max(0) as u64) {
                return Err(BufferError::overflow(format!(
                    "buffer space has too many data: stage_size={}, queue_size={}, total_limit_size={}",
                    st.stage_size,
                    st.queue_size,
                    self.limits.total_limit_size()
                )));
            }
        }

        // Lock chunks in a stable order across threads: iterate the batch in
        // metadata order before acquiring any chunk lock.
        let mut ordered: Vec<&(Arc<Metadata>, Vec<Record>)> = batch.iter().collect();
        ordered.sort_by(|a, b| a.0.cmp(&b.0));

        let mut operated: Vec<OperatedChunk> = Vec::new();
        let result = self.write_and_publish(&ordered, options, &mut operated);

        // Cleanup path, always run: chunks that never committed are rolled
        // back, unstaged overflow chunks are purged so backend state cannot
        // leak, and every remaining lock is released. Errors here are
        // swallowed — there is no safe recovery.
        for op in operated.drain(..) {
            let mut chunk = op.guard.borrow_mut();
            let _ = chunk.rollback();
            if chunk.is_unstaged() {
                let _ = chunk.purge();
            }
        }

        result
    }

    /// Operate, commit, and publish phases of [`write`](StagedBuffer::write).
    ///
    /// On return, `operated` holds exactly the chunks that never reached a
    /// successful commit; the caller's cleanup path rolls them back.
    fn write_and_publish(
        &self,
        ordered: &[&(Arc<Metadata>, Vec<Record>)],
        options: &WriteOptions<'_>,
        operated: &mut Vec<OperatedChunk>,
    ) -> Result<(), BufferError> {
        let mut unstaged_chunks: HashMap<Arc<Metadata>, Vec<ChunkHandle>> = HashMap::new();
        let mut staged_bytesizes: HashMap<ChunkId, u64> = HashMap::new();
        let mut chunks_to_enqueue: Vec<ChunkHandle> = Vec::new();
        let mut commit_errors: Vec<BufferError> = Vec::new();

        // Operate phase: every touched chunk ends up in `operated` with its
        // lock held.
        for (metadata, records) in ordered.iter().map(|pair| (&pair.0, &pair.1)) {
            if records.is_empty() {
                continue;
            }
            let mut call_staged: HashMap<ChunkId, u64> = HashMap::new();
            self.write_once(metadata, records, options.formatter, &mut |handle, guard, adding_bytesize| {
                {
                    let chunk = guard.borrow();
                    if chunk.is_staged() {
                        // Last write wins within one call: a retried
                        // step-by-step pass rolls back the bytes an earlier
                        // pass reported for the same chunk.
                        call_staged.insert(handle.unique_id(), adding_bytesize);
                    } else if chunk.is_unstaged() {
                        unstaged_chunks.entry(Arc::clone(metadata)).or_default().push(handle.clone());
                    }
                }
                operated.push(OperatedChunk { handle, guard });
            })?;
            for (chunk_id, bytes) in call_staged {
                *staged_bytesizes.entry(chunk_id).or_insert(0) += bytes;
            }
        }

        if operated.is_empty() {
            return Ok(());
        }

        // Commit phase: chunk locks are held, the global lock is not. The
        // first commit decides the fate of the write as a whole.
        let first = operated.remove(0);
        let first_commit = {
            let mut chunk = first.guard.borrow_mut();
            chunk.commit()
        };
        if let Err(e) = first_commit {
            operated.insert(0, first);
            return Err(e);
        }
        if self.enqueue_eligible(&first, options.enqueue) {
            chunks_to_enqueue.push(first.handle.clone());
        }
        drop(first.guard); // release this chunk's lock

        // Remaining chunks commit on their own; a failure rolls back and
        // releases just that chunk, and the first error is raised after
        // publication.
        while !operated.is_empty() {
            let op = operated.remove(0);
            let commit_result = {
                let mut chunk = op.guard.borrow_mut();
                chunk.commit()
            };
            match commit_result {
                Ok(()) => {
                    if self.enqueue_eligible(&op, options.enqueue) {
                        chunks_to_enqueue.push(op.handle.clone());
                    }
                }
                Err(e) => {
                    {
                        let mut chunk = op.guard.borrow_mut();
                        let _ = chunk.rollback();
                        if chunk.is_unstaged() {
                            let _ = chunk.purge();
                        }
                    }
                    staged_bytesizes.remove(&op.handle.unique_id());
                    commit_errors.push(e);
                }
            }
            drop(op.guard);
        }

        // Publish phase: all chunk locks released; take the global lock once
        // so observers see the whole write at once.
        {
            let mut st = self.state.lock();
            // Unconditional even for chunks a concurrent actor has already
            // enqueued: that enqueue subtracted the chunk's full bytesize
            // (these bytes included), so the addition balances it.
            st.stage_size += staged_bytesizes.drain().map(|(_, bytes)| bytes).sum::<u64>() as i64;
            for handle in chunks_to_enqueue.drain(..) {
                let (state, full) = {
                    let guard = handle.lock();
                    let chunk = guard.borrow();
                    (
                        chunk.state(),
                        self.limits.chunk_size_full(chunk.bytesize(), chunk.record_count()),
                    )
                };
                match state {
                    ChunkState::Staged if options.enqueue || full => {
                        self.enqueue_chunk_inner(&mut st, handle.metadata())?;
                        // Promote at most one unstaged sibling into the
                        // freed stage slot.
                        if let Some(candidates) = unstaged_chunks.get_mut(handle.metadata().as_ref()) {
                            if let Some(promoted) = candidates.pop() {
                                let bytesize = {
                                    let guard = promoted.lock();
                                    let mut chunk = guard.borrow_mut();
                                    let promotable = chunk.is_unstaged()
                                        && !self.limits.chunk_size_full(chunk.bytesize(), chunk.record_count());
                                    if promotable {
                                        chunk.mark_staged();
                                        Some(chunk.bytesize())
                                    } else {
                                        None
                                    }
                                };
                                if let Some(bytesize) = bytesize {
                                    st.stage_size += bytesize as i64;
                                    let key = Arc::clone(promoted.metadata());
                                    st.stage.insert(key, promoted);
                                }
                            }
                        }
                    }
                    ChunkState::Unstaged => {
                        self.enqueue_unstaged_chunk_inner(&mut st, handle)?;
                    }
                    // Already enqueued, promoted, or closed by a concurrent
                    // actor (or by an earlier iteration of this loop).
                    _ => {}
                }
            }
        }

        if !commit_errors.is_empty() {
            error!(count = commit_errors.len(), "error occurred in committing chunks");
            return Err(commit_errors.remove(0));
        }
        Ok(())
    }

    /// A committed chunk goes to the queue when the caller asked for it,
    /// when it is unstaged overflow, or when it is full.
    fn enqueue_eligible(&self, op: &OperatedChunk, enqueue: bool) -> bool {
        let chunk = op.guard.borrow();
        enqueue || chunk.is_unstaged() || self.limits.chunk_size_full(chunk.bytesize(), chunk.record_count())
    }

    /// Appends one payload into the metadata's staged chunk, retrying until
    /// the payload is stored or found unstorable.
    fn write_once(
        &self,
        metadata: &Arc<Metadata>,
        records: &[Record],
        formatter: Option<&RecordFormatter>,
        callback: &mut OperateCallback<'_>,
    ) -> Result<(), BufferError> {
        loop {
            match self.try_write_once(metadata, records, formatter, callback) {
                Ok(()) => return Ok(()),
                Err(WriteFailure::Retry { enqueue_before_retry }) => {
                    if enqueue_before_retry {
                        self.enqueue_chunk(metadata)?;
                    }
                }
                Err(WriteFailure::Fatal(e)) => return Err(e),
            }
        }
    }

    fn try_write_once(
        &self,
        metadata: &Arc<Metadata>,
        records: &[Record],
        formatter: Option<&RecordFormatter>,
        callback: &mut OperateCallback<'_>,
    ) -> Result<(), WriteFailure> {
        let handle = self.staged_chunk_for(metadata).map_err(WriteFailure::Fatal)?;

        let guard = handle.lock_arc();
        // Between the stage lookup and this lock acquisition another thread
        // may have enqueued the chunk; detect it and restart.
        if !guard.borrow().is_staged() {
            return Err(WriteFailure::Retry {
                enqueue_before_retry: false,
            });
        }

        let (original_bytesize, empty_chunk) = {
            let chunk = guard.borrow();
            (chunk.bytesize(), chunk.is_empty())
        };

        let append_result = {
            let mut chunk = guard.borrow_mut();
            match formatter {
                Some(format) => format(records).and_then(|serialized| chunk.concat(&serialized, records.len())),
                None => chunk.append(records),
            }
        };
        if let Err(e) = append_result {
            let _ = guard.borrow_mut().rollback();
            return Err(WriteFailure::Fatal(e));
        }

        let (bytesize, record_count) = {
            let chunk = guard.borrow();
            (chunk.bytesize(), chunk.record_count())
        };
        let adding_bytesize = bytesize - original_bytesize;

        if self.limits.chunk_size_over(bytesize, record_count) {
            guard.borrow_mut().rollback().map_err(WriteFailure::Fatal)?;
            if formatter.is_some() {
                if !empty_chunk {
                    // A formatted event stream should land in one chunk as
                    // far as possible; flush the current chunk and retry
                    // against a fresh one.
                    drop(guard);
                    return Err(WriteFailure::Retry {
                        enqueue_before_retry: true,
                    });
                }
                warn!(
                    %metadata,
                    adding_bytesize,
                    chunk_limit_size = self.limits.chunk_limit_size(),
                    "chunk size limit exceeds for an emitted event stream"
                );
            }
            drop(guard);
            // The payload cannot land in one piece; slice it across chunks.
            return self
                .write_step_by_step(metadata, records, formatter, DEFAULT_SPLITS_COUNT, callback)
                .map_err(WriteFailure::Fatal);
        }

        callback(handle, guard, adding_bytesize); // chunk lock stays held
        Ok(())
    }

    /// Fetches the staged chunk for `metadata`, creating and staging a fresh
    /// one under the global lock when none exists.
    fn staged_chunk_for(&self, metadata: &Arc<Metadata>) -> Result<ChunkHandle, BufferError> {
        let mut st = self.state.lock();
        match st.stage.get(metadata.as_ref()) {
            Some(handle) => Ok(handle.clone()),
            None => {
                let chunk = self.store.generate_chunk(Arc::clone(metadata))?;
                let handle = ChunkHandle::new(chunk);
                handle.with_chunk_mut(|c| c.mark_staged());
                st.stage.insert(Arc::clone(metadata), handle.clone());
                Ok(handle)
            }
        }
    }

    /// Slices an oversized payload and spreads it across the staged chunk
    /// and fresh unstaged chunks, retrying with finer slices as needed.
    fn write_step_by_step(
        &self,
        metadata: &Arc<Metadata>,
        records: &[Record],
        formatter: Option<&RecordFormatter>,
        initial_splits_count: usize,
        callback: &mut OperateCallback<'_>,
    ) -> Result<(), BufferError> {
        let mut splits_count = initial_splits_count;
        loop {
            match self.try_write_step_by_step(metadata, records, formatter, splits_count, callback) {
                Ok(()) => return Ok(()),
                Err(StepFailure::Retry {
                    enqueue_before_retry,
                    splits_count: next_splits_count,
                }) => {
                    if enqueue_before_retry {
                        self.enqueue_chunk(metadata)?;
                    }
                    splits_count = next_splits_count;
                }
                Err(StepFailure::Fatal(e)) => return Err(e),
            }
        }
    }

    fn try_write_step_by_step(
        &self,
        metadata: &Arc<Metadata>,
        records: &[Record],
        formatter: Option<&RecordFormatter>,
        splits_count: usize,
        callback: &mut OperateCallback<'_>,
    ) -> Result<(), StepFailure> {
        let splits = slice_records(records, splits_count);

        let mut staged_chunk_used = false;
        // Chunks this attempt touched; all rolled back (and purged when
        // unstaged) if the attempt has to be retried.
        let mut modified_chunks: Vec<ChunkHandle> = Vec::new();
        let mut writing_splits_index = 0;

        let attempt = (|| -> Result<(), StepFailure> {
            while writing_splits_index < splits.len() {
                // The first target is the metadata's staged chunk; later
                // targets are fresh unstaged chunks, never inserted into the
                // stage map (staging them mid-split would complicate resume
                // recovery).
                let handle = if staged_chunk_used {
                    let chunk = self.store.generate_chunk(Arc::clone(metadata)).map_err(StepFailure::Fatal)?;
                    ChunkHandle::new(chunk)
                } else {
                    self.staged_chunk_for(metadata).map_err(StepFailure::Fatal)?
                };

                let guard = handle.lock_arc();
                if !guard.borrow().is_writable() {
                    return Err(StepFailure::Retry {
                        enqueue_before_retry: false,
                        splits_count,
                    });
                }
                if guard.borrow().is_staged() {
                    staged_chunk_used = true;
                }
                modified_chunks.push(handle.clone());

                let original_bytesize = guard.borrow().bytesize();
                let fill_result = (|| -> Result<(), StepFailure> {
                    while writing_splits_index < splits.len() {
                        let split = splits[writing_splits_index];
                        let before_bytesize = guard.borrow().bytesize();

                        let append_result = {
                            let mut chunk = guard.borrow_mut();
                            match formatter {
                                Some(format) => {
                                    format(split).and_then(|serialized| chunk.concat(&serialized, split.len()))
                                }
                                None => chunk.append(split),
                            }
                        };
                        append_result.map_err(StepFailure::Fatal)?;

                        let (bytesize, record_count) = {
                            let chunk = guard.borrow();
                            (chunk.bytesize(), chunk.record_count())
                        };

                        if self.limits.chunk_size_over(bytesize, record_count) {
                            guard.borrow_mut().rollback().map_err(StepFailure::Fatal)?;

                            if split.len() == 1 && original_bytesize == 0 {
                                // A single record alone exceeds the chunk
                                // limit in a fresh chunk; it can never be
                                // buffered.
                                let record_bytesize = bytesize - before_bytesize;
                                return Err(StepFailure::Fatal(BufferError::chunk_overflow(format!(
                                    "a {} bytes record is larger than buffer chunk limit size ({})",
                                    record_bytesize,
                                    self.limits.chunk_limit_size()
                                ))));
                            }

                            let (rolled_bytesize, rolled_count) = {
                                let chunk = guard.borrow();
                                (chunk.bytesize(), chunk.record_count())
                            };
                            if self.limits.chunk_size_full(rolled_bytesize, rolled_count) || split.len() == 1 {
                                // The chunk is effectively full; flush it
                                // and continue on a fresh one.
                                return Err(StepFailure::Retry {
                                    enqueue_before_retry: true,
                                    splits_count,
                                });
                            }
                            // The split straddles the full/over gap; slice
                            // more finely and retry.
                            return Err(StepFailure::Retry {
                                enqueue_before_retry: false,
                                splits_count: splits_count * 10,
                            });
                        }

                        writing_splits_index += 1;

                        if self.limits.chunk_size_full(bytesize, record_count) {
                            break; // continue with the next target chunk
                        }
                    }
                    Ok(())
                })();

                if let Err(failure) = fill_result {
                    if matches!(failure, StepFailure::Fatal(_)) {
                        // Retries purge through the modified-chunks sweep
                        // below; fatal errors must purge here or the
                        // unstaged chunk leaks.
                        let mut chunk = guard.borrow_mut();
                        if chunk.is_unstaged() {
                            let _ = chunk.purge();
                        }
                    }
                    return Err(failure);
                }

                let final_bytesize = guard.borrow().bytesize();
                callback(handle, guard, final_bytesize - original_bytesize); // lock stays held
            }
            Ok(())
        })();

        match attempt {
            Err(StepFailure::Retry {
                enqueue_before_retry,
                splits_count: next_splits_count,
            }) => {
                // Take back everything this attempt wrote. Chunks already
                // handed to the callback stay locked by it; the reentrant
                // chunk lock lets this same thread roll them back here.
                for handle in &modified_chunks {
                    let guard = handle.lock();
                    let mut chunk = guard.borrow_mut();
                    let _ = chunk.rollback();
                    if chunk.is_unstaged() {
                        let _ = chunk.purge();
                    }
                }
                Err(StepFailure::Retry {
                    enqueue_before_retry,
                    splits_count: next_splits_count,
                })
            }
            other => other,
        }
    }
}

/// Slices `records` into at most `splits_count` consecutive windows.
///
/// The window size follows the original slicing rule: an even division when
/// the count divides the length, otherwise `len / (count - 1)` so the last
/// window carries the remainder.
fn slice_records(records: &[Record], splits_count: usize) -> Vec<&[Record]> {
    if records.is_empty() {
        return Vec::new();
    }
    let count = splits_count.clamp(1, records.len());
    let slice_size = if records.len() % count == 0 {
        records.len() / count
    } else {
        records.len() / (count - 1)
    };
    records.chunks(slice_size).collect()
}
