// /////////////////////////////////////////////////////////////////////////////
// Staged Event Buffer
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Buffer Integration Tests
//!
//! End-to-end tests of the staged buffer engine over the in-memory backend:
//! the write/enqueue/dequeue/purge lifecycle, the splitting protocol, size
//! accounting invariants, and partial-commit failure handling with a
//! misbehaving backend.

use std::collections::HashMap;
use std::sync::Arc;

use staged_buffer::infrastructure::adapters::{MemoryChunk, MemoryChunkStore};
use staged_buffer::{
    BufferError, BufferLimits, Chunk, ChunkId, ChunkState, ChunkStore, Metadata, Record, StagedBuffer, WriteOptions,
};

// ============================================================================
// TEST FIXTURES
// ============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn buffer(chunk_limit: u64, total_limit: u64) -> StagedBuffer {
    let limits = BufferLimits::new(chunk_limit, total_limit, None, 0.95).unwrap();
    let buffer = StagedBuffer::new(Arc::new(MemoryChunkStore::new()), limits);
    buffer.start().unwrap();
    buffer
}

fn record(len: usize) -> Record {
    Record::new(vec![b'x'; len])
}

fn write_one(buffer: &StagedBuffer, metadata: &Arc<Metadata>, len: usize) -> Result<(), BufferError> {
    buffer.write(&[(Arc::clone(metadata), vec![record(len)])], &WriteOptions::default())
}

fn write_one_enqueued(buffer: &StagedBuffer, metadata: &Arc<Metadata>, len: usize) {
    let options = WriteOptions {
        formatter: None,
        enqueue: true,
    };
    buffer.write(&[(Arc::clone(metadata), vec![record(len)])], &options).unwrap();
}

// ============================================================================
// LITERAL END-TO-END SCENARIOS
// ============================================================================

/// A 90-byte write under a 100-byte chunk limit stays staged: one chunk of
/// 90 bytes, nothing queued.
#[test]
fn scenario_small_write_stays_staged() {
    init_tracing();
    let buffer = buffer(100, 1000);
    let m = buffer.metadata(None, Some("app"), None);

    write_one(&buffer, &m, 90).unwrap();

    assert_eq!(buffer.stage_length(), 1);
    assert_eq!(buffer.stage_size(), 90);
    assert_eq!(buffer.queue_length(), 0);
    assert_eq!(buffer.queue_size(), 0);
}

/// A second write that would push the staged chunk over its limit flushes
/// the chunk to the queue and stages the new payload in a fresh chunk;
/// nothing is lost: queue and stage together hold all 110 bytes.
#[test]
fn scenario_overflowing_write_flushes_staged_chunk() {
    let buffer = buffer(100, 1000);
    let m = buffer.metadata(None, Some("app"), None);

    write_one(&buffer, &m, 90).unwrap();
    write_one(&buffer, &m, 20).unwrap();

    assert_eq!(buffer.queue_length(), 1);
    assert_eq!(buffer.queue_size(), 90, "original chunk flushed as-is");
    assert_eq!(buffer.stage_length(), 1);
    assert_eq!(buffer.stage_size(), 20, "new payload staged in a fresh chunk");
    assert_eq!(buffer.queue_size() + buffer.stage_size(), 110);
}

/// A single record larger than the chunk limit can never be buffered: the
/// write fails with a chunk overflow naming the record size, and no sizes
/// change.
#[test]
fn scenario_single_record_over_chunk_limit() {
    let buffer = buffer(100, 1000);
    let m = buffer.metadata(None, Some("app"), None);

    let err = write_one(&buffer, &m, 150).unwrap_err();
    assert!(matches!(err, BufferError::ChunkOverflow(_)));
    assert!(err.to_string().contains("150"), "message names the record size: {}", err);

    assert_eq!(buffer.stage_size(), 0);
    assert_eq!(buffer.queue_size(), 0);
    assert_eq!(buffer.queue_length(), 0);

    // the buffer stays usable: the next admissible write lands normally
    write_one(&buffer, &m, 50).unwrap();
    assert_eq!(buffer.stage_size(), 50);
}

/// Once staged plus queued bytes reach the total limit, any further write is
/// rejected up front with a buffer overflow and no chunk is created.
#[test]
fn scenario_total_limit_rejects_writes() {
    let buffer = buffer(100, 200);
    let m1 = buffer.metadata(None, Some("a"), None);
    let m2 = buffer.metadata(None, Some("b"), None);
    let m3 = buffer.metadata(None, Some("c"), None);

    // 100-byte chunks are full (>= 95% of the limit) and go straight to the
    // queue after each write
    write_one(&buffer, &m1, 100).unwrap();
    write_one(&buffer, &m2, 100).unwrap();
    assert_eq!(buffer.queue_size(), 200);
    assert!(!buffer.storable());

    let err = write_one(&buffer, &m3, 1).unwrap_err();
    assert!(matches!(err, BufferError::Overflow(_)));
    assert_eq!(buffer.queue_length(), 2, "queue unchanged");
    assert_eq!(buffer.stage_length(), 0, "no chunk created for the rejected write");
}

/// When one metadata's backend fails to commit, the other metadata's chunk
/// is still committed and counted; the backend error is surfaced and the
/// failed chunk is rolled back.
#[test]
fn scenario_partial_commit_failure() {
    struct CommitFailChunk {
        inner: MemoryChunk,
    }

    impl Chunk for CommitFailChunk {
        fn unique_id(&self) -> ChunkId {
            self.inner.unique_id()
        }
        fn metadata(&self) -> &Arc<Metadata> {
            self.inner.metadata()
        }
        fn state(&self) -> ChunkState {
            self.inner.state()
        }
        fn mark_staged(&mut self) {
            self.inner.mark_staged();
        }
        fn mark_queued(&mut self) {
            self.inner.mark_queued();
        }
        fn bytesize(&self) -> u64 {
            self.inner.bytesize()
        }
        fn record_count(&self) -> usize {
            self.inner.record_count()
        }
        fn append(&mut self, records: &[Record]) -> Result<(), BufferError> {
            self.inner.append(records)
        }
        fn concat(&mut self, payload: &[u8], record_count: usize) -> Result<(), BufferError> {
            self.inner.concat(payload, record_count)
        }
        fn commit(&mut self) -> Result<(), BufferError> {
            Err(BufferError::io_error("simulated commit failure"))
        }
        fn rollback(&mut self) -> Result<(), BufferError> {
            self.inner.rollback()
        }
        fn purge(&mut self) -> Result<(), BufferError> {
            self.inner.purge()
        }
        fn close(&mut self) -> Result<(), BufferError> {
            self.inner.close()
        }
        fn read(&self) -> Result<Vec<u8>, BufferError> {
            self.inner.read()
        }
    }

    struct FlakyCommitStore {
        fail_tag: &'static str,
    }

    impl ChunkStore for FlakyCommitStore {
        fn generate_chunk(&self, metadata: Arc<Metadata>) -> Result<Box<dyn Chunk>, BufferError> {
            if metadata.tag() == Some(self.fail_tag) {
                Ok(Box::new(CommitFailChunk {
                    inner: MemoryChunk::new(metadata),
                }))
            } else {
                Ok(Box::new(MemoryChunk::new(metadata)))
            }
        }

        fn resume(&self) -> Result<(HashMap<Arc<Metadata>, Box<dyn Chunk>>, Vec<Box<dyn Chunk>>), BufferError> {
            Ok((HashMap::new(), Vec::new()))
        }
    }

    init_tracing();
    let limits = BufferLimits::new(100, 1000, None, 0.95).unwrap();
    let buffer = StagedBuffer::new(Arc::new(FlakyCommitStore { fail_tag: "bad" }), limits);
    buffer.start().unwrap();

    // "a-good" sorts before "bad", so the healthy chunk is the first commit
    let good = buffer.metadata(None, Some("a-good"), None);
    let bad = buffer.metadata(None, Some("bad"), None);

    let batch = vec![
        (Arc::clone(&good), vec![record(50)]),
        (Arc::clone(&bad), vec![record(40)]),
    ];
    let err = buffer.write(&batch, &WriteOptions::default()).unwrap_err();
    assert!(matches!(err, BufferError::IoError(_)), "backend error surfaced: {}", err);

    assert_eq!(buffer.stage_size(), 50, "only the committed chunk's bytes count");
    assert_eq!(buffer.queue_length(), 0);
    assert_eq!(buffer.queue_size(), 0);
}

/// FIFO dequeue with take-back retry: a taken-back chunk is redelivered
/// first, and acknowledging it removes its bytes from queue accounting.
#[test]
fn scenario_dequeue_takeback_purge() {
    let buffer = buffer(100, 1000);
    let m1 = buffer.metadata(None, Some("a"), None);
    let m2 = buffer.metadata(None, Some("b"), None);
    let m3 = buffer.metadata(None, Some("c"), None);

    write_one_enqueued(&buffer, &m1, 30);
    write_one_enqueued(&buffer, &m2, 40);
    write_one_enqueued(&buffer, &m3, 50);
    assert_eq!(buffer.queue_length(), 3);
    assert_eq!(buffer.queue_size(), 120);

    let a = buffer.dequeue_chunk().unwrap();
    assert_eq!(a.bytesize(), 30);
    assert!(buffer.takeback_chunk(a.unique_id()));

    let again = buffer.dequeue_chunk().unwrap();
    assert_eq!(again.unique_id(), a.unique_id(), "taken-back chunk is redelivered first");

    buffer.purge_chunk(again.unique_id());
    assert_eq!(buffer.queue_size(), 90, "purge releases the chunk's bytes");

    let b = buffer.dequeue_chunk().unwrap();
    assert_eq!(b.bytesize(), 40);
    let c = buffer.dequeue_chunk().unwrap();
    assert_eq!(c.bytesize(), 50);
    assert!(buffer.dequeue_chunk().is_none());

    buffer.purge_chunk(b.unique_id());
    buffer.purge_chunk(c.unique_id());
    assert_eq!(buffer.queue_size(), 0);
    assert!(buffer.metadata_list().is_empty(), "all metadata retired after final purges");
}

// ============================================================================
// LAWS
// ============================================================================

/// Enqueue on a metadata whose staged chunk is empty closes the chunk and
/// leaves the queue untouched.
#[test]
fn law_enqueue_on_empty_staged_chunk_is_idempotent() {
    let buffer = buffer(100, 1000);
    let m = buffer.metadata(None, Some("app"), None);

    // seed the queue with one real chunk
    write_one_enqueued(&buffer, &m, 40);
    assert_eq!(buffer.queue_length(), 1);

    // leave an empty staged chunk behind via a failed oversized write
    assert!(write_one(&buffer, &m, 150).is_err());
    assert_eq!(buffer.stage_length(), 1);

    buffer.enqueue_chunk(&m).unwrap();
    assert_eq!(buffer.queue_length(), 1, "queue unchanged");
    assert_eq!(buffer.queue_size(), 40);
    assert_eq!(buffer.stage_length(), 0);
    assert_eq!(buffer.stage_size(), 0);
}

/// Oversized payloads are split ever more finely (×10 per retry) until every
/// slice fits; no byte is lost and the leftover slice stays staged.
#[test]
fn law_split_refinement_stores_every_byte() {
    init_tracing();
    let limits = BufferLimits::new(1000, 100_000, None, 0.95).unwrap();
    let buffer = StagedBuffer::new(Arc::new(MemoryChunkStore::new()), limits);
    buffer.start().unwrap();
    let m = buffer.metadata(None, Some("bulk"), None);

    // 24 records of 110 bytes: the initial 2-record slices straddle the
    // full/over gap (220 > 1000 - 950), forcing the ×10 refinement down to
    // single-record slices
    let records: Vec<Record> = (0..24).map(|_| record(110)).collect();
    buffer.write(&[(Arc::clone(&m), records)], &WriteOptions::default()).unwrap();

    assert_eq!(buffer.queue_size() + buffer.stage_size(), 24 * 110, "no byte lost");
    assert_eq!(buffer.queue_length(), 2, "two full chunks delivered");
    assert_eq!(buffer.queue_size(), 1980);
    assert_eq!(buffer.stage_length(), 1, "remainder staged (promoted overflow chunk)");
    assert_eq!(buffer.stage_size(), 660);
    assert_eq!(buffer.queued_records(), 18);
}

/// At split size one, either the record fits alone in a fresh chunk or the
/// write fails with a chunk overflow.
#[test]
fn law_split_terminates_at_single_record() {
    let buffer = buffer(100, 10_000);
    let m = buffer.metadata(None, Some("app"), None);

    // fits alone: a 99-byte record lands even though the staged chunk held
    // 90 bytes already (the staged chunk is flushed first)
    write_one(&buffer, &m, 90).unwrap();
    write_one(&buffer, &m, 99).unwrap();
    assert_eq!(buffer.queue_size() + buffer.stage_size(), 189);

    // cannot fit alone: chunk overflow
    let err = write_one(&buffer, &m, 101).unwrap_err();
    assert!(matches!(err, BufferError::ChunkOverflow(_)));
}

// ============================================================================
// LIFECYCLE AND SUPPLEMENTARY BEHAVIOR
// ============================================================================

/// Chunk content read back by a consumer is the concatenation of the
/// committed record payloads, in write order.
#[test]
fn test_dequeued_chunk_content_round_trip() {
    let buffer = buffer(100, 1000);
    let m = buffer.metadata(None, Some("app"), None);

    let records = vec![
        Record::new(b"hello".to_vec()),
        Record::new(b" ".to_vec()),
        Record::new(b"world".to_vec()),
    ];
    buffer.write(&[(Arc::clone(&m), records)], &WriteOptions::default()).unwrap();
    buffer.enqueue_all().unwrap();

    let chunk = buffer.dequeue_chunk().unwrap();
    assert_eq!(chunk.read().unwrap(), b"hello world");
    assert_eq!(chunk.record_count(), 3);
    assert_eq!(chunk.metadata().tag(), Some("app"));
}

/// Writing the same metadata twice in one batch reuses the same staged
/// chunk under its reentrant lock and sums both contributions.
#[test]
fn test_duplicate_metadata_in_one_batch() {
    let buffer = buffer(100, 1000);
    let m = buffer.metadata(None, Some("app"), None);

    let batch = vec![
        (Arc::clone(&m), vec![record(30)]),
        (Arc::clone(&m), vec![record(40)]),
    ];
    buffer.write(&batch, &WriteOptions::default()).unwrap();

    assert_eq!(buffer.stage_length(), 1, "one staged chunk for one metadata");
    assert_eq!(buffer.stage_size(), 70);
}

/// A multi-metadata write publishes all its chunks atomically under the
/// global lock: afterwards every chunk is observable and counted.
#[test]
fn test_multi_metadata_write() {
    let buffer = buffer(100, 1000);
    let m1 = buffer.metadata(Some(60), Some("a"), None);
    let m2 = buffer.metadata(Some(60), Some("b"), None);
    let m3 = buffer.metadata(Some(120), Some("a"), None);

    let batch = vec![
        (Arc::clone(&m1), vec![record(10), record(20)]),
        (Arc::clone(&m2), vec![record(30)]),
        (Arc::clone(&m3), vec![record(40)]),
    ];
    buffer.write(&batch, &WriteOptions::default()).unwrap();

    assert_eq!(buffer.stage_length(), 3);
    assert_eq!(buffer.stage_size(), 100);
    assert_eq!(buffer.queue_length(), 0);
    assert_eq!(buffer.metadata_list().len(), 3);
}

/// Startup recovers backend content: staged chunks resume accumulating,
/// queued chunks are delivered FIFO, and all counters reflect the recovered
/// state.
#[test]
fn test_start_resumes_backend_content() {
    struct PreloadedStore;

    impl ChunkStore for PreloadedStore {
        fn generate_chunk(&self, metadata: Arc<Metadata>) -> Result<Box<dyn Chunk>, BufferError> {
            Ok(Box::new(MemoryChunk::new(metadata)))
        }

        fn resume(&self) -> Result<(HashMap<Arc<Metadata>, Box<dyn Chunk>>, Vec<Box<dyn Chunk>>), BufferError> {
            let staged_meta = Arc::new(Metadata::new(None, Some("stage".to_string()), None));
            let mut staged = MemoryChunk::new(Arc::clone(&staged_meta));
            staged.append(&[Record::new(vec![b's'; 30])])?;
            staged.commit()?;
            staged.mark_staged();

            let queued_meta = Arc::new(Metadata::new(None, Some("queue".to_string()), None));
            let mut first = MemoryChunk::new(Arc::clone(&queued_meta));
            first.append(&[Record::new(vec![b'1'; 40])])?;
            first.commit()?;
            first.mark_queued();
            let mut second = MemoryChunk::new(Arc::clone(&queued_meta));
            second.append(&[Record::new(vec![b'2'; 20])])?;
            second.commit()?;
            second.mark_queued();

            let mut stage: HashMap<Arc<Metadata>, Box<dyn Chunk>> = HashMap::new();
            stage.insert(staged_meta, Box::new(staged));
            Ok((stage, vec![Box::new(first), Box::new(second)]))
        }
    }

    let limits = BufferLimits::new(100, 1000, None, 0.95).unwrap();
    let buffer = StagedBuffer::new(Arc::new(PreloadedStore), limits);
    buffer.start().unwrap();

    assert_eq!(buffer.stage_size(), 30);
    assert_eq!(buffer.queue_size(), 60);
    assert_eq!(buffer.queue_length(), 2);
    assert_eq!(buffer.metadata_list().len(), 2);

    let queued_meta = buffer.metadata(None, Some("queue"), None);
    assert!(buffer.is_queued_for(&queued_meta));

    // the resumed staged chunk keeps accumulating
    let staged_meta = buffer.metadata(None, Some("stage"), None);
    write_one(&buffer, &staged_meta, 10).unwrap();
    assert_eq!(buffer.stage_size(), 40);

    // FIFO order survives resume
    let first = buffer.dequeue_chunk().unwrap();
    assert_eq!(first.read().unwrap(), vec![b'1'; 40]);
    let second = buffer.dequeue_chunk().unwrap();
    assert_eq!(second.read().unwrap(), vec![b'2'; 20]);
}

/// Close shuts every chunk down; dequeued handles survive but reject further
/// writes, and terminate resets the collections.
#[test]
fn test_close_and_terminate() {
    let buffer = buffer(100, 1000);
    let m = buffer.metadata(None, Some("app"), None);

    write_one_enqueued(&buffer, &m, 40);
    write_one(&buffer, &m, 10).unwrap();
    let dequeued = buffer.dequeue_chunk().unwrap();

    buffer.close().unwrap();
    assert_eq!(dequeued.state(), ChunkState::Closed);
    assert_eq!(buffer.stage_length(), 0);
    assert_eq!(buffer.queue_length(), 0);

    buffer.terminate();
    assert_eq!(buffer.stage_size(), 0);
    assert_eq!(buffer.queue_size(), 0);
    assert!(buffer.metadata_list().is_empty());
}

/// Purging one metadata's chunks does not retire a metadata that still has
/// staged content.
#[test]
fn test_metadata_survives_while_staged_content_remains() {
    let buffer = buffer(100, 1000);
    let m = buffer.metadata(None, Some("app"), None);

    write_one_enqueued(&buffer, &m, 40);
    write_one(&buffer, &m, 10).unwrap(); // staged content for the same metadata

    let chunk = buffer.dequeue_chunk().unwrap();
    buffer.purge_chunk(chunk.unique_id());

    assert_eq!(buffer.metadata_list().len(), 1, "metadata kept: stage still holds a chunk");
    assert_eq!(buffer.stage_size(), 10);
}
