//! Channel Capture
//!
//! Carries post-EQ audio from the audio thread to the analysis thread.
//!
//! ```text
//! audio thread                         analysis thread
//! CaptureWriter ──[AudioBlock ring]──▶ CaptureReader ──▶ history window
//! ```
//!
//! The writer slices the incoming stream into blocks of a fixed length and
//! pushes them without waiting. When the queue is full the block is dropped:
//! visualization may skip a block under overload, audio is never affected.
//!
//! The reader keeps a fixed-length history window. Every drained block shifts
//! the window left by its length and is appended at the end, so the window
//! always holds the most recent samples in order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::block::{AudioBlock, AUDIO_BLOCK_CAPACITY};
use crate::error::DspError;
use crate::ring_buffer::{ring_buffer, RingConsumer, RingProducer};

/// Create the two halves of a capture channel
///
/// * `block_len` - samples per queued block (1..=`AUDIO_BLOCK_CAPACITY`)
/// * `capacity_blocks` - queue depth in blocks
/// * `history_len` - length of the reassembled window on the reader side
pub fn channel_capture(
    block_len: usize,
    capacity_blocks: usize,
    history_len: usize,
) -> Result<(CaptureWriter, CaptureReader), DspError> {
    if block_len == 0 || block_len > AUDIO_BLOCK_CAPACITY {
        return Err(DspError::InvalidBlockLength {
            got: block_len,
            max: AUDIO_BLOCK_CAPACITY,
        });
    }
    if capacity_blocks == 0 {
        return Err(DspError::InvalidCapacity);
    }
    if history_len < block_len {
        return Err(DspError::HistoryTooShort {
            history: history_len,
            block: block_len,
        });
    }

    let (producer, consumer) = ring_buffer(capacity_blocks);
    let dropped = Arc::new(AtomicU64::new(0));

    let writer = CaptureWriter {
        producer,
        staging: AudioBlock::new(),
        block_len,
        dropped: Arc::clone(&dropped),
    };
    let reader = CaptureReader {
        consumer,
        history: vec![0.0; history_len],
        dropped,
    };
    Ok((writer, reader))
}

/// Audio-thread half
pub struct CaptureWriter {
    producer: RingProducer<AudioBlock>,
    staging: AudioBlock,
    block_len: usize,
    dropped: Arc<AtomicU64>,
}

impl CaptureWriter {
    /// Append one sample, queueing a block whenever `block_len` samples are staged
    ///
    /// # Real-time Safety
    /// No allocations, no locks, never waits on the reader.
    #[inline]
    pub fn push_sample(&mut self, sample: f32) {
        self.staging.push(sample);
        if self.staging.len() >= self.block_len {
            let block = self.staging;
            self.staging.clear();
            self.push_block(block);
        }
    }

    /// Append a run of samples
    #[inline]
    pub fn push(&mut self, samples: &[f32]) {
        for &sample in samples {
            self.push_sample(sample);
        }
    }

    /// Queue a complete block directly
    ///
    /// Returns false (and counts a drop) if the queue is full. Data already
    /// queued is never overwritten.
    #[inline]
    pub fn push_block(&mut self, block: AudioBlock) -> bool {
        if self.producer.try_push(block).is_ok() {
            true
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    pub fn block_len(&self) -> usize {
        self.block_len
    }

    /// Blocks currently free in the queue
    pub fn available_for_write(&self) -> usize {
        self.producer.available_for_write()
    }

    /// Total blocks dropped because the queue was full
    pub fn dropped_blocks(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Analysis-thread half
pub struct CaptureReader {
    consumer: RingConsumer<AudioBlock>,
    history: Vec<f32>,
    dropped: Arc<AtomicU64>,
}

impl CaptureReader {
    /// Lazily pop queued blocks, folding each into the history window as it is yielded
    ///
    /// Stops at the first empty poll; calling again later resumes with whatever
    /// has arrived since.
    pub fn drained_blocks(&mut self) -> DrainedBlocks<'_> {
        DrainedBlocks { reader: self }
    }

    /// Fold every queued block into the history window
    ///
    /// Returns the number of blocks drained (zero means nothing new this tick).
    pub fn drain_available(&mut self) -> usize {
        self.drained_blocks().count()
    }

    /// Most recent samples, oldest first
    pub fn history(&self) -> &[f32] {
        &self.history
    }

    /// Change the window length, keeping the newest samples
    ///
    /// Growing pads the old end with silence.
    pub fn resize_history(&mut self, len: usize) {
        let current = self.history.len();
        if len < current {
            self.history.drain(..current - len);
        } else if len > current {
            let mut resized = vec![0.0; len - current];
            resized.extend_from_slice(&self.history);
            self.history = resized;
        }
    }

    /// Blocks queued and not yet drained
    pub fn available_for_read(&self) -> usize {
        self.consumer.available_for_read()
    }

    /// Total blocks the writer dropped because the queue was full
    pub fn dropped_blocks(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn append(&mut self, samples: &[f32]) {
        let window = self.history.len();
        let n = samples.len();
        if n >= window {
            self.history.copy_from_slice(&samples[n - window..]);
        } else {
            self.history.copy_within(n.., 0);
            self.history[window - n..].copy_from_slice(samples);
        }
    }
}

/// Iterator returned by [`CaptureReader::drained_blocks`]
pub struct DrainedBlocks<'a> {
    reader: &'a mut CaptureReader,
}

impl Iterator for DrainedBlocks<'_> {
    type Item = AudioBlock;

    fn next(&mut self) -> Option<AudioBlock> {
        let block = self.reader.consumer.try_pop()?;
        self.reader.append(block.as_slice());
        Some(block)
    }
}
