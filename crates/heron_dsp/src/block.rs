//! Fixed-capacity Audio Block
//!
//! The unit queued between the audio thread and the analysis thread. Samples
//! live inline, so moving a block through a ring buffer is a plain copy and
//! never touches the allocator.

/// Maximum samples per block
pub const AUDIO_BLOCK_CAPACITY: usize = 1024;

/// One channel's worth of contiguous samples
#[derive(Clone, Copy)]
pub struct AudioBlock {
    samples: [f32; AUDIO_BLOCK_CAPACITY],
    len: usize,
}

impl Default for AudioBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AudioBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioBlock").field("len", &self.len).finish()
    }
}

impl AudioBlock {
    /// Empty block
    pub const fn new() -> Self {
        Self {
            samples: [0.0; AUDIO_BLOCK_CAPACITY],
            len: 0,
        }
    }

    /// Copy up to `AUDIO_BLOCK_CAPACITY` samples from `data`
    ///
    /// Returns the block and the number of samples that did not fit.
    pub fn from_slice(data: &[f32]) -> (Self, usize) {
        let mut block = Self::new();
        let taken = data.len().min(AUDIO_BLOCK_CAPACITY);
        block.samples[..taken].copy_from_slice(&data[..taken]);
        block.len = taken;
        (block, data.len() - taken)
    }

    /// Append one sample; returns false when the block is already full
    #[inline]
    pub fn push(&mut self, sample: f32) -> bool {
        if self.len == AUDIO_BLOCK_CAPACITY {
            return false;
        }
        self.samples[self.len] = sample;
        self.len += 1;
        true
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.samples[..self.len]
    }

    #[inline]
    pub fn clear(&mut self) {
        self.len = 0;
    }
}
