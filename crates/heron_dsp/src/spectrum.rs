//! FFT Spectrum Analyzer
//!
//! Turns the most recent window of captured audio into a frame of per-bin
//! magnitudes in dB and queues it for the path builder.
//!
//! # Architecture
//!
//! Runs entirely on the analysis thread. It is both producer and consumer of
//! its own frame queue: `produce()` pushes, `next_frame()` pulls. The queue
//! decouples "a window was analysed" from "a path was built" so either side
//! can skip a tick without losing ordering.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::{Deserialize, Serialize};

use crate::meter::gain_to_db;
use crate::ring_buffer::{ring_buffer, RingConsumer, RingProducer};

/// Default floor used in place of negative infinity
pub const DEFAULT_FLOOR_DB: f32 = -48.0;

/// Frames the output queue can hold before `produce` starts reporting drops
pub const FRAME_QUEUE_CAPACITY: usize = 4;

/// Supported transform lengths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FftOrder {
    /// 2048 samples at 48kHz = ~42ms window, ~23Hz resolution
    #[default]
    Order2048,
    Order4096,
    Order8192,
}

impl FftOrder {
    /// Transform length in samples
    pub fn len(self) -> usize {
        match self {
            FftOrder::Order2048 => 2048,
            FftOrder::Order4096 => 4096,
            FftOrder::Order8192 => 8192,
        }
    }

    /// Magnitude bins per frame
    pub fn bins(self) -> usize {
        self.len() / 2
    }
}

/// Analyzer state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzerState {
    /// Not enough samples yet for a full window
    Accumulating,
    /// The last call windowed and transformed a full window
    Ready,
}

/// Per-bin magnitudes in dB, `transform_length / 2` long
#[derive(Debug, Clone, PartialEq)]
pub struct MagnitudeFrame(Vec<f32>);

impl MagnitudeFrame {
    pub fn new(magnitudes_db: Vec<f32>) -> Self {
        Self(magnitudes_db)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

/// 4-term Blackman-Harris window, scaled to unity coherent gain
///
/// With the scaling, a full-scale sine centred on a bin reads close to 0 dB
/// after normalizing by half the transform length.
fn blackman_harris(size: usize) -> Vec<f32> {
    const A0: f64 = 0.35875;
    const A1: f64 = 0.48829;
    const A2: f64 = 0.14128;
    const A3: f64 = 0.01168;

    let denom = (size - 1) as f64;
    let raw: Vec<f64> = (0..size)
        .map(|n| {
            let x = 2.0 * std::f64::consts::PI * n as f64 / denom;
            A0 - A1 * x.cos() + A2 * (2.0 * x).cos() - A3 * (3.0 * x).cos()
        })
        .collect();
    let scale = size as f64 / raw.iter().sum::<f64>();
    raw.into_iter().map(|w| (w * scale) as f32).collect()
}

/// Spectrum analyzer producing dB magnitude frames
pub struct SpectrumAnalyzer {
    order: FftOrder,
    floor_db: f32,
    state: AnalyzerState,
    /// Window coefficients (pre-computed per order)
    window: Vec<f32>,
    /// FFT plan (reused for efficiency)
    fft: Arc<dyn Fft<f32>>,
    /// Working buffer, transformed in place
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    frames_tx: RingProducer<MagnitudeFrame>,
    frames_rx: RingConsumer<MagnitudeFrame>,
}

impl SpectrumAnalyzer {
    /// Create an analyzer for the given transform length and dB floor
    pub fn new(order: FftOrder, floor_db: f32) -> Self {
        let (fft, window, buffer, scratch) = Self::plan(order);
        let (frames_tx, frames_rx) = ring_buffer(FRAME_QUEUE_CAPACITY);
        Self {
            order,
            floor_db,
            state: AnalyzerState::Accumulating,
            window,
            fft,
            buffer,
            scratch,
            frames_tx,
            frames_rx,
        }
    }

    #[allow(clippy::type_complexity)]
    fn plan(
        order: FftOrder,
    ) -> (Arc<dyn Fft<f32>>, Vec<f32>, Vec<Complex<f32>>, Vec<Complex<f32>>) {
        let size = order.len();
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];
        (fft, blackman_harris(size), vec![Complex::new(0.0, 0.0); size], scratch)
    }

    /// Switch transform length
    ///
    /// Rebuilds the window and plan, clears queued frames and returns to
    /// `Accumulating`. Must not run concurrently with `produce`; `&mut self`
    /// enforces that.
    pub fn set_order(&mut self, order: FftOrder) {
        let (fft, window, buffer, scratch) = Self::plan(order);
        let (frames_tx, frames_rx) = ring_buffer(FRAME_QUEUE_CAPACITY);
        self.order = order;
        self.fft = fft;
        self.window = window;
        self.buffer = buffer;
        self.scratch = scratch;
        self.frames_tx = frames_tx;
        self.frames_rx = frames_rx;
        self.state = AnalyzerState::Accumulating;
    }

    /// Window, transform and queue the last `transform_length` samples of `signal`
    ///
    /// Returns true when a frame was queued. A short signal leaves the analyzer
    /// `Accumulating`; a full output queue drops the frame.
    pub fn produce(&mut self, signal: &[f32]) -> bool {
        let size = self.order.len();
        if signal.len() < size {
            self.state = AnalyzerState::Accumulating;
            return false;
        }

        let recent = &signal[signal.len() - size..];
        for ((slot, &sample), &w) in self.buffer.iter_mut().zip(recent).zip(&self.window) {
            *slot = Complex::new(sample * w, 0.0);
        }
        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        let bins = self.order.bins();
        let norm = bins as f32;
        let floor = self.floor_db;
        let magnitudes = self.buffer[..bins]
            .iter()
            .map(|c| gain_to_db(c.norm() / norm, floor))
            .collect();

        self.state = AnalyzerState::Ready;
        self.frames_tx.try_push(MagnitudeFrame(magnitudes)).is_ok()
    }

    /// Frames waiting to be pulled
    pub fn frames_available(&self) -> usize {
        self.frames_rx.available_for_read()
    }

    /// Pull the oldest queued frame
    pub fn next_frame(&mut self) -> Option<MagnitudeFrame> {
        self.frames_rx.try_pop()
    }

    pub fn state(&self) -> AnalyzerState {
        self.state
    }

    pub fn order(&self) -> FftOrder {
        self.order
    }

    pub fn transform_length(&self) -> usize {
        self.order.len()
    }

    /// Frequency spacing between bins
    pub fn bin_width_hz(&self, sample_rate: f32) -> f32 {
        sample_rate / self.order.len() as f32
    }

    pub fn floor_db(&self) -> f32 {
        self.floor_db
    }

    /// Takes effect from the next produced frame
    pub fn set_floor_db(&mut self, floor_db: f32) {
        self.floor_db = floor_db;
    }
}
