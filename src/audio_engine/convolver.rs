// src/audio_engine/convolver.rs

//! Uniform-partitioned FFT convolution for the reverb.
//!
//! The synthesized impulse is chopped into `PARTITION_SIZE` blocks whose
//! spectra are computed once, off the audio thread, when the kernel is
//! built. The audio thread keeps a frequency-domain delay line of recent
//! input blocks and does one forward FFT, one spectral multiply-accumulate
//! and one inverse FFT per block, which keeps multi-second impulses
//! affordable in real time. Output lags input by one partition.

use std::collections::VecDeque;
use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

/// Samples per partition. The convolver consumes and produces audio in
/// blocks of this size internally, independent of the device buffer size.
pub const PARTITION_SIZE: usize = 256;
const FFT_SIZE: usize = PARTITION_SIZE * 2;
const SPECTRUM_LEN: usize = FFT_SIZE / 2 + 1;

/// A pre-partitioned stereo impulse response, built off the audio thread
/// and handed to the renderer behind an `Arc`.
pub struct ReverbKernel {
    channels: [Vec<Vec<Complex<f32>>>; 2],
    decay_seconds: f32,
}

impl ReverbKernel {
    /// Partitions and transforms a stereo impulse. The impulse is
    /// energy-normalized so the reverb loudness does not grow with decay
    /// length.
    pub fn from_impulse(left: &[f32], right: &[f32], decay_seconds: f32) -> ReverbKernel {
        let energy: f32 = left.iter().chain(right.iter()).map(|s| s * s).sum();
        let norm = if energy > 0.0 { 1.0 / energy.sqrt() } else { 0.0 };

        let mut planner = RealFftPlanner::<f32>::new();
        let r2c = planner.plan_fft_forward(FFT_SIZE);
        let mut scratch = r2c.make_scratch_vec();

        let mut partition = |impulse: &[f32]| -> Vec<Vec<Complex<f32>>> {
            impulse
                .chunks(PARTITION_SIZE)
                .map(|chunk| {
                    let mut input = vec![0.0f32; FFT_SIZE];
                    for (slot, &s) in input.iter_mut().zip(chunk.iter()) {
                        *slot = s * norm;
                    }
                    let mut spectrum = r2c.make_output_vec();
                    let _ = r2c.process_with_scratch(&mut input, &mut spectrum, &mut scratch);
                    spectrum
                })
                .collect()
        };

        ReverbKernel {
            channels: [partition(left), partition(right)],
            decay_seconds,
        }
    }

    pub fn decay_seconds(&self) -> f32 {
        self.decay_seconds
    }

    pub fn partitions(&self) -> usize {
        self.channels[0].len().max(self.channels[1].len())
    }
}

struct ChannelState {
    accum: Vec<f32>,
    fdl: VecDeque<Vec<Complex<f32>>>,
    overlap: Vec<f32>,
    ready: VecDeque<f32>,
}

impl ChannelState {
    fn new() -> ChannelState {
        ChannelState {
            accum: Vec::with_capacity(PARTITION_SIZE),
            fdl: VecDeque::new(),
            overlap: vec![0.0; PARTITION_SIZE],
            ready: VecDeque::with_capacity(FFT_SIZE),
        }
    }
}

/// Streaming stereo convolver with a swappable kernel.
pub struct Convolver {
    kernel: Option<Arc<ReverbKernel>>,
    channels: [ChannelState; 2],
    r2c: Arc<dyn RealToComplex<f32>>,
    c2r: Arc<dyn ComplexToReal<f32>>,
    input_buf: Vec<f32>,
    time_buf: Vec<f32>,
    spectrum_sum: Vec<Complex<f32>>,
    fwd_scratch: Vec<Complex<f32>>,
    inv_scratch: Vec<Complex<f32>>,
}

impl Convolver {
    pub fn new() -> Convolver {
        let mut planner = RealFftPlanner::<f32>::new();
        let r2c = planner.plan_fft_forward(FFT_SIZE);
        let c2r = planner.plan_fft_inverse(FFT_SIZE);
        let fwd_scratch = r2c.make_scratch_vec();
        let inv_scratch = c2r.make_scratch_vec();
        Convolver {
            kernel: None,
            channels: [ChannelState::new(), ChannelState::new()],
            r2c,
            c2r,
            input_buf: vec![0.0; FFT_SIZE],
            time_buf: vec![0.0; FFT_SIZE],
            spectrum_sum: vec![Complex::new(0.0, 0.0); SPECTRUM_LEN],
            fwd_scratch,
            inv_scratch,
        }
    }

    /// Swaps the impulse. The input history is kept, so the tail stays
    /// continuous across a kernel change.
    pub fn set_kernel(&mut self, kernel: Arc<ReverbKernel>) {
        self.kernel = Some(kernel);
    }

    pub fn current_decay(&self) -> Option<f32> {
        self.kernel.as_ref().map(|k| k.decay_seconds)
    }

    /// Convolves one stereo frame.
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let l = self.process_channel(0, left);
        let r = self.process_channel(1, right);
        (l, r)
    }

    fn process_channel(&mut self, ch: usize, sample: f32) -> f32 {
        self.channels[ch].accum.push(sample);
        if self.channels[ch].accum.len() >= PARTITION_SIZE {
            self.run_block(ch);
        }
        self.channels[ch].ready.pop_front().unwrap_or(0.0)
    }

    fn run_block(&mut self, ch: usize) {
        let max_partitions = self.kernel.as_ref().map_or(1, |k| k.partitions()).max(1);
        let state = &mut self.channels[ch];

        self.input_buf[..PARTITION_SIZE].copy_from_slice(&state.accum);
        self.input_buf[PARTITION_SIZE..].fill(0.0);
        state.accum.clear();

        // Recycle the oldest FDL slot instead of allocating per block.
        let mut spectrum = if state.fdl.len() >= max_partitions {
            state.fdl.pop_back().unwrap_or_else(|| vec![Complex::new(0.0, 0.0); SPECTRUM_LEN])
        } else {
            vec![Complex::new(0.0, 0.0); SPECTRUM_LEN]
        };
        if self
            .r2c
            .process_with_scratch(&mut self.input_buf, &mut spectrum, &mut self.fwd_scratch)
            .is_err()
        {
            spectrum.iter_mut().for_each(|c| *c = Complex::new(0.0, 0.0));
        }
        state.fdl.push_front(spectrum);
        state.fdl.truncate(max_partitions);

        for slot in self.spectrum_sum.iter_mut() {
            *slot = Complex::new(0.0, 0.0);
        }
        if let Some(kernel) = &self.kernel {
            for (block, part) in state.fdl.iter().zip(kernel.channels[ch].iter()) {
                for i in 0..SPECTRUM_LEN {
                    self.spectrum_sum[i] += block[i] * part[i];
                }
            }
        }

        if self
            .c2r
            .process_with_scratch(&mut self.spectrum_sum, &mut self.time_buf, &mut self.inv_scratch)
            .is_err()
        {
            self.time_buf.fill(0.0);
        }

        let scale = 1.0 / FFT_SIZE as f32;
        for i in 0..PARTITION_SIZE {
            state
                .ready
                .push_back(self.time_buf[i] * scale + state.overlap[i]);
            state.overlap[i] = self.time_buf[PARTITION_SIZE + i] * scale;
        }
    }
}

impl Default for Convolver {
    fn default() -> Self {
        Convolver::new()
    }
}
