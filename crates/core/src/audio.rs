//! Audio frame types for the telephony wire format

use std::sync::Arc;
use std::time::Instant;

/// Sample rate of the telephony stream
pub const SAMPLE_RATE_HZ: u32 = 8000;

/// Duration of one wire frame
pub const FRAME_DURATION_MS: u64 = 20;

/// Fixed payload size of an audio frame on the wire (16-bit mono PCM)
pub const FRAME_BYTES: usize = 640;

/// Samples per wire frame
pub const FRAME_SAMPLES: usize = FRAME_BYTES / 2;

const PCM16_NORMALIZE: f32 = 32768.0;
const PCM16_SCALE: f32 = 32767.0;

/// One frame of caller or agent audio.
///
/// Samples are stored as f32 normalized to [-1.0, 1.0] for processing;
/// conversion to/from the PCM16 wire form happens at the protocol boundary.
#[derive(Clone)]
pub struct AudioFrame {
    /// Normalized samples
    pub samples: Arc<[f32]>,
    /// Frame sequence number within the call
    pub sequence: u64,
    /// Arrival or generation time
    pub timestamp: Instant,
    /// RMS energy in dB
    pub energy_db: f32,
}

impl std::fmt::Debug for AudioFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioFrame")
            .field("samples_len", &self.samples.len())
            .field("sequence", &self.sequence)
            .field("energy_db", &self.energy_db)
            .finish()
    }
}

impl AudioFrame {
    /// Create a frame from normalized samples
    pub fn new(samples: Vec<f32>, sequence: u64) -> Self {
        let energy_db = Self::calculate_energy_db(&samples);
        Self {
            samples: samples.into(),
            sequence,
            timestamp: Instant::now(),
            energy_db,
        }
    }

    /// Decode a PCM16 little-endian payload into a frame
    pub fn from_pcm16(bytes: &[u8], sequence: u64) -> Self {
        let samples: Vec<f32> = bytes
            .chunks_exact(2)
            .map(|chunk| {
                let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
                sample as f32 / PCM16_NORMALIZE
            })
            .collect();
        Self::new(samples, sequence)
    }

    /// Encode the frame into PCM16 little-endian bytes
    pub fn to_pcm16(&self) -> Vec<u8> {
        self.samples
            .iter()
            .flat_map(|&sample| {
                let clamped = sample.clamp(-1.0, 1.0);
                let pcm16 = (clamped * PCM16_SCALE) as i16;
                pcm16.to_le_bytes()
            })
            .collect()
    }

    /// RMS energy in decibels; -96 dB floor for silence
    fn calculate_energy_db(samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return -96.0;
        }
        let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
        let rms = (sum_squares / samples.len() as f32).sqrt();
        if rms > 0.0 {
            20.0 * rms.log10()
        } else {
            -96.0
        }
    }

    /// Check if the frame is likely silence based on energy
    pub fn is_likely_silence(&self, threshold_db: f32) -> bool {
        self.energy_db < threshold_db
    }
}

/// Split synthesized PCM16 audio into wire-sized payloads.
///
/// The final chunk is zero-padded to the fixed frame size so every outbound
/// frame carries exactly [`FRAME_BYTES`] bytes.
pub fn pcm16_to_wire_frames(pcm: &[u8]) -> Vec<Vec<u8>> {
    let mut frames = Vec::with_capacity(pcm.len() / FRAME_BYTES + 1);
    for chunk in pcm.chunks(FRAME_BYTES) {
        if chunk.len() == FRAME_BYTES {
            frames.push(chunk.to_vec());
        } else {
            let mut padded = chunk.to_vec();
            padded.resize(FRAME_BYTES, 0);
            frames.push(padded);
        }
    }
    frames
}
