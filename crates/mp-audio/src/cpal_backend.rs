//! CPAL-based audio output backend.
//!
//! Frames are handed over through a lock-free ring buffer sized in tick
//! chunks, so the producer side blocks roughly one tick at a time.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use mp_engine::{Frame, DEFAULT_BPM};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::traits::{AudioError, AudioOutput};

/// How many sequencer ticks the ring buffer holds. Eight ticks at the
/// default tempo is ~160ms of headroom against callback jitter.
const BUFFER_TICKS: usize = 8;

fn tick_frames(sample_rate: u32) -> usize {
    // Same derivation the sequencer uses: rate * 5 / (bpm * 2).
    (sample_rate as usize * 5) / (DEFAULT_BPM as usize * 2)
}

/// CPAL-based audio output.
pub struct CpalOutput {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    producer: HeapProd<Frame>,
    running: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
}

impl CpalOutput {
    /// Create a new CPAL output with the default device.
    pub fn new() -> Result<(Self, HeapCons<Frame>), AudioError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;

        let config = device
            .default_output_config()
            .map_err(|e| AudioError::DeviceInit(e.to_string()))?;

        let mut config: StreamConfig = config.into();
        // Force stereo output — the stream callback assumes 2-channel interleaving
        config.channels = 2;
        log::debug!("audio output at {} Hz", config.sample_rate.0);

        let rb = HeapRb::<Frame>::new(tick_frames(config.sample_rate.0) * BUFFER_TICKS);
        let (producer, consumer) = rb.split();

        let output = Self {
            device,
            config,
            stream: None,
            producer,
            running: Arc::new(AtomicBool::new(false)),
            failed: Arc::new(AtomicBool::new(false)),
        };

        Ok((output, consumer))
    }

    /// Build and start the audio stream.
    pub fn build_stream(&mut self, mut consumer: HeapCons<Frame>) -> Result<(), AudioError> {
        let running = self.running.clone();
        let failed = self.failed.clone();
        let channels = self.config.channels as usize;

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if !running.load(Ordering::Relaxed) {
                        for sample in data.iter_mut() {
                            *sample = 0.0;
                        }
                        return;
                    }

                    for chunk in data.chunks_mut(channels) {
                        if let Some(frame) = consumer.try_pop() {
                            let left = frame.left as f32 / 32768.0;
                            let right = frame.right as f32 / 32768.0;
                            // Write stereo pair; zero-fill any extra channels
                            for (i, sample) in chunk.iter_mut().enumerate() {
                                *sample = match i {
                                    0 => left,
                                    1 => right,
                                    _ => 0.0,
                                };
                            }
                        } else {
                            for sample in chunk.iter_mut() {
                                *sample = 0.0;
                            }
                        }
                    }
                },
                move |err| {
                    log::error!("audio stream error: {}", err);
                    failed.store(true, Ordering::Relaxed);
                },
                None,
            )
            .map_err(|e| AudioError::StreamCreate(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioError::Playback(e.to_string()))?;
        self.stream = Some(stream);

        Ok(())
    }

    /// Push a single frame, spinning until the ring buffer has room.
    /// Bails out if the stream's error callback has fired, so a dead
    /// device never wedges the producer.
    fn push_blocking(&mut self, frame: Frame) -> Result<(), AudioError> {
        let mut pending = frame;
        loop {
            match self.producer.try_push(pending) {
                Ok(()) => return Ok(()),
                Err(returned) => {
                    if self.failed.load(Ordering::Relaxed) {
                        return Err(AudioError::Playback("output stream failed".into()));
                    }
                    pending = returned;
                    std::hint::spin_loop();
                }
            }
        }
    }
}

impl AudioOutput for CpalOutput {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    fn write(&mut self, frames: &[Frame]) -> Result<(), AudioError> {
        for frame in frames {
            self.push_blocking(*frame)?;
        }
        Ok(())
    }

    fn start(&mut self) -> Result<(), AudioError> {
        self.running.store(true, Ordering::Relaxed);
        if let Some(ref stream) = self.stream {
            stream
                .play()
                .map_err(|e| AudioError::Playback(e.to_string()))?;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.running.store(false, Ordering::Relaxed);
        if let Some(ref stream) = self.stream {
            stream
                .pause()
                .map_err(|e| AudioError::Playback(e.to_string()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_holds_whole_ticks() {
        // 44100 Hz at 125 BPM is 882 frames per tick.
        assert_eq!(tick_frames(44100), 882);
        assert_eq!(tick_frames(48000), 960);
    }
}
