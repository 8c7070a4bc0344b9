//! Headless playback controller for the modplay tracker player.
//!
//! Owns a parsed module and drives real-time playback on a background
//! audio thread, or renders offline to frames/WAV.

mod wav;

use mp_audio::{AudioOutput, CpalOutput};
use mp_engine::Sequencer;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

// Re-export common types so callers don't need mp-ir/mp-engine directly.
pub use mp_engine::{Frame, MixMode, Position, DEFAULT_BPM, DEFAULT_TICKS_PER_ROW};
pub use mp_formats::LoadError;
pub use mp_ir::Module;

pub use wav::{frames_to_wav, write_wav};

/// Headless module player — owns a module and manages playback.
pub struct Player {
    module: Arc<Module>,
    mix: MixMode,
    playback: Option<PlaybackHandle>,
}

struct PlaybackHandle {
    stop_signal: Arc<AtomicBool>,
    position: Arc<AtomicU64>,
    finished: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

/// Pack a position into one atomic word for the playback thread.
fn pack_position(p: Position) -> u64 {
    ((p.order as u64) << 16) | ((p.pattern as u64) << 8) | p.row as u64
}

fn unpack_position(packed: u64) -> Position {
    Position {
        order: (packed >> 16) as usize,
        pattern: ((packed >> 8) & 0xFF) as usize,
        row: (packed & 0xFF) as usize,
    }
}

impl Player {
    /// Parse a MOD file and build a player for it.
    pub fn load(data: &[u8]) -> Result<Self, LoadError> {
        let module = mp_formats::load_module(data)?;
        Ok(Self::from_module(module))
    }

    /// Build a player from an already-parsed module.
    pub fn from_module(module: Module) -> Self {
        Self {
            module: Arc::new(module),
            mix: MixMode::default(),
            playback: None,
        }
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn set_mix_mode(&mut self, mix: MixMode) {
        self.mix = mix;
    }

    // --- Real-time playback ---

    pub fn play(&mut self) {
        self.stop();

        let module = Arc::clone(&self.module);
        let mix = self.mix;
        let stop_signal = Arc::new(AtomicBool::new(false));
        let position = Arc::new(AtomicU64::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let stop = stop_signal.clone();
        let pos = position.clone();
        let done = finished.clone();

        let thread = std::thread::spawn(move || {
            audio_thread(module, mix, stop, pos, done);
        });

        self.playback = Some(PlaybackHandle {
            stop_signal,
            position,
            finished,
            thread: Some(thread),
        });
    }

    pub fn stop(&mut self) {
        if let Some(mut pb) = self.playback.take() {
            pb.stop_signal.store(true, Ordering::Relaxed);
            if let Some(handle) = pb.thread.take() {
                let _ = handle.join();
            }
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playback
            .as_ref()
            .is_some_and(|p| !p.finished.load(Ordering::Relaxed))
    }

    pub fn is_finished(&self) -> bool {
        self.playback
            .as_ref()
            .is_some_and(|p| p.finished.load(Ordering::Relaxed))
    }

    pub fn position(&self) -> Option<Position> {
        let pb = self.playback.as_ref()?;
        if pb.finished.load(Ordering::Relaxed) {
            return None;
        }
        Some(unpack_position(pb.position.load(Ordering::Relaxed)))
    }

    // --- Offline rendering ---

    pub fn render_frames(&self, sample_rate: u32, max_frames: usize) -> Vec<Frame> {
        let mut sequencer =
            Sequencer::new(Arc::clone(&self.module), sample_rate).with_mix_mode(self.mix);

        let mut frames = Vec::with_capacity(max_frames.min(1 << 20));
        while frames.len() < max_frames {
            match sequencer.tick() {
                Some(chunk) => frames.extend(chunk),
                None => break,
            }
        }
        frames.truncate(max_frames);
        frames
    }

    pub fn render_to_wav(&self, sample_rate: u32, max_seconds: u32) -> Vec<u8> {
        let max_frames = (sample_rate * max_seconds) as usize;
        let frames = self.render_frames(sample_rate, max_frames);
        wav::frames_to_wav(&frames, sample_rate)
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.stop();
    }
}

fn audio_thread(
    module: Arc<Module>,
    mix: MixMode,
    stop_signal: Arc<AtomicBool>,
    position: Arc<AtomicU64>,
    finished: Arc<AtomicBool>,
) {
    let Ok((mut output, consumer)) = CpalOutput::new() else {
        log::warn!("no audio output device, playback skipped");
        finished.store(true, Ordering::Relaxed);
        return;
    };

    let sample_rate = output.sample_rate();
    let mut sequencer = Sequencer::new(module, sample_rate).with_mix_mode(mix);

    if output.build_stream(consumer).is_err() {
        finished.store(true, Ordering::Relaxed);
        return;
    }
    let _ = output.start();

    loop {
        if stop_signal.load(Ordering::Relaxed) {
            sequencer.stop();
        }
        let Some(frames) = sequencer.tick() else {
            break;
        };
        position.store(pack_position(sequencer.position()), Ordering::Relaxed);
        if output.write(&frames).is_err() {
            break;
        }
    }

    // Drain the device buffer before tearing the stream down.
    let _ = output.write(&vec![Frame::silence(); sample_rate as usize / 4]);

    finished.store(true, Ordering::Relaxed);
}
