//! modplay CLI — MOD playback and WAV export.
//!
//! Usage:
//!   modplay path/to/file.mod
//!   modplay path/to/file.mod --wav output.wav
//!   modplay path/to/file.mod --mono

use mp_player::{MixMode, Player};
use std::io::Write;
use std::{env, fs};

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let path = args.get(1).unwrap_or_else(|| {
        eprintln!("Usage: modplay <file.mod> [--wav output.wav] [--mono]");
        std::process::exit(1);
    });

    let wav_path = args
        .iter()
        .position(|a| a == "--wav")
        .and_then(|i| args.get(i + 1))
        .cloned();
    let mono = args.iter().any(|a| a == "--mono");

    let data = fs::read(path).unwrap_or_else(|e| {
        eprintln!("Failed to read {}: {}", path, e);
        std::process::exit(1);
    });

    let mut player = Player::load(&data).unwrap_or_else(|e| {
        eprintln!("Failed to parse MOD: {}", e);
        std::process::exit(1);
    });
    if !mono {
        player.set_mix_mode(MixMode::AmigaStereo);
    }

    let module = player.module();
    println!("Title:    {}", module.title);
    println!("Channels: {}", module.channels);
    println!("Patterns: {}", module.patterns.len());
    println!("Orders:   {}", module.orders.len());
    println!(
        "Tempo:    {} BPM, Speed: {}",
        mp_player::DEFAULT_BPM,
        mp_player::DEFAULT_TICKS_PER_ROW
    );
    let samples_with_data = module.samples.iter().filter(|s| !s.is_empty()).count();
    println!("Samples:  {} (with data)", samples_with_data);
    println!();

    match wav_path {
        Some(wav) => render_to_wav(&player, &wav),
        None => play_audio(&mut player),
    }
}

fn play_audio(player: &mut Player) {
    player.play();
    println!("Playing...");
    println!();

    while player.is_playing() {
        if let Some(pos) = player.position() {
            print!(
                "\rOrd: {:02X} | Pat: {:02X} | Row: {:02X}",
                pos.order, pos.pattern, pos.row
            );
            let _ = std::io::stdout().flush();
        }
        std::thread::sleep(std::time::Duration::from_millis(10));
    }

    println!("\rDone.          ");
}

fn render_to_wav(player: &Player, path: &str) {
    let sample_rate: u32 = 44100;
    let max_seconds: u32 = 300;
    println!("Rendering to {} at {} Hz...", path, sample_rate);

    let wav = player.render_to_wav(sample_rate, max_seconds);
    println!("Rendered {} bytes", wav.len());

    fs::write(path, &wav).unwrap_or_else(|e| {
        eprintln!("Failed to write {}: {}", path, e);
        std::process::exit(1);
    });

    println!("Done.");
}
