//! Synthetic drum material shared by the integration tests

#![allow(dead_code)]

use loop2midi::audio::{write_wav, AudioBuffer};
use loop2midi::{LoopError, LoopResult, Separator};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::PI;
use std::path::{Path, PathBuf};

pub const SR: u32 = 44100;

/// Attack ramp applied to every hit, keeps spectral splatter down
const ATTACK_SEC: f32 = 0.005;
/// Raised-cosine fade at the end of every hit so truncation does not click
const RELEASE_SEC: f32 = 0.02;

fn envelope(i: usize, len: usize, decay_per_sec: f32) -> f32 {
    let t = i as f32 / SR as f32;
    let remaining = (len - i) as f32 / SR as f32;
    let attack = (t / ATTACK_SEC).min(1.0);
    let release = if remaining < RELEASE_SEC {
        0.5 - 0.5 * (PI * remaining / RELEASE_SEC).cos()
    } else {
        1.0
    };
    attack * release * (-t * decay_per_sec).exp()
}

fn hit_len(seconds: f32) -> usize {
    (seconds * SR as f32) as usize
}

/// Low sine thump
pub fn kick() -> Vec<f32> {
    let len = hit_len(0.15);
    (0..len)
        .map(|i| {
            let t = i as f32 / SR as f32;
            (2.0 * PI * 60.0 * t).sin() * envelope(i, len, 20.0) * 0.9
        })
        .collect()
}

/// Mid-range body plus upper partial
pub fn snare() -> Vec<f32> {
    let len = hit_len(0.12);
    (0..len)
        .map(|i| {
            let t = i as f32 / SR as f32;
            let body = (2.0 * PI * 500.0 * t).sin() + 0.5 * (2.0 * PI * 2500.0 * t).sin();
            body * envelope(i, len, 25.0) * 0.5
        })
        .collect()
}

/// Short white-noise tick
pub fn hat(seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let len = hit_len(0.06);
    (0..len)
        .map(|i| rng.gen_range(-1.0f32..1.0) * envelope(i, len, 60.0) * 0.4)
        .collect()
}

/// Mix `hit` into `audio` starting at `time_sec`
pub fn place(audio: &mut [f32], time_sec: f32, hit: &[f32]) {
    let start = (time_sec * SR as f32) as usize;
    for (i, &s) in hit.iter().enumerate() {
        if let Some(slot) = audio.get_mut(start + i) {
            *slot += s;
        }
    }
}

/// Kicks on every beat, snare on 2 and 4, hats on eighths
pub fn drum_loop(seconds: f32, bpm: f32) -> Vec<f32> {
    let mut audio = vec![0.0f32; (seconds * SR as f32) as usize];
    let beat = 60.0 / bpm;
    let (k, s) = (kick(), snare());
    let mut n = 0usize;
    loop {
        let t = n as f32 * beat / 2.0;
        if t >= seconds {
            break;
        }
        place(&mut audio, t, &hat(n as u64));
        if n % 2 == 0 {
            place(&mut audio, t, &k);
            if (n / 2) % 2 == 1 {
                place(&mut audio, t, &s);
            }
        }
        n += 1;
    }
    audio
}

/// Regular kicks only
pub fn click_track(seconds: f32, bpm: f32) -> Vec<f32> {
    let mut audio = vec![0.0f32; (seconds * SR as f32) as usize];
    let k = kick();
    let beat = 60.0 / bpm;
    let mut t = 0.0;
    while t < seconds {
        place(&mut audio, t, &k);
        t += beat;
    }
    audio
}

/// Separator that writes a prepared stem into a directory
pub struct FakeSeparator {
    pub samples: Vec<f32>,
    pub dir: PathBuf,
}

impl Separator for FakeSeparator {
    fn separate(&self, input: &Path, stem: &str) -> LoopResult<PathBuf> {
        let base = input.file_stem().and_then(|s| s.to_str()).unwrap_or("track");
        let path = self.dir.join(base).join(format!("{}.wav", stem));
        std::fs::create_dir_all(path.parent().unwrap())?;
        write_wav(&AudioBuffer::new(self.samples.clone(), SR), &path)?;
        Ok(path)
    }
}

/// Separator that "runs" but never writes anything
pub struct SilentFailureSeparator {
    pub dir: PathBuf,
}

impl Separator for SilentFailureSeparator {
    fn separate(&self, input: &Path, stem: &str) -> LoopResult<PathBuf> {
        let base = input.file_stem().and_then(|s| s.to_str()).unwrap_or("track");
        Err(LoopError::SeparationOutputMissing(
            self.dir.join(base).join(format!("{}.wav", stem)),
        ))
    }
}
