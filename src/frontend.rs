//! The audio front end (spec §4.A): turns decoded PCM into a magnitude
//! spectrogram. Deterministic — same bytes and config in, bit-identical
//! spectrogram out.

use std::f32::consts::PI;

use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use crate::config::Config;
use crate::spectrogram::Spectrogram;

/// Turns interleaved PCM at `source_rate` into a magnitude spectrogram at
/// `cfg.sample_rate`. Mirrors spec §4.A step by step:
/// mono-mix → resample → normalize → windowed STFT.
pub fn to_spectrogram(
    interleaved: &[f32],
    channels: u16,
    source_rate: u32,
    cfg: &Config,
) -> Spectrogram {
    if interleaved.is_empty() || channels == 0 {
        return Spectrogram::empty();
    }

    let mono = mono_mix(interleaved, channels);
    let mut mono = if source_rate != cfg.sample_rate {
        match resample(&mono, source_rate, cfg.sample_rate) {
            Ok(resampled) => resampled,
            Err(_) => return Spectrogram::empty(),
        }
    } else {
        mono
    };
    normalize_in_place(&mut mono);

    if mono.len() < cfg.n_fft {
        return Spectrogram::empty();
    }

    let spectrogram = stft(&mono, cfg.n_fft, cfg.hop);
    if spectrogram
        .frames
        .iter()
        .flatten()
        .all(|&m| m < cfg.min_amplitude)
    {
        // All-silence input ⇒ empty spectrogram (spec §4.A "Failure"), not
        // just a spectrogram whose peaks never clear the floor.
        return Spectrogram::empty();
    }
    spectrogram
}

fn mono_mix(interleaved: &[f32], channels: u16) -> Vec<f32> {
    let channels = channels as usize;
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .filter(|chunk| chunk.len() == channels)
        .map(|chunk| chunk.iter().sum::<f32>() / channels as f32)
        .collect()
}

fn resample(mono: &[f32], source_rate: u32, target_rate: u32) -> Result<Vec<f32>, String> {
    if mono.is_empty() {
        return Ok(Vec::new());
    }
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let ratio = target_rate as f64 / source_rate as f64;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, mono.len(), 1)
        .map_err(|e| format!("failed to build resampler: {e}"))?;
    let waves_in = vec![mono.to_vec()];
    let waves_out = resampler
        .process(&waves_in, None)
        .map_err(|e| format!("resampling failed: {e}"))?;
    Ok(waves_out.into_iter().next().unwrap_or_default())
}

fn normalize_in_place(samples: &mut [f32]) {
    let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    if peak > 1.0 {
        let scale = 1.0 / peak;
        for s in samples.iter_mut() {
            *s *= scale;
        }
    }
}

fn hann_window(window_size: usize) -> Vec<f32> {
    let mut window = Vec::with_capacity(window_size);
    if window_size == 0 {
        return window;
    }
    if window_size == 1 {
        window.push(1.0);
        return window;
    }
    for i in 0..window_size {
        window.push(0.5 * (1.0 - (2.0 * PI * i as f32 / (window_size - 1) as f32).cos()));
    }
    window
}

fn stft(samples: &[f32], window_size: usize, hop_size: usize) -> Spectrogram {
    if samples.len() < window_size || hop_size == 0 {
        return Spectrogram::empty();
    }
    let num_frames = (samples.len() - window_size) / hop_size + 1;
    if num_frames == 0 {
        return Spectrogram::empty();
    }

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(window_size);
    let mut buffer: Vec<Complex<f32>> = vec![Complex::new(0.0, 0.0); window_size];
    let window_values = hann_window(window_size);
    let f_bins = window_size / 2 + 1;
    let mut frames: Vec<Vec<f32>> = Vec::with_capacity(num_frames);

    for i in 0..num_frames {
        let start = i * hop_size;
        let chunk = &samples[start..start + window_size];
        for (j, sample) in chunk.iter().enumerate() {
            buffer[j] = Complex::new(*sample * window_values[j], 0.0);
        }
        fft.process(&mut buffer);

        let mut magnitudes = Vec::with_capacity(f_bins);
        for bin in buffer.iter().take(f_bins) {
            magnitudes.push(bin.norm());
        }
        frames.push(magnitudes);
    }

    Spectrogram { frames, f_bins }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: u32, seconds: f32, amp: f32) -> Vec<f32> {
        let n = (sample_rate as f32 * seconds) as usize;
        (0..n)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                amp * (2.0 * PI * freq * t).sin()
            })
            .collect()
    }

    #[test]
    fn empty_input_yields_empty_spectrogram() {
        let cfg = Config::default();
        let s = to_spectrogram(&[], 1, cfg.sample_rate, &cfg);
        assert!(s.is_empty());
    }

    #[test]
    fn silence_yields_empty_spectrogram() {
        let cfg = Config::default();
        let silence = vec![0.0f32; cfg.n_fft * 4];
        let s = to_spectrogram(&silence, 1, cfg.sample_rate, &cfg);
        // spec §4.A "Failure": all-silence input (max magnitude below floor)
        // ⇒ empty spectrogram (zero time frames).
        assert!(s.is_empty());
    }

    #[test]
    fn quiet_but_below_floor_input_yields_empty_spectrogram() {
        let cfg = Config::default();
        let quiet = sine(440.0, cfg.sample_rate, 1.0, 1e-6);
        let s = to_spectrogram(&quiet, 1, cfg.sample_rate, &cfg);
        assert!(s.is_empty());
    }

    #[test]
    fn too_short_yields_empty_spectrogram() {
        let cfg = Config::default();
        let samples = vec![0.1f32; cfg.n_fft - 1];
        let s = to_spectrogram(&samples, 1, cfg.sample_rate, &cfg);
        assert!(s.is_empty());
    }

    #[test]
    fn stereo_is_averaged_to_mono() {
        let cfg = Config::default();
        let mono = sine(440.0, cfg.sample_rate, 1.0, 0.5);
        let mut stereo = Vec::with_capacity(mono.len() * 2);
        for s in &mono {
            stereo.push(*s);
            stereo.push(*s);
        }
        let s_stereo = to_spectrogram(&stereo, 2, cfg.sample_rate, &cfg);
        let s_mono = to_spectrogram(&mono, 1, cfg.sample_rate, &cfg);
        assert_eq!(s_stereo.t_frames(), s_mono.t_frames());
    }

    #[test]
    fn deterministic_same_input_same_output() {
        let cfg = Config::default();
        let mono = sine(440.0, cfg.sample_rate, 1.0, 0.5);
        let a = to_spectrogram(&mono, 1, cfg.sample_rate, &cfg);
        let b = to_spectrogram(&mono, 1, cfg.sample_rate, &cfg);
        assert_eq!(a.frames, b.frames);
    }
}
