//! The constellation extractor (spec §4.B): locates robust spectral peaks
//! in a spectrogram.

use crate::config::Config;
use crate::spectrogram::Spectrogram;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    pub t: usize,
    pub f: usize,
    pub amplitude: f32,
}

/// Finds local maxima over a rectangular neighborhood of radius
/// `cfg.peak_radius` in both axes, above `cfg.min_amplitude`, breaking
/// plateau ties by keeping only the peak with the smallest `t` then
/// smallest `f` within each connected equal-magnitude region (spec §4.B).
/// Peaks are emitted in time-then-frequency order (spec §3).
pub fn find_peaks(spectrogram: &Spectrogram, cfg: &Config) -> Vec<Peak> {
    let mut peaks = Vec::new();
    if spectrogram.is_empty() || spectrogram.f_bins == 0 {
        return peaks;
    }

    let num_frames = spectrogram.t_frames();
    let num_freq_bins = spectrogram.f_bins;
    let radius = cfg.peak_radius;

    for t in 0..num_frames {
        for f in 0..num_freq_bins {
            let magnitude = spectrogram.magnitude(t, f);
            if magnitude <= 0.0 || magnitude < cfg.min_amplitude {
                continue;
            }

            let t_start = t.saturating_sub(radius);
            let t_end = (t + radius + 1).min(num_frames);
            let f_start = f.saturating_sub(radius);
            let f_end = (f + radius + 1).min(num_freq_bins);

            let mut is_local_max = true;
            'neighborhood: for nt in t_start..t_end {
                for nf in f_start..f_end {
                    if nt == t && nf == f {
                        continue;
                    }
                    let neighbor = spectrogram.magnitude(nt, nf);
                    if neighbor > magnitude {
                        is_local_max = false;
                        break 'neighborhood;
                    }
                    // Plateau tie: only the lexicographically-first (t, f)
                    // in a connected equal-max region survives.
                    if neighbor == magnitude && (nt < t || (nt == t && nf < f)) {
                        is_local_max = false;
                        break 'neighborhood;
                    }
                }
            }

            if is_local_max {
                peaks.push(Peak {
                    t,
                    f,
                    amplitude: magnitude,
                });
            }
        }
    }

    peaks
}

/// Caps the peak count to the `limit` strongest peaks, re-sorting back into
/// time-then-frequency order afterward (spec §4.B "MAY cap the total peak
/// count per track").
pub fn cap_peaks(mut peaks: Vec<Peak>, limit: usize) -> Vec<Peak> {
    if peaks.len() <= limit {
        return peaks;
    }
    peaks.sort_by(|a, b| b.amplitude.partial_cmp(&a.amplitude).unwrap());
    peaks.truncate(limit);
    peaks.sort_by_key(|p| (p.t, p.f));
    peaks
}
