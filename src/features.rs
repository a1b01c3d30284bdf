//! 特徴量抽出
//!
//! 音声ファイルを短いセグメントに分割し、各セグメントのメルスペクトログラムを
//! `(セグメント数, n_mels, フレーム数, 1)` のテンソルとして返す。
//! パイプライン側はテンソルの中身を解釈しない。

use crate::audio::load_audio_file;
use crate::config::{Config, FeatureConfig};
use anyhow::Result;
use ndarray::{s, Array2, Array4, ArrayD};
use rustfft::{num_complex::Complex, FftPlanner};
use std::path::Path;

/// 音声ファイル → モデル入力テンソル
pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, song_path: &Path) -> Result<ArrayD<f32>>;
}

/// GTZAN CNN と同じ前処理でメルスペクトログラムを作る抽出器
#[derive(Debug, Clone)]
pub struct MelSpectrogramExtractor {
    sample_rate: u32,
    params: FeatureConfig,
}

impl MelSpectrogramExtractor {
    pub fn new(config: &Config) -> Self {
        Self {
            sample_rate: config.audio.sample_rate,
            params: config.features.clone(),
        }
    }

    /// デコード済みサンプルからテンソルを作る
    pub fn extract_from_samples(&self, samples: &[f32]) -> Result<Array4<f32>> {
        let p = &self.params;
        let signal = &samples[..samples.len().min(p.song_samples)];

        let segments = split_segments(signal, p.window, p.overlap)?;
        if segments.is_empty() {
            return Err(anyhow::anyhow!("Audio is too short to split into segments"));
        }

        let filterbank = mel_filterbank(self.sample_rate as f32, p.n_fft, p.n_mels);
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(p.n_fft);
        let window = hann_window(p.n_fft);

        let mut specs = Vec::with_capacity(segments.len());
        for segment in &segments {
            let power = power_spectrogram(segment, p.n_fft, p.hop_length, &window, fft.as_ref())?;
            specs.push(filterbank.dot(&power));
        }

        let n_frames = specs[0].ncols();
        let mut tensor = Array4::<f32>::zeros((specs.len(), p.n_mels, n_frames, 1));
        for (i, spec) in specs.iter().enumerate() {
            tensor.slice_mut(s![i, .., .., 0]).assign(spec);
        }

        Ok(tensor)
    }
}

impl FeatureExtractor for MelSpectrogramExtractor {
    fn extract(&self, song_path: &Path) -> Result<ArrayD<f32>> {
        let audio = load_audio_file(song_path, self.sample_rate, Some(self.params.song_samples))?;
        log::debug!(
            "decoded {} ({:.1}s @ {}Hz)",
            song_path.display(),
            audio.duration_seconds(),
            audio.sample_rate
        );

        let tensor = self.extract_from_samples(&audio.samples)?;
        log::debug!("feature tensor shape: {:?}", tensor.shape());
        Ok(tensor.into_dyn())
    }
}

/// 信号を `window`（信号長に対する割合）の長さ、`overlap` の重なりで分割する
/// - 長さが揃わない末尾のセグメントは捨てる
pub fn split_segments(signal: &[f32], window: f32, overlap: f32) -> Result<Vec<&[f32]>> {
    let chunk = (signal.len() as f32 * window) as usize;
    let offset = (chunk as f32 * (1.0 - overlap)) as usize;
    if chunk == 0 || offset == 0 {
        return Err(anyhow::anyhow!(
            "Audio is too short to split into segments ({} samples)",
            signal.len()
        ));
    }

    let segments = (0..signal.len())
        .step_by(offset)
        .filter_map(|start| signal.get(start..start + chunk))
        .collect();

    Ok(segments)
}

/// 中心揃え（反射パディング）の STFT パワースペクトログラム `(n_fft/2+1, フレーム数)`
fn power_spectrogram(
    segment: &[f32],
    n_fft: usize,
    hop_length: usize,
    window: &[f32],
    fft: &dyn rustfft::Fft<f32>,
) -> Result<Array2<f32>> {
    let pad = n_fft / 2;
    if segment.len() <= pad {
        return Err(anyhow::anyhow!(
            "Segment is too short for n_fft={} ({} samples)",
            n_fft,
            segment.len()
        ));
    }

    let padded = reflect_pad(segment, pad);
    let n_frames = 1 + (padded.len() - n_fft) / hop_length;
    let n_bins = n_fft / 2 + 1;

    let mut spectrogram = Array2::<f32>::zeros((n_bins, n_frames));
    let mut buffer = vec![Complex::new(0.0f32, 0.0); n_fft];

    for frame in 0..n_frames {
        let start = frame * hop_length;
        for (i, slot) in buffer.iter_mut().enumerate() {
            *slot = Complex::new(padded[start + i] * window[i], 0.0);
        }
        fft.process(&mut buffer);
        for bin in 0..n_bins {
            spectrogram[[bin, frame]] = buffer[bin].norm_sqr();
        }
    }

    Ok(spectrogram)
}

fn reflect_pad(signal: &[f32], pad: usize) -> Vec<f32> {
    let n = signal.len();
    let mut out = Vec::with_capacity(n + 2 * pad);
    out.extend((1..=pad).rev().map(|i| signal[i.min(n - 1)]));
    out.extend_from_slice(signal);
    out.extend((0..pad).map(|i| signal[n.saturating_sub(2 + i)]));
    out
}

/// 周期的 Hann 窓
fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            let phase = 2.0 * std::f32::consts::PI * i as f32 / size as f32;
            0.5 - 0.5 * phase.cos()
        })
        .collect()
}

// Slaney 形式のメル尺度
const F_SP: f32 = 200.0 / 3.0;
const MIN_LOG_HZ: f32 = 1000.0;
const MIN_LOG_MEL: f32 = MIN_LOG_HZ / F_SP;

fn log_step() -> f32 {
    6.4f32.ln() / 27.0
}

fn hz_to_mel(hz: f32) -> f32 {
    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    } else {
        hz / F_SP
    }
}

fn mel_to_hz(mel: f32) -> f32 {
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    } else {
        F_SP * mel
    }
}

/// 三角メルフィルタバンク `(n_mels, n_fft/2+1)`（面積正規化）
pub fn mel_filterbank(sample_rate: f32, n_fft: usize, n_mels: usize) -> Array2<f32> {
    let n_bins = n_fft / 2 + 1;
    let f_max = sample_rate / 2.0;

    let fft_freqs: Vec<f32> = (0..n_bins)
        .map(|i| i as f32 * sample_rate / n_fft as f32)
        .collect();

    let mel_max = hz_to_mel(f_max);
    let mel_points: Vec<f32> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_max * i as f32 / (n_mels + 1) as f32))
        .collect();

    let mut weights = Array2::<f32>::zeros((n_mels, n_bins));
    for m in 0..n_mels {
        let (left, center, right) = (mel_points[m], mel_points[m + 1], mel_points[m + 2]);
        let enorm = 2.0 / (right - left);
        for (bin, &freq) in fft_freqs.iter().enumerate() {
            let lower = (freq - left) / (center - left);
            let upper = (right - freq) / (right - center);
            weights[[m, bin]] = lower.min(upper).max(0.0) * enorm;
        }
    }

    weights
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(len: usize, freq: f32, sample_rate: f32) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn split_matches_full_length_song() {
        let signal = vec![0.0f32; 660_000];
        let segments = split_segments(&signal, 0.05, 0.5).unwrap();

        // chunk = 33000, offset = 16500
        assert_eq!(segments.len(), 39);
        assert!(segments.iter().all(|s| s.len() == 33_000));
    }

    #[test]
    fn split_rejects_tiny_signal() {
        let signal = vec![0.0f32; 10];
        assert!(split_segments(&signal, 0.05, 0.5).is_err());
    }

    #[test]
    fn tensor_shape_for_full_length_song() {
        let config = Config::default();
        let extractor = MelSpectrogramExtractor::new(&config);
        let samples = sine(660_000, 440.0, 22050.0);

        let tensor = extractor.extract_from_samples(&samples).unwrap();
        assert_eq!(tensor.shape(), &[39, 128, 129, 1]);
        assert!(tensor.iter().all(|v| v.is_finite() && *v >= 0.0));
    }

    #[test]
    fn longer_input_is_truncated() {
        let mut config = Config::default();
        config.features.song_samples = 66_000;
        let extractor = MelSpectrogramExtractor::new(&config);
        let samples = vec![0.1f32; 90_000];

        let tensor = extractor.extract_from_samples(&samples).unwrap();
        // chunk = 3300, hop 256 → 13 フレーム
        assert_eq!(tensor.shape(), &[39, 128, 13, 1]);
    }

    #[test]
    fn sine_energy_lands_in_matching_band() {
        let sr = 22050.0;
        let bank = mel_filterbank(sr, 1024, 128);
        let tone = 1000.0;
        let samples = sine(4096, tone, sr);

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(1024);
        let power = power_spectrogram(&samples, 1024, 256, &hann_window(1024), fft.as_ref()).unwrap();
        let mel = bank.dot(&power);

        let column = mel.column(mel.ncols() / 2);
        let peak = column
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |acc, (i, &v)| if v > acc.1 { (i, v) } else { acc })
            .0;
        let expected = (0..128)
            .find(|&m| bank[[m, (tone * 1024.0 / sr).round() as usize]] > 0.0)
            .unwrap();
        assert!((peak as i32 - expected as i32).abs() <= 2);
    }

    #[test]
    fn filterbank_rows_are_non_negative() {
        let bank = mel_filterbank(22050.0, 1024, 128);
        assert_eq!(bank.shape(), &[128, 513]);
        assert!(bank.iter().all(|w| *w >= 0.0));
        assert!(bank.rows().into_iter().all(|row| row.sum() > 0.0));
    }
}
