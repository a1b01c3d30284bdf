use anyhow::Result;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tempfile::NamedTempFile;
use unicode_normalization::UnicodeNormalization;

/// デコード済みのモノラル音声
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration_seconds(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// 音声ファイルを読み込み、モノラル化して `target_sample_rate` にリサンプリングする
/// - `max_samples` を指定すると、リサンプリング後の長さがそれを超えないよう先頭から切り詰める
pub fn load_audio_file<P: AsRef<Path>>(
    file_path: P,
    target_sample_rate: u32,
    max_samples: Option<usize>,
) -> Result<DecodedAudio> {
    let path = file_path.as_ref();
    if !path.exists() {
        return Err(anyhow::anyhow!(
            "Audio file not found: {}",
            path.display()
        ));
    }

    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let meta_opts: MetadataOptions = Default::default();
    let fmt_opts: FormatOptions = Default::default();

    let probed = symphonia::default::get_probe().format(&hint, mss, &fmt_opts, &meta_opts)?;
    let mut format = probed.format;

    let (track_id, codec_params) = {
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| anyhow::anyhow!("No audio track found"))?;

        (track.id, track.codec_params.clone())
    };

    let dec_opts: DecoderOptions = Default::default();
    let mut decoder = symphonia::default::get_codecs().make(&codec_params, &dec_opts)?;

    let original_sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| anyhow::anyhow!("Sample rate is unknown"))?;

    // 元のサンプリングレートで必要な長さ（少し余裕を持たせる）
    let source_limit = max_samples.map(|max| {
        let ratio = original_sample_rate as f64 / target_sample_rate as f64;
        (max as f64 * ratio).ceil() as usize + 1
    });

    let mut samples = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        if matches!(source_limit, Some(limit) if samples.len() >= limit) {
            break;
        }

        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::ResetRequired) => break,
            Err(SymphoniaError::IoError(ref err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(err) => return Err(anyhow::anyhow!("Failed to read packet: {}", err)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(audio_buf) => {
                let spec = *audio_buf.spec();
                let channels = spec.channels.count().max(1);
                let buf = sample_buf.get_or_insert_with(|| {
                    SampleBuffer::<f32>::new(audio_buf.capacity() as u64, spec)
                });
                if buf.capacity() < audio_buf.capacity() * channels {
                    *buf = SampleBuffer::<f32>::new(audio_buf.capacity() as u64, spec);
                }
                buf.copy_interleaved_ref(audio_buf);
                downmix_into(buf.samples(), channels, &mut samples);
            }
            // 壊れたパケットは読み飛ばす
            Err(SymphoniaError::DecodeError(err)) => {
                log::debug!("skipping undecodable packet: {}", err);
            }
            Err(SymphoniaError::IoError(ref err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(err) => return Err(anyhow::anyhow!("Failed to decode audio: {}", err)),
        }
    }

    if samples.is_empty() {
        return Err(anyhow::anyhow!("Audio data is empty"));
    }

    if let Some(limit) = source_limit {
        samples.truncate(limit);
    }

    let mut resampled = resample_audio(samples, original_sample_rate as f64, target_sample_rate as f64)?;
    if let Some(max) = max_samples {
        resampled.truncate(max);
    }

    Ok(DecodedAudio {
        samples: resampled,
        sample_rate: target_sample_rate,
    })
}

/// インターリーブされたサンプルをチャンネル平均でモノラル化
fn downmix_into(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    if channels == 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    out.extend(
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32),
    );
}

fn resample_audio(samples: Vec<f32>, input_rate: f64, output_rate: f64) -> Result<Vec<f32>> {
    if (input_rate - output_rate).abs() < 1.0 {
        return Ok(samples);
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(
        output_rate / input_rate,
        2.0,
        params,
        samples.len(),
        1, // モノラル
    )?;

    let input_channels = vec![samples];
    let mut output_channels = resampler.process(&input_channels, None)?;

    Ok(output_channels.swap_remove(0))
}

// =============================================================================
// Upload helpers
// =============================================================================

/// 最後の `.` 以降を小文字化した拡張子。`.` が無ければ None
pub fn file_extension(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, extension)| extension.to_lowercase())
}

/// アップロードされたファイル名を安全な形に整える
/// - ディレクトリ部分を除去
/// - NFKD 分解してアクセントを落とす（`café` → `cafe`）
/// - 空白は `_` に置換し、英数字と `_` `.` `-` 以外を取り除く
/// - 先頭と末尾の `.` `_` を除去
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default();

    let folded: String = base.nfkd().filter(char::is_ascii).collect();
    let joined = folded.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();

    cleaned.trim_matches(|c: char| c == '.' || c == '_').to_string()
}

/// バイト列を `.{extension}` 付きの一時ファイルに書き出す
/// - 返り値の `NamedTempFile` をドロップするとファイルは削除される
pub fn create_temp_file_from_bytes<P: AsRef<Path>>(
    bytes: &[u8],
    extension: &str,
    temp_dir: P,
) -> Result<NamedTempFile> {
    let mut temp_file = NamedTempFile::with_suffix_in(format!(".{}", extension), temp_dir)?;

    temp_file.write_all(bytes)?;
    temp_file.flush()?;

    Ok(temp_file)
}

/// ファイルサイズを人間が読みやすい形式で表示
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", size as u64, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}
