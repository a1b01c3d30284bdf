use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 相対パスを解決する基準ディレクトリ（クレートのインストール場所）
pub const INSTALL_ROOT: &str = env!("CARGO_MANIFEST_DIR");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub audio: AudioConfig,
    pub features: FeatureConfig,
    pub paths: PathsConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// 学習済みモデル（ONNX）のパス。相対パスは INSTALL_ROOT 基準
    pub model_path: String,
    /// モデルの入力テンソル名
    pub input_name: String,
    pub intra_threads: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub supported_formats: Vec<String>,
}

/// メルスペクトログラム抽出のパラメータ
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub song_samples: usize,
    pub window: f32,
    pub overlap: f32,
    pub n_fft: usize,
    pub hop_length: usize,
    pub n_mels: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub temp_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub max_file_size_mb: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5000,
            },
            model: ModelConfig {
                model_path: "models/cnn_2d.onnx".to_string(),
                input_name: "input_1".to_string(),
                intra_threads: 1,
            },
            audio: AudioConfig {
                sample_rate: 22050,
                supported_formats: vec![
                    "wav".to_string(),
                    "mp3".to_string(),
                    "flac".to_string(),
                    "ogg".to_string(),
                    "m4a".to_string(),
                    "aac".to_string(),
                ],
            },
            features: FeatureConfig {
                song_samples: 660_000,
                window: 0.05,
                overlap: 0.5,
                n_fft: 1024,
                hop_length: 256,
                n_mels: 128,
            },
            paths: PathsConfig {
                temp_dir: std::env::temp_dir().to_string_lossy().to_string(),
            },
            limits: LimitsConfig {
                max_file_size_mb: 50,
            },
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn load_or_create_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            match Self::load_from_file(&path) {
                Ok(config) => Ok(config),
                Err(e) => {
                    log::warn!(
                        "設定ファイルの読み込みに失敗しました: {}. デフォルト設定を使用します。",
                        e
                    );
                    let config = Self::default();
                    config.save_to_file(&path)?;
                    Ok(config)
                }
            }
        } else {
            let config = Self::default();
            config.save_to_file(&path)?;
            println!("デフォルト設定ファイルを作成しました: {}", path.as_ref().display());
            Ok(config)
        }
    }

    /// 設定値の検証
    /// - モデルファイルの有無はここでは見ない（リクエスト毎に確認する）
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("無効なポート番号: {}", self.server.port));
        }

        if self.audio.supported_formats.is_empty() {
            return Err(anyhow::anyhow!("許可する拡張子が1つ以上必要です"));
        }

        if self.audio.sample_rate == 0 {
            return Err(anyhow::anyhow!("サンプリングレートは1以上である必要があります"));
        }

        let f = &self.features;
        if f.n_fft == 0 || f.hop_length == 0 || f.n_mels == 0 {
            return Err(anyhow::anyhow!(
                "n_fft / hop_length / n_mels は1以上である必要があります"
            ));
        }
        if !(f.window > 0.0 && f.window <= 1.0) {
            return Err(anyhow::anyhow!("window は (0, 1] の範囲で指定してください: {}", f.window));
        }
        if !(0.0..1.0).contains(&f.overlap) {
            return Err(anyhow::anyhow!("overlap は [0, 1) の範囲で指定してください: {}", f.overlap));
        }

        if self.limits.max_file_size_mb == 0 {
            return Err(anyhow::anyhow!("最大ファイルサイズは1MB以上である必要があります"));
        }

        // 一時ディレクトリがなければ作成
        let temp_dir = Path::new(&self.paths.temp_dir);
        if !temp_dir.exists() {
            fs::create_dir_all(temp_dir).map_err(|e| {
                anyhow::anyhow!("ディレクトリの作成に失敗: {} - {}", self.paths.temp_dir, e)
            })?;
        }

        Ok(())
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.limits.max_file_size_mb * 1024 * 1024
    }

    /// モデルファイルの絶対パス
    pub fn resolved_model_path(&self) -> PathBuf {
        let path = Path::new(&self.model.model_path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(INSTALL_ROOT).join(path)
        }
    }

    pub fn is_allowed_extension(&self, extension: &str) -> bool {
        let extension = extension.to_lowercase();
        self.audio
            .supported_formats
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&extension))
    }
}
