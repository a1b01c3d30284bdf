// テスト共通のスタンドイン実装
// 音声デコードや ONNX Runtime なしでパイプラインと HTTP 層を動かすため
#![allow(dead_code)]

use anyhow::Result;
use ndarray::{Array2, ArrayD, IxDyn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use GenreBackendAPI::{
    config::Config,
    features::FeatureExtractor,
    inference::GenreModel,
    pipeline::GenrePredictor,
};

/// 受け取ったファイルを記録し、セグメント数ぶんのダミーテンソルを返す抽出器
#[derive(Default)]
pub struct RecordingExtractor {
    pub calls: AtomicUsize,
    /// (拡張子, ファイルサイズ)
    pub seen: Mutex<Vec<(String, u64)>>,
    pub fail: bool,
}

impl RecordingExtractor {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FeatureExtractor for RecordingExtractor {
    fn extract(&self, song_path: &Path) -> Result<ArrayD<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let extension = song_path
            .extension()
            .map(|ext| ext.to_string_lossy().to_string())
            .unwrap_or_default();
        let size = fs::metadata(song_path)?.len();
        self.seen.lock().unwrap().push((extension, size));

        if self.fail {
            return Err(anyhow::anyhow!("corrupt audio stream"));
        }
        Ok(ArrayD::zeros(IxDyn(&[4, 8, 8, 1])))
    }
}

/// 決まった確率行列を返すモデル
pub struct ScriptedModel {
    pub output: Array2<f32>,
}

impl ScriptedModel {
    /// 各セグメントの勝者クラスから one-hot 風の行列を作る
    pub fn from_winners(winners: &[usize], classes: usize) -> Self {
        let mut output = Array2::<f32>::from_elem((winners.len(), classes), 0.01);
        for (row, &class) in winners.iter().enumerate() {
            output[[row, class]] = 0.9;
        }
        Self { output }
    }
}

impl GenreModel for ScriptedModel {
    fn predict(&self, model_path: &Path, _features: ArrayD<f32>) -> Result<Array2<f32>> {
        if !model_path.exists() {
            return Err(anyhow::anyhow!("model vanished"));
        }
        Ok(self.output.clone())
    }
}

/// 常に失敗するモデル
pub struct FailingModel;

impl GenreModel for FailingModel {
    fn predict(&self, _model_path: &Path, _features: ArrayD<f32>) -> Result<Array2<f32>> {
        Err(anyhow::anyhow!("input shape mismatch"))
    }
}

/// ダミーのモデルファイルを作成
pub fn create_model_file(temp_dir: &TempDir) -> PathBuf {
    let model_path = temp_dir.path().join("cnn_2d.onnx");
    fs::write(&model_path, b"dummy onnx model").unwrap();
    model_path
}

/// テスト用の設定（一時ディレクトリとモデルパスを差し替え）
pub fn create_test_config(temp_dir: &TempDir, model_path: &Path) -> Config {
    let uploads = temp_dir.path().join("uploads");
    fs::create_dir_all(&uploads).unwrap();

    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config.paths.temp_dir = uploads.to_string_lossy().to_string();
    config.model.model_path = model_path.to_string_lossy().to_string();
    config
}

pub fn create_predictor(
    model_path: &Path,
    extractor: Arc<dyn FeatureExtractor>,
    model: Arc<dyn GenreModel>,
) -> GenrePredictor {
    GenrePredictor::new(model_path, extractor, model)
}

/// 一時ディレクトリ内のファイル数
pub fn count_files(dir: &str) -> usize {
    fs::read_dir(dir).unwrap().count()
}
