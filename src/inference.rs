use crate::config::Config;
use anyhow::Result;
use ndarray::{Array2, ArrayD};
use std::path::Path;

/// 学習済みモデルによる推論
/// - 呼び出し毎にモデルファイルを読み込む（リクエスト間でキャッシュしない）
/// - 戻り値は `(セグメント数, クラス数)` のクラス確率
pub trait GenreModel: Send + Sync {
    fn predict(&self, model_path: &Path, features: ArrayD<f32>) -> Result<Array2<f32>>;
}

/// ONNX Runtime で CNN を実行するモデル
#[derive(Debug, Clone)]
pub struct OnnxGenreModel {
    input_name: String,
    intra_threads: usize,
}

impl OnnxGenreModel {
    pub fn new(config: &Config) -> Self {
        Self {
            input_name: config.model.input_name.clone(),
            intra_threads: config.model.intra_threads.max(1),
        }
    }
}

#[cfg(feature = "onnx")]
impl GenreModel for OnnxGenreModel {
    fn predict(&self, model_path: &Path, features: ArrayD<f32>) -> Result<Array2<f32>> {
        use ort::session::Session;
        use ort::value::Tensor;

        let mut session = Session::builder()
            .and_then(|b| b.with_intra_threads(self.intra_threads))
            .and_then(|b| b.commit_from_file(model_path))
            .map_err(|e| anyhow::anyhow!("Failed to load model {}: {}", model_path.display(), e))?;

        let input_tensor = Tensor::from_array(features)
            .map_err(|e| anyhow::anyhow!("Failed to build input tensor: {}", e))?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .map_err(|e| anyhow::anyhow!("Model inference failed: {}", e))?;

        let (_, output) = outputs
            .iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Model produced no output"))?;

        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| anyhow::anyhow!("Failed to read model output: {}", e))?;

        // 出力は [セグメント数, クラス数] を想定
        if shape.len() != 2 {
            return Err(anyhow::anyhow!(
                "Unexpected model output rank {} (expected 2)",
                shape.len()
            ));
        }
        let rows = shape[0] as usize;
        let cols = shape[1] as usize;

        Array2::from_shape_vec((rows, cols), data.to_vec())
            .map_err(|e| anyhow::anyhow!("Model output shape error: {}", e))
    }
}

#[cfg(not(feature = "onnx"))]
impl GenreModel for OnnxGenreModel {
    fn predict(&self, _model_path: &Path, _features: ArrayD<f32>) -> Result<Array2<f32>> {
        let _ = (&self.input_name, self.intra_threads);
        Err(anyhow::anyhow!(
            "ONNX runtime support is not compiled in (feature `onnx` disabled)"
        ))
    }
}
