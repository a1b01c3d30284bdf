use crate::models::GenrePrediction;
use crate::pipeline::{GenrePredictor, PredictionError, TOP_GENRES};
use clap::Parser;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// サーバー起動を意味する位置引数
pub const RUN_SERVER: &str = "run";

#[derive(Parser, Debug)]
#[command(name = "genre-backend-api")]
#[command(version, about = "Music genre classification API server")]
pub struct Cli {
    /// 分類する音声ファイル（省略または `run` でサーバーを起動）
    #[arg(value_name = "SONG")]
    pub song: Option<PathBuf>,

    /// 設定ファイル
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,
}

impl Cli {
    /// コンソールで分類する曲（サーバーモードなら None）
    pub fn song_to_classify(&self) -> Option<&Path> {
        self.song
            .as_deref()
            .filter(|song| song.as_os_str() != RUN_SERVER)
    }

    /// 設定ファイルや一時ディレクトリに触れる前に曲の存在を確認する
    pub fn checked_song(&self) -> Result<Option<&Path>, CliError> {
        match self.song_to_classify() {
            Some(song) => {
                ensure_exists("Song", song)?;
                Ok(Some(song))
            }
            None => Ok(None),
        }
    }
}

fn ensure_exists(kind: &'static str, path: &Path) -> Result<(), CliError> {
    if path.exists() {
        Ok(())
    } else {
        Err(CliError::FileNotFound {
            kind,
            path: path.to_path_buf(),
        })
    }
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{kind} file not found: {}", path.display())]
    FileNotFound { kind: &'static str, path: PathBuf },
    #[error(transparent)]
    Prediction(#[from] PredictionError),
}

/// コンソールでの1曲分類結果
#[derive(Debug, Clone)]
pub struct ClassificationReport {
    pub song: PathBuf,
    pub prediction: GenrePrediction,
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} is a {} song",
            self.song.display(),
            self.prediction.predicted_genre
        )?;
        write!(f, "Top genres:")?;
        for (genre, share) in &self.prediction.top_genres {
            write!(f, "\n  {:<10} {:>6.2}%", genre, share * 100.0)?;
        }
        Ok(())
    }
}

/// 1曲を分類してコンソールに出す
pub struct ClassificationRunner {
    predictor: GenrePredictor,
}

impl ClassificationRunner {
    pub fn new(predictor: GenrePredictor) -> Self {
        Self { predictor }
    }

    pub fn run(&self, song_path: &Path) -> Result<ClassificationReport, CliError> {
        // 重い処理の前に入力を確認
        ensure_exists("Song", song_path)?;
        ensure_exists("Model", self.predictor.model_path())?;

        let args = self.predictor.args_for(song_path);
        let votes = self.predictor.classify(&args)?;
        let prediction = GenrePrediction::from_votes(&votes, TOP_GENRES).ok_or_else(|| {
            PredictionError::InvalidOutput("no segment produced a usable prediction".to_string())
        })?;

        Ok(ClassificationReport {
            song: args.song_path,
            prediction,
        })
    }
}
