mod common;

use clap::Parser;
use common::*;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use GenreBackendAPI::{
    cli::{ClassificationRunner, Cli, CliError},
    features::FeatureExtractor,
    pipeline::PredictionError,
};

#[cfg(test)]
mod cli_tests {
    use super::*;

    fn runner(model_path: &Path, extractor: Arc<RecordingExtractor>) -> ClassificationRunner {
        ClassificationRunner::new(create_predictor(
            model_path,
            extractor as Arc<dyn FeatureExtractor>,
            Arc::new(ScriptedModel::from_winners(&[3, 3, 8, 3, 1], 10)),
        ))
    }

    /// 引数なし・`run` はサーバーモード
    #[test]
    fn test_server_mode_arguments() {
        let cli = Cli::try_parse_from(["genre-backend-api"]).unwrap();
        assert!(cli.song_to_classify().is_none());
        assert_eq!(cli.config, Path::new("config.toml"));

        let cli = Cli::try_parse_from(["genre-backend-api", "run"]).unwrap();
        assert!(cli.song_to_classify().is_none());
    }

    #[test]
    fn test_song_argument() {
        let cli =
            Cli::try_parse_from(["genre-backend-api", "songs/track.mp3", "--config", "alt.toml"])
                .unwrap();

        assert_eq!(cli.song_to_classify(), Some(Path::new("songs/track.mp3")));
        assert_eq!(cli.config, Path::new("alt.toml"));
    }

    /// 曲の存在確認は引数の段階で行う（サーバーモードでは確認しない）
    #[test]
    fn test_checked_song() {
        let temp_dir = TempDir::new().unwrap();
        let song = temp_dir.path().join("song.mp3");
        fs::write(&song, b"ID3").unwrap();
        let missing = temp_dir.path().join("missing.mp3");

        let cli = Cli::try_parse_from([Path::new("genre-backend-api"), song.as_path()]).unwrap();
        assert_eq!(cli.checked_song().unwrap(), Some(song.as_path()));

        let cli = Cli::try_parse_from([Path::new("genre-backend-api"), missing.as_path()]).unwrap();
        let error = cli.checked_song().unwrap_err();
        assert!(matches!(error, CliError::FileNotFound { kind: "Song", .. }));
        assert!(error.to_string().contains("missing.mp3"));

        let cli = Cli::try_parse_from(["genre-backend-api", "run"]).unwrap();
        assert_eq!(cli.checked_song().unwrap(), None);
    }

    /// 曲が無ければ何もせずに失敗
    #[test]
    fn test_missing_song_fails_fast() {
        let temp_dir = TempDir::new().unwrap();
        let model_path = create_model_file(&temp_dir);
        let extractor = Arc::new(RecordingExtractor::default());
        let runner = runner(&model_path, Arc::clone(&extractor));

        let error = runner.run(&temp_dir.path().join("nope.mp3")).unwrap_err();

        match error {
            CliError::FileNotFound { kind, path } => {
                assert_eq!(kind, "Song");
                assert!(path.ends_with("nope.mp3"));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(extractor.call_count(), 0);
    }

    #[test]
    fn test_missing_model_fails_fast() {
        let temp_dir = TempDir::new().unwrap();
        let song = temp_dir.path().join("song.wav");
        fs::write(&song, b"RIFF").unwrap();
        let extractor = Arc::new(RecordingExtractor::default());
        let runner = runner(&temp_dir.path().join("absent.onnx"), Arc::clone(&extractor));

        let error = runner.run(&song).unwrap_err();

        assert!(matches!(error, CliError::FileNotFound { kind: "Model", .. }));
        assert!(error.to_string().contains("absent.onnx"));
        assert_eq!(extractor.call_count(), 0);
    }

    #[test]
    fn test_classification_report() {
        let temp_dir = TempDir::new().unwrap();
        let model_path = create_model_file(&temp_dir);
        let song = temp_dir.path().join("song.wav");
        fs::write(&song, b"RIFF").unwrap();

        let report = runner(&model_path, Arc::new(RecordingExtractor::default()))
            .run(&song)
            .unwrap();

        assert_eq!(report.prediction.predicted_genre, "hiphop");
        assert_eq!(report.prediction.confidence, 0.6);
        assert_eq!(report.prediction.top_genres.len(), 3);
        // 同票は定義順（disco → reggae）
        assert_eq!(report.prediction.top_genres[1].0, "disco");
        assert_eq!(report.prediction.top_genres[2].0, "reggae");

        let output = report.to_string();
        let mut lines = output.lines();
        assert_eq!(
            lines.next().unwrap(),
            format!("{} is a hiphop song", song.display())
        );
        assert_eq!(lines.next().unwrap(), "Top genres:");
        assert!(lines.next().unwrap().contains("60.00%"));
    }

    #[test]
    fn test_pipeline_error_propagates() {
        let temp_dir = TempDir::new().unwrap();
        let model_path = create_model_file(&temp_dir);
        let song = temp_dir.path().join("song.wav");
        fs::write(&song, b"RIFF").unwrap();

        let error = runner(&model_path, Arc::new(RecordingExtractor::failing()))
            .run(&song)
            .unwrap_err();

        assert!(matches!(
            error,
            CliError::Prediction(PredictionError::Extraction(_))
        ));
    }
}
