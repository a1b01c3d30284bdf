use GenreBackendAPI::cli::{ClassificationRunner, Cli};
use GenreBackendAPI::config::Config;
use GenreBackendAPI::create_app;
use GenreBackendAPI::handlers::AppState;
use GenreBackendAPI::pipeline::GenrePredictor;
use clap::Parser;
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ログの初期化
    env_logger::init();

    let cli = Cli::parse();

    // 曲が無ければ設定ファイルを作る前に終了
    let song = cli.checked_song()?;

    // 設定ファイルの読み込みと検証
    let config = Config::load_or_create_default(&cli.config)?;
    config.validate()?;

    // 引数に曲が指定されていればコンソールで分類して終了
    if let Some(song) = song {
        let runner = ClassificationRunner::new(GenrePredictor::from_config(&config));
        let report = runner.run(song)?;
        println!("{}", report);
        return Ok(());
    }

    println!("GenreBackendAPI を起動中...");
    println!("サーバーアドレス: {}", config.server_address());

    let app_state = AppState::new(config.clone());
    let model_path = app_state.predictor.model_path().to_path_buf();
    if app_state.predictor.model_available() {
        println!("モデル: {}", model_path.display());
    } else {
        eprintln!("モデルファイルが見つかりません: {}", model_path.display());
        eprintln!("サーバーは起動しますが、推定リクエストはエラーになります");
    }

    let app = create_app(app_state);

    // サーバーアドレスの解析
    let addr: SocketAddr = config
        .server_address()
        .parse()
        .map_err(|e| anyhow::anyhow!("無効なサーバーアドレス: {}", e))?;

    println!("サーバーを起動します: http://{}", addr);
    println!("API エンドポイント:");
    println!("  POST /api/predict - 音声ファイルのジャンル推定");
    println!("  GET  /api/health  - ヘルスチェック");
    println!("  GET  /api/genres  - ジャンル一覧");
    println!("  GET  /api/stats   - サーバー統計情報");
    println!();
    println!("使用例:");
    println!("  curl -F \"audio=@song.mp3\" http://{}/api/predict", addr);

    // サーバーの起動
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("サーバーの起動に失敗: {}", e))?;

    Ok(())
}
