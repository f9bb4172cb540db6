use dotenvy::dotenv;
use std::sync::Arc;

use alyacore::cli::{Cli, Commands, CookiesCommand};
use alyacore::core::{init_logger, log_cookies_configuration, AppError, AppResult, PipelineConfig};
use alyacore::download::ytdlp::YtDlp;
use alyacore::download::{
    CacheJanitor, CookieConfig, CookieStore, JanitorConfig, MediaKind, ResolutionPipeline, YtDlpSource,
};

/// Operator entry point: one command per invocation, results on stdout.
#[tokio::main]
async fn main() -> AppResult<()> {
    // .env has to be loaded before the config reads LOG_FILE_PATH
    let _ = dotenv();

    let cli = Cli::parse_args();
    let config = PipelineConfig::from_env();
    init_logger(&config.log_file_path)?;

    let cookies = Arc::new(CookieStore::new(CookieConfig::from_pipeline(&config))?);

    match cli.command {
        Commands::Audio { reference } => resolve(&config, cookies, &reference, MediaKind::Audio).await,
        Commands::Video { reference } => resolve(&config, cookies, &reference, MediaKind::Video).await,
        Commands::Sweep => {
            let janitor = CacheJanitor::new(JanitorConfig::new(&config.download_dir));
            let report = janitor.sweep().await?;
            println!(
                "scanned {} deleted {} failed {}",
                report.scanned, report.deleted, report.failed
            );
            Ok(())
        }
        Commands::Cookies { action } => run_cookies(&cookies, action).await,
        Commands::Formats { reference, size } => {
            let source = YtDlpSource::new(YtDlp::new(&config.ytdl_bin), cookies, &config.download_dir);
            for format in source.list_formats(&reference).await? {
                println!(
                    "{:>6}  {:<5} {:<12} {:>10}  {}",
                    format.format_id,
                    format.ext,
                    format.format_note.as_deref().unwrap_or("-"),
                    format
                        .filesize
                        .map(|s| format!("{:.1} MB", s as f64 / (1024.0 * 1024.0)))
                        .unwrap_or_else(|| "?".to_string()),
                    format.format
                );
            }
            if size {
                match source.estimate_size(&reference).await? {
                    Some(total) => println!("total: {:.2} MB", total as f64 / (1024.0 * 1024.0)),
                    None => println!("total: unknown"),
                }
            }
            Ok(())
        }
        Commands::Playlist { link, limit } => {
            let source = YtDlpSource::new(YtDlp::new(&config.ytdl_bin), cookies, &config.download_dir);
            for id in source.playlist_ids(&link, limit).await? {
                println!("{}", id);
            }
            Ok(())
        }
    }
}

async fn resolve(config: &PipelineConfig, cookies: Arc<CookieStore>, reference: &str, kind: MediaKind) -> AppResult<()> {
    log_cookies_configuration(&cookies).await;

    let pipeline = ResolutionPipeline::from_config(config, cookies)?;
    let result = pipeline.resolve(reference, kind).await;
    pipeline.shutdown().await;

    let artifact = result?;
    println!("{}", artifact.path.display());
    Ok(())
}

async fn run_cookies(store: &CookieStore, action: CookiesCommand) -> AppResult<()> {
    match action {
        CookiesCommand::Status => {
            log_cookies_configuration(store).await;
            let diag = store.diagnose().await;
            println!("active:  {}", store.config().cookies_file.display());
            println!("present: {}", store.cookies_exist().await);
            println!(
                "cookies: {} total, {} youtube, diagnostic {}",
                diag.total_cookies,
                diag.youtube_cookies,
                if diag.is_valid { "ok" } else { "failed" }
            );
            for issue in &diag.issues {
                println!("  - {}", issue);
            }
        }
        CookiesCommand::Validate => {
            let validation = store.validate_cookies_detailed(store.config().validation_timeout).await;
            match validation.reason {
                None => println!("valid"),
                Some(reason) => {
                    return Err(AppError::CookiesRejected(reason.description().to_string()));
                }
            }
        }
        CookiesCommand::Backup { name } => {
            let path = store.backup_cookies(name.as_deref()).await?;
            println!("{}", path.display());
        }
        CookiesCommand::Restore { name } => {
            if !store.restore_cookies(&name).await {
                return Err(AppError::CookiesRejected(format!("could not restore from {}", name)));
            }
            println!("restored {}", name);
        }
        CookiesCommand::List => {
            for name in store.list_backups().await {
                println!("{}", name);
            }
        }
        CookiesCommand::Update { file } => {
            let content = tokio::fs::read_to_string(&file).await?;
            if !store.update_cookies(&content).await {
                return Err(AppError::CookiesRejected(format!(
                    "new cookies from {} failed validation, previous cookies kept",
                    file.display()
                )));
            }
            println!("updated");
        }
    }
    Ok(())
}
