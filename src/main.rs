use std::path::PathBuf;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use weatherwatch_core::Config;

struct Args {
    once: bool,
    config_path: Option<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        once: false,
        config_path: None,
    };

    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--once" => args.once = true,
            "-h" | "--help" => {
                println!("Usage: weatherwatch [--once] [CONFIG_PATH]");
                std::process::exit(0);
            }
            flag if flag.starts_with('-') => anyhow::bail!("Unknown option: {}", flag),
            path if args.config_path.is_none() => args.config_path = Some(PathBuf::from(path)),
            extra => anyhow::bail!("Unexpected argument: {}", extra),
        }
    }

    Ok(args)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    weatherwatch_core::init()?;

    let args = parse_args()?;
    let path = match args.config_path {
        Some(path) => path,
        None => Config::config_path()?,
    };

    // Configuration errors are the only fatal ones
    let (config, _validation) = match Config::load_validated(&path) {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!("{}", e.user_message());
            return Err(anyhow::Error::new(e)
                .context(format!("Invalid configuration in {}", path.display())));
        }
    };
    config.log_config();

    let mut monitor = weatherwatch_monitor::build_monitor(&config)?;

    if args.once {
        let report = monitor.run_cycle().await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested; finishing the current cycle");
            signal.cancel();
        }
    });

    tracing::info!("WeatherWatch started");
    monitor.run(shutdown).await;

    Ok(())
}
