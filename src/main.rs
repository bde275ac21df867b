mod cli;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use flix_av::{ProcessRunner, ToolRegistry};
use flix_core::config::Config;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise defaults based on the verbose flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "fileflix=trace,flix_server=trace,flix_av=trace,flix_core=debug,tower_http=debug"
                .to_string()
        } else {
            "fileflix=info,flix_server=info,flix_av=info,flix_core=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt().with_env_filter(&env_filter).init();

    match cli.command {
        Commands::Serve { host, port, root } => {
            let mut config = Config::load_or_default(cli.config.as_deref());
            apply_overrides(&mut config, host, port, root);
            tracing::info!(
                version = env!("CARGO_PKG_VERSION"),
                "Starting fileflix on {}:{}",
                config.server.host,
                config.server.port
            );

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(flix_server::start(config))?;
            Ok(())
        }
        Commands::Probe { file, json } => probe_file(&file, json, cli.config.as_deref()),
        Commands::Key { path } => {
            println!("{}", flix_core::derive_key(&path));
            Ok(())
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("fileflix {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Apply `serve` flags on top of the loaded configuration.
fn apply_overrides(
    config: &mut Config,
    host: Option<String>,
    port: Option<u16>,
    root: Option<std::path::PathBuf>,
) {
    if let Some(host) = host {
        tracing::debug!(%host, "Host overridden from command line");
        config.server.host = host;
    }
    if let Some(port) = port {
        tracing::debug!(port, "Port overridden from command line");
        config.server.port = port;
    }
    if let Some(root) = root {
        tracing::debug!(root = %root.display(), "Library root overridden from command line");
        config.library.root = root;
    }
}

fn probe_file(file: &Path, json: bool, config_path: Option<&Path>) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let config = Config::load_or_default(config_path);
    tracing::debug!(file = %file.display(), "Probing");
    let runner = ProcessRunner::new(ToolRegistry::discover(&config.tools));
    let rt = tokio::runtime::Runtime::new()?;
    let metadata = rt
        .block_on(flix_av::probe::probe(&runner, file, config.timeouts.probe()))
        .with_context(|| format!("probing {}", file.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&metadata)?);
        return Ok(());
    }

    println!("File: {}", file.display());
    let duration = metadata.duration_seconds();
    if duration > 0.0 {
        let secs = duration as u64;
        println!("Duration: {:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60);
    }

    match metadata.video_info {
        Some(ref video) => {
            print!("Video: [{}] {}", video.index, video.codec);
            if let (Some(w), Some(h)) = (video.width, video.height) {
                print!(" {w}x{h}");
            }
            println!();
        }
        None => println!("Video: none"),
    }

    println!("\nAudio Tracks: {}", metadata.audio_streams.len());
    for track in &metadata.audio_streams {
        println!(
            "  [{}] {} {}ch ({}) {}",
            track.index,
            track.codec,
            track.channels.unwrap_or(flix_core::DEFAULT_CHANNELS),
            track.language,
            track.title
        );
    }

    println!("\nSubtitle Tracks: {}", metadata.subtitle_streams.len());
    for track in &metadata.subtitle_streams {
        println!("  [{}] {} ({}) {}", track.index, track.codec, track.language, track.title);
    }

    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = Config::load_or_default(config_path);
    let tools = ToolRegistry::discover(&config.tools).check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);
        if let Some(ref version) = tool.version {
            print!(" ({version})");
        }
        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }
        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Raw file streaming still works; thumbnails, metadata and HLS need ffmpeg and ffprobe.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let contents =
                std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
            Config::from_json(&contents)?
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    let warnings = config.validate();
    if warnings.is_empty() {
        println!("✓ Configuration is valid");
    } else {
        println!("Configuration parsed with {} warning(s):", warnings.len());
        for warning in &warnings {
            println!("  - {warning}");
        }
    }
    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Library root: {}", config.library.root.display());
    println!("  Cache dir: {}", config.cache.dir.display());
    println!("  Auth enabled: {}", config.auth.enabled);
    println!("  Watch enabled: {}", config.watch.enabled);
    println!("  Worker pool: {}", config.workers.pool_size);

    Ok(())
}
