//! gallery-grab command-line entry point.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use gallery_grab::{
    find_chromium, ChromiumRenderer, CollisionPolicy, Downloader, GrabConfig, SearchRequest,
};

#[derive(Parser)]
#[command(
    name = "gallery-grab",
    about = "gallery-grab: search a photo gallery and download the results",
    version
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the gallery and download matching images.
    Download(DownloadArgs),

    /// Check that a browser can be found and the configuration is valid.
    Doctor,

    /// Print the effective configuration as JSON.
    Config,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   gallery-grab completions bash > ~/.local/share/bash-completion/completions/gallery-grab
    ///   gallery-grab completions zsh > ~/.zfunc/_gallery-grab
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[derive(Args, Debug)]
struct DownloadArgs {
    /// Search term (e.g. "cats", "nature").
    query: String,

    /// Number of images to download.
    #[arg(short = 'n', long, default_value_t = 1, allow_negative_numbers = true)]
    count: i64,

    /// Directory to save into, relative to the current directory or absolute.
    #[arg(short, long, default_value = "images")]
    save_dir: String,

    /// Orientation filter (landscape, portrait, squarish).
    #[arg(long, default_value = "landscape")]
    orientation: String,

    /// License filter (free, plus).
    #[arg(long, default_value = "free")]
    license: String,

    /// Run the browser without a window.
    #[arg(long, conflicts_with = "headed")]
    headless: bool,

    /// Run the browser with a visible window, overriding GALLERY_GRAB_HEADLESS.
    #[arg(long)]
    headed: bool,

    /// Path to the Chrome/Chromium executable.
    #[arg(long)]
    chromium: Option<PathBuf>,

    /// Gallery base URL.
    #[arg(long)]
    base_url: Option<String>,

    /// Navigation timeout in milliseconds.
    #[arg(long)]
    nav_timeout_ms: Option<u64>,

    /// Delay after page load before extracting, in milliseconds.
    #[arg(long)]
    settle_ms: Option<u64>,

    /// Per-image fetch timeout in milliseconds.
    #[arg(long)]
    fetch_timeout_ms: Option<u64>,

    /// What to do when a file already exists (overwrite, unique-suffix).
    #[arg(long)]
    on_collision: Option<String>,

    /// Print the manifest as JSON instead of a summary line.
    #[arg(long)]
    json: bool,
}

impl DownloadArgs {
    /// Overlay command-line flags on top of `config`.
    fn apply(&self, mut config: GrabConfig) -> Result<GrabConfig> {
        if self.headless {
            config.headless = true;
        } else if self.headed {
            config.headless = false;
        }
        if let Some(path) = &self.chromium {
            config.chromium_path = Some(path.clone());
        }
        if let Some(url) = &self.base_url {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(ms) = self.nav_timeout_ms {
            config.navigation_timeout_ms = ms;
        }
        if let Some(ms) = self.settle_ms {
            config.settle_ms = ms;
        }
        if let Some(ms) = self.fetch_timeout_ms {
            config.fetch_timeout_ms = ms;
        }
        if let Some(policy) = &self.on_collision {
            config.collision_policy = policy.parse::<CollisionPolicy>()?;
        }
        Ok(config)
    }

    fn request(&self) -> Result<SearchRequest> {
        Ok(SearchRequest::builder(&self.query)
            .count(self.count)
            .save_dir(&self.save_dir)
            .orientation(&self.orientation)
            .license_type(&self.license)
            .build()?)
    }
}

async fn run_download(args: DownloadArgs) -> Result<()> {
    let config = args.apply(GrabConfig::from_env()?)?;
    let request = args.request()?;

    tracing::info!(
        query = %args.query,
        headless = config.headless,
        base_url = %config.base_url,
        "gallery-grab download"
    );

    let renderer = ChromiumRenderer::new();
    let manifest = Downloader::new(&renderer, config).download(&request).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&manifest)?);
    } else {
        println!("{}", manifest.summary());
    }
    Ok(())
}

fn run_doctor() -> Result<()> {
    println!("gallery-grab doctor");
    println!("===================");
    println!();
    println!("OS:   {}", std::env::consts::OS);
    println!("Arch: {}", std::env::consts::ARCH);
    println!();

    let config = GrabConfig::from_env();
    match &config {
        Ok(_) => println!("[OK] Configuration parsed"),
        Err(e) => println!("[!!] Configuration error: {e}"),
    }

    let chromium = config
        .as_ref()
        .ok()
        .and_then(|c| c.chromium_path.clone())
        .filter(|p| p.exists())
        .or_else(find_chromium);
    match &chromium {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!(
            "[!!] Chromium NOT found. Install Chrome or set GALLERY_GRAB_CHROMIUM_PATH."
        ),
    }

    tracing::debug!(
        config_ok = config.is_ok(),
        chromium = ?chromium,
        "doctor checks complete"
    );

    println!();
    if config.is_ok() && chromium.is_some() {
        println!("Status: READY");
        Ok(())
    } else {
        println!("Status: NOT READY");
        anyhow::bail!("environment is not ready")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let json = matches!(&cli.command, Commands::Download(args) if args.json);

    let result = match cli.command {
        Commands::Download(args) => run_download(args).await,
        Commands::Doctor => run_doctor(),
        Commands::Config => GrabConfig::from_env()
            .map_err(anyhow::Error::from)
            .and_then(|config| {
                println!("{}", serde_json::to_string_pretty(&config)?);
                Ok(())
            }),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "gallery-grab", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if json {
            println!(
                "{}",
                serde_json::json!({
                    "error": true,
                    "message": format!("{e:#}"),
                })
            );
        } else {
            eprintln!("Error occurred: {e:#}");
        }
        std::process::exit(1);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> DownloadArgs {
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Download(args) => args,
            _ => panic!("expected download"),
        }
    }

    #[test]
    fn test_download_defaults() {
        let args = parse(&["gallery-grab", "download", "cats"]);
        assert_eq!(args.count, 1);
        assert_eq!(args.save_dir, "images");
        assert_eq!(args.orientation, "landscape");
        assert_eq!(args.license, "free");
        assert!(!args.json);
    }

    #[test]
    fn test_negative_count_parses_then_fails_validation() {
        let args = parse(&["gallery-grab", "download", "cats", "-n", "-2"]);
        assert_eq!(args.count, -2);
        assert!(args.request().is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let args = parse(&[
            "gallery-grab",
            "download",
            "cats",
            "--headless",
            "--base-url",
            "http://127.0.0.1:8080/",
            "--settle-ms",
            "0",
            "--on-collision",
            "unique-suffix",
        ]);
        let config = args.apply(GrabConfig::default()).unwrap();
        assert!(config.headless);
        assert_eq!(config.base_url, "http://127.0.0.1:8080");
        assert_eq!(config.settle_ms, 0);
        assert_eq!(config.collision_policy, CollisionPolicy::UniqueSuffix);
        assert_eq!(config.fetch_timeout_ms, GrabConfig::default().fetch_timeout_ms);
    }

    #[test]
    fn test_headed_overrides_env_headless() {
        let env = GrabConfig {
            headless: true,
            ..GrabConfig::default()
        };

        let args = parse(&["gallery-grab", "download", "cats", "--headed"]);
        assert!(!args.apply(env.clone()).unwrap().headless);

        let args = parse(&["gallery-grab", "download", "cats"]);
        assert!(args.apply(env).unwrap().headless);
    }

    #[test]
    fn test_headless_and_headed_conflict() {
        assert!(
            Cli::try_parse_from(["gallery-grab", "download", "cats", "--headless", "--headed"])
                .is_err()
        );
    }

    #[test]
    fn test_bad_collision_policy_rejected() {
        let args = parse(&["gallery-grab", "download", "cats", "--on-collision", "merge"]);
        assert!(args.apply(GrabConfig::default()).is_err());
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
