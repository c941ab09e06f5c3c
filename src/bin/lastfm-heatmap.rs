use clap::Parser;
use lastfm_heatmap::{
    heatmap_key, DirectoryStore, HeatmapConfig, HeatmapPipeline, Palette, ParseMode, ResultStore,
};
use std::path::PathBuf;

/// Render a day-of-month by month heatmap of a Last.fm listening history
#[derive(Parser)]
#[command(
    name = "lastfm-heatmap",
    about = "Render a Last.fm listening heatmap",
    long_about = None
)]
struct Cli {
    /// Last.fm username
    username: String,

    /// Color palette, e.g. rocket_r, viridis, mako_r
    #[arg(long, default_value = "rocket_r")]
    palette: Palette,

    /// Output PNG file (defaults to <USERNAME>_heatmap.png)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Fetch at most this many pages
    #[arg(long)]
    max_pages: Option<u32>,

    /// Keep at most this many scrobbles
    #[arg(long)]
    max_events: Option<usize>,

    /// Maximum number of concurrent requests
    #[arg(long)]
    concurrency: Option<usize>,

    /// Fail on scrobbles with unparseable dates instead of skipping them
    #[arg(long)]
    strict: bool,

    /// Also keep the PNG in the user cache directory
    #[arg(long)]
    cache: bool,

    /// Show detailed debug information
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let mut config = match HeatmapConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Error: {e}");
            eprintln!();
            eprintln!("Please set the following environment variable:");
            eprintln!("  LASTFM_API_KEY=your_lastfm_api_key");
            std::process::exit(1);
        }
    };

    if let Some(max_pages) = args.max_pages {
        config.fetch.page_cap = max_pages.saturating_add(1);
    }
    if let Some(max_events) = args.max_events {
        config.fetch.max_events = max_events;
    }
    if let Some(concurrency) = args.concurrency {
        config.fetch.max_concurrent_requests = concurrency;
    }

    let pipeline = match HeatmapPipeline::from_config(&config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            eprintln!("❌ Invalid configuration: {e}");
            std::process::exit(1);
        }
    };
    let pipeline = if args.strict {
        pipeline.with_parse_mode(ParseMode::Strict)
    } else {
        pipeline
    };

    println!("🎧 Building heatmap for {} ({})", args.username, args.palette);

    let image = match pipeline.run(&args.username, args.palette).await {
        Ok(image) => image,
        Err(e) => {
            eprintln!("❌ Failed to build heatmap: {e}");
            std::process::exit(1);
        }
    };

    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(format!("{}_heatmap.png", args.username)));
    if let Err(e) = std::fs::write(&output, &image.png) {
        eprintln!("❌ Failed to write {}: {e}", output.display());
        std::process::exit(1);
    }

    println!(
        "✅ Wrote {}x{} heatmap to {}",
        image.width,
        image.height,
        output.display()
    );

    if args.cache {
        let cached = match DirectoryStore::default_location() {
            Ok(store) => store
                .set(&heatmap_key(&args.username), &image.png)
                .await
                .map(|()| store.root().to_path_buf()),
            Err(e) => Err(e),
        };
        match cached {
            Ok(root) => println!("📦 Cached under {}", root.display()),
            Err(e) => log::warn!("Could not cache heatmap: {e}"),
        }
    }
}
