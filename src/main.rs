//! Tabdeck - Multi-Tab Browsing Session Manager
//!
//! Entry point: `tabdeck --offline` runs a scripted session, `tabdeck <url>...`
//! opens each URL in its own tab with the headless engine.

use std::env;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use tabdeck::config::SessionConfig;
use tabdeck::engine::{
    EngineFactory, HeadlessEngineFactory, ScriptedEngineFactory, ScriptedSite, ScriptedWeb,
};
use tabdeck::favicon::{
    FaviconCache, FetchedResource, HttpImageFetcher, ImageFetcher, StaticFetcher,
};
use tabdeck::navigation::NavigationRouter;
use tabdeck::snapshot::SnapshotCache;
use tabdeck::storage::FileStore;
use tabdeck::{NAME, Result, VERSION};

/// Quiet period after which a headless session counts as settled
const IDLE_TIMEOUT: Duration = Duration::from_secs(20);

struct Options {
    offline: bool,
    config: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    urls: Vec<String>,
}

fn parse_args() -> Options {
    let mut options = Options {
        offline: false,
        config: None,
        data_dir: None,
        urls: Vec::new(),
    };
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--offline" => options.offline = true,
            "--config" => options.config = args.next().map(PathBuf::from),
            "--data-dir" => options.data_dir = args.next().map(PathBuf::from),
            _ => options.urls.push(arg),
        }
    }
    options
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let options = parse_args();
    println!("🚀 {} v{} - Multi-Tab Session Manager", NAME, VERSION);

    if let Err(e) = run(options).await {
        eprintln!("❌ {}", e);
        std::process::exit(1);
    }
}

async fn run(options: Options) -> Result<()> {
    let mut config = match &options.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };
    if let Some(dir) = options.data_dir {
        config = config.with_data_dir(dir);
    }

    if options.offline {
        let (factory, fetcher) = offline_world()?;
        let mut router = open_router(&config, factory, fetcher)?;
        router.restore_snapshots().await;

        router.load_url("example.com");
        router.create_tab("https://www.rust-lang.org");
        router.create_tab("");
        router.load_url("rust ownership");
        router.load_url("https://accounts.google.com/signin");
        router.process_pending().await;
        router.flush().await;

        report(&router);
        return Ok(());
    }

    if options.urls.is_empty() {
        println!("Usage: tabdeck [--config <file>] [--data-dir <dir>] (--offline | <url>...)");
        return Ok(());
    }

    let factory: Arc<dyn EngineFactory> =
        Arc::new(HeadlessEngineFactory::new(&config.favicon.user_agent)?);
    let fetcher: Arc<dyn ImageFetcher> = Arc::new(HttpImageFetcher::new(&config.favicon)?);
    let mut router = open_router(&config, factory, fetcher)?;
    router.restore_snapshots().await;

    for (index, url) in options.urls.iter().enumerate() {
        if index == 0 && router.registry().active().is_blank() {
            router.load_url(url);
        } else if let Some(url) =
            tabdeck::navigation::normalize_address(url, &config.search.template)
        {
            router.create_tab(&url);
        }
    }

    let handled = router.run_until_idle(IDLE_TIMEOUT).await;
    log::info!("Handled {} engine event(s)", handled);
    router.flush().await;

    report(&router);
    Ok(())
}

fn open_router(
    config: &SessionConfig,
    factory: Arc<dyn EngineFactory>,
    fetcher: Arc<dyn ImageFetcher>,
) -> Result<NavigationRouter> {
    let store = Arc::new(FileStore::open(config.store_dir())?);
    let snapshots = Arc::new(SnapshotCache::from_config(config.snapshot_dir(), &config.snapshot));
    let favicons = FaviconCache::new(fetcher, config.favicon.clone());
    Ok(NavigationRouter::new(config, store, factory, snapshots, favicons))
}

/// Scripted sites and an icon server for the offline session
fn offline_world() -> Result<(Arc<dyn EngineFactory>, Arc<dyn ImageFetcher>)> {
    let web = ScriptedWeb::new()
        .with_site(
            "https://example.com",
            ScriptedSite::titled("Example Domain").with_icon("https://example.com/favicon.png"),
        )
        .with_site(
            "https://www.rust-lang.org",
            ScriptedSite::titled("Rust Programming Language")
                .with_preview("https://www.rust-lang.org/static/images/rust-social.jpg"),
        )
        .with_site(
            "https://accounts.google.com/signin",
            ScriptedSite::titled("Sign in - Google Accounts"),
        );

    let fetcher = StaticFetcher::new()
        .with(
            "https://example.com/favicon.png",
            FetchedResource::ok(Some("image/png"), solid_png(32, Rgba([66, 133, 244, 255]))?),
        )
        .with(
            "https://www.rust-lang.org/apple-touch-icon.png",
            FetchedResource::ok(Some("image/png"), solid_png(180, Rgba([222, 165, 132, 255]))?),
        )
        .with(
            "https://www.rust-lang.org/static/images/rust-social.jpg",
            FetchedResource::ok(Some("image/png"), solid_png(600, Rgba([0, 0, 0, 255]))?),
        );

    Ok((
        Arc::new(ScriptedEngineFactory::new(Arc::new(web))),
        Arc::new(fetcher),
    ))
}

fn solid_png(size: u32, color: Rgba<u8>) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(RgbaImage::from_pixel(size, size, color))
        .write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

fn report(router: &NavigationRouter) {
    let registry = router.registry();
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("📑 {} tab(s)", registry.count());
    for tab in registry.tabs() {
        let marker = if tab.id == registry.active_id() { "▶" } else { " " };
        let snapshot = router
            .snapshot(tab.id)
            .map(|s| format!("{}x{}", s.width(), s.height()))
            .unwrap_or_else(|| "-".to_string());
        let icon = router
            .cached_icon(&tab.current_url)
            .map(|i| format!("{}x{}", i.width(), i.height()))
            .unwrap_or_else(|| "-".to_string());
        println!(
            " {} {} | {} | snapshot {} | icon {}",
            marker, tab.title, tab.current_url, snapshot, icon
        );
    }

    let history = router.history();
    println!("🕘 {} history entr{}", history.len(), if history.len() == 1 { "y" } else { "ies" });
    for entry in history.entries().take(10) {
        println!("   • {} ({})", entry.title, entry.url);
    }

    let state = router.navigation_state();
    if let Some(notice) = state.notice {
        println!("⚠️  {}", notice);
    }
}
