use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Style},
    widgets::Paragraph,
    Terminal,
};
use tokio::runtime::Runtime;
use tracing::{info, warn};

use agrowatch::app::{export_json, write_export, App, View};
use agrowatch::backend::{HistoryChain, HttpBackend, SnapshotProvider};
use agrowatch::binder::{Binder, ChannelSurface, DisplaySurface};
use agrowatch::config::{Backoff, Settings};
use agrowatch::data::parse_duration;
use agrowatch::events;
use agrowatch::feed::FeedClient;
use agrowatch::headless::LogSurface;
use agrowatch::location::{LocationResolver, LocationStore};
use agrowatch::logging::{self, LogTarget, DEFAULT_LOG_FILE};
use agrowatch::source::{TcpTransport, Transport, WebSocketTransport};
use agrowatch::ui::{self, Theme};

/// How long shutdown waits for background tasks.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "agrowatch", version)]
#[command(about = "Live terminal dashboard for agriculture and environmental sensor telemetry")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short = 'C', long)]
    config: Option<PathBuf>,

    /// Backend HTTP address (e.g., "http://localhost:5001")
    #[arg(short, long)]
    backend: Option<String>,

    /// WebSocket URL of the live feed (defaults to the backend address)
    #[arg(short, long, conflicts_with = "connect")]
    url: Option<String>,

    /// Read the live feed as newline-delimited JSON from a TCP endpoint (host:port)
    #[arg(short, long)]
    connect: Option<String>,

    /// History refresh interval (e.g., "10s", "1m")
    #[arg(long)]
    history_interval: Option<String>,

    /// Maximum number of history records shown
    #[arg(long)]
    history_limit: Option<usize>,

    /// Delay before reconnecting after the feed drops (e.g., "3s")
    #[arg(long)]
    reconnect_delay: Option<String>,

    /// Reconnect delay policy
    #[arg(long, value_enum)]
    backoff: Option<BackoffArg>,

    /// Skip location lookup
    #[arg(long)]
    no_location: bool,

    /// Color theme
    #[arg(long, value_enum, default_value_t = ThemeArg::Auto)]
    theme: ThemeArg,

    /// Log readings instead of drawing the dashboard
    #[arg(long)]
    headless: bool,

    /// Export the current reading and history to a JSON file and exit
    #[arg(short, long, conflicts_with = "headless")]
    export: Option<PathBuf>,

    /// Log file used while the dashboard owns the terminal
    #[arg(long, default_value = DEFAULT_LOG_FILE)]
    log_file: PathBuf,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackoffArg {
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ThemeArg {
    Auto,
    Dark,
    Light,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.headless || args.export.is_some() {
        logging::init(LogTarget::Stderr)?;
    } else {
        logging::init(LogTarget::File(&args.log_file))?;
    }

    let mut settings = Settings::load(args.config.as_deref())?;
    apply_overrides(&mut settings, &args)?;
    settings.validate()?;

    let rt = Runtime::new()?;

    if let Some(ref export_path) = args.export {
        return rt.block_on(export_to_file(&settings, export_path));
    }

    let transport = build_transport(&settings);
    info!(feed = transport.description(), backend = %settings.backend.base_url, "Starting");

    let result = if args.headless {
        rt.block_on(run_headless(&settings, transport))
    } else {
        run_with_tui(&rt, &settings, transport, args.theme)
    };

    rt.shutdown_timeout(SHUTDOWN_GRACE);
    result
}

/// Apply command-line flags on top of the loaded settings.
fn apply_overrides(settings: &mut Settings, args: &Args) -> Result<()> {
    if let Some(ref backend) = args.backend {
        settings.backend.base_url = backend.clone();
    }
    if let Some(ref url) = args.url {
        settings.feed.url = Some(url.clone());
        settings.feed.connect = None;
    }
    if let Some(ref addr) = args.connect {
        settings.feed.connect = Some(addr.clone());
    }
    if let Some(ref interval) = args.history_interval {
        settings.history.interval_secs = parse_duration(interval)
            .context("Invalid --history-interval")?
            .as_secs_f64();
    }
    if let Some(limit) = args.history_limit {
        settings.history.limit = limit;
    }
    if let Some(ref delay) = args.reconnect_delay {
        settings.feed.reconnect_delay_secs = parse_duration(delay)
            .context("Invalid --reconnect-delay")?
            .as_secs_f64();
    }
    if let Some(backoff) = args.backoff {
        settings.feed.backoff = match backoff {
            BackoffArg::Fixed => Backoff::Fixed,
            BackoffArg::Exponential => Backoff::Exponential,
        };
    }
    if args.no_location {
        settings.location.enabled = false;
    }
    Ok(())
}

fn build_transport(settings: &Settings) -> Arc<dyn Transport> {
    match settings.feed.connect {
        Some(ref addr) => Arc::new(TcpTransport::new(addr)),
        None => Arc::new(WebSocketTransport::new(&settings.feed_url())),
    }
}

fn build_backend(settings: &Settings) -> Result<HttpBackend> {
    let backend = HttpBackend::builder()
        .base_url(settings.backend.base_url.clone())
        .timeout(settings.backend_timeout())
        .build()?;
    Ok(backend)
}

fn build_location(settings: &Settings) -> Result<Option<LocationResolver>> {
    if !settings.location.enabled {
        return Ok(None);
    }

    // Nominatim rejects requests without an identifying user agent.
    let client = reqwest::Client::builder()
        .user_agent(concat!("agrowatch/", env!("CARGO_PKG_VERSION")))
        .timeout(settings.backend_timeout())
        .build()?;

    let mut resolver = LocationResolver::new(client);
    if let Some(path) = settings
        .location
        .cache_file
        .clone()
        .or_else(LocationStore::default_path)
    {
        resolver = resolver.with_store(LocationStore::new(path));
    }
    if let (Some(lat), Some(lon)) = (settings.location.latitude, settings.location.longitude) {
        resolver = resolver.with_coordinates(lat, lon);
    }
    Ok(Some(resolver))
}

/// Wire the feed, the backend and a surface into a binder.
fn build_binder<D: DisplaySurface>(
    settings: &Settings,
    feed: &FeedClient,
    surface: D,
) -> Result<Binder<D>> {
    let backend = build_backend(settings)?;
    let history = HistoryChain::from_backend(
        &backend,
        &settings.history.providers,
        settings.history.limit,
    );
    let current: Arc<dyn SnapshotProvider> = Arc::new(backend);

    let mut binder = Binder::new(
        feed.clone(),
        current,
        history,
        surface,
        settings.binder_config(),
    );
    if let Some(resolver) = build_location(settings)? {
        binder = binder.with_location(resolver);
    }
    Ok(binder)
}

/// Run without a terminal UI, logging every update.
async fn run_headless(settings: &Settings, transport: Arc<dyn Transport>) -> Result<()> {
    let feed = FeedClient::new(transport, settings.retry_policy());
    let binder = build_binder(settings, &feed, LogSurface::new())?;

    let stopper = feed.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping");
            stopper.close();
        }
    });

    feed.start();
    binder.run().await;
    feed.join().await;

    let stats = feed.stats();
    info!(
        accepted = stats.accepted,
        rejected = stats.rejected,
        connections = stats.connections,
        reconnects = stats.reconnects,
        "Stopped"
    );
    Ok(())
}

/// Run the dashboard: the binder on the runtime, the terminal on this thread.
fn run_with_tui(
    rt: &Runtime,
    settings: &Settings,
    transport: Arc<dyn Transport>,
    theme: ThemeArg,
) -> Result<()> {
    let theme = match theme {
        ThemeArg::Auto => Theme::auto_detect(),
        ThemeArg::Dark => Theme::dark(),
        ThemeArg::Light => Theme::light(),
    };

    let feed = FeedClient::new(transport, settings.retry_policy());
    let (surface, updates) = ChannelSurface::new();
    let binder = build_binder(settings, &feed, surface)?;

    let mut app = App::new(feed.description(), theme)
        .with_updates(updates)
        .with_refresh(binder.refresh_handle());

    let binder_task = {
        let _guard = rt.enter();
        feed.start();
        rt.spawn(binder.run())
    };

    let result = run_tui(&mut app);

    feed.close();
    rt.block_on(async {
        if tokio::time::timeout(SHUTDOWN_GRACE, async {
            let _ = binder_task.await;
            feed.join().await;
        })
        .await
        .is_err()
        {
            warn!("Background tasks did not stop in time");
        }
    });

    result
}

/// Run the TUI until the user quits
fn run_tui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Setup panic hook to restore terminal
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture);
        original_hook(panic);
    }));

    let result = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

fn run_app(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    // Minimum terminal size for usable display
    const MIN_WIDTH: u16 = 60;
    const MIN_HEIGHT: u16 = 12;

    while app.running {
        app.poll_updates();

        terminal.draw(|frame| {
            let area = frame.area();

            if area.width < MIN_WIDTH || area.height < MIN_HEIGHT {
                let msg = format!(
                    "Terminal too small: {}x{}\nMinimum: {}x{}\n\nResize to continue",
                    area.width, area.height, MIN_WIDTH, MIN_HEIGHT
                );
                let paragraph = Paragraph::new(msg)
                    .alignment(Alignment::Center)
                    .style(Style::default().fg(Color::Yellow));
                let centered = Rect::new(0, (area.height / 2).saturating_sub(2), area.width, 5);
                frame.render_widget(paragraph, centered.intersection(area));
                return;
            }

            let chunks = Layout::vertical([
                Constraint::Length(1), // Header bar
                Constraint::Length(1), // Tabs
                Constraint::Min(8),    // Content
                Constraint::Length(1), // Status bar
            ])
            .split(area);

            ui::common::render_header(frame, app, chunks[0]);
            ui::common::render_tabs(frame, app, chunks[1]);

            match app.current_view {
                View::Live => ui::live::render(frame, app, chunks[2]),
                View::History => ui::history::render(frame, app, chunks[2]),
            }

            ui::common::render_status_bar(frame, app, chunks[3]);

            if app.show_help {
                ui::common::render_help(frame, app, area);
            }
        })?;

        // Poll for events with a short timeout
        if let Some(event) = events::poll_event(Duration::from_millis(100))? {
            match event {
                Event::Key(key) => events::handle_key_event(app, key),
                Event::Mouse(mouse) => events::handle_mouse_event(app, mouse),
                _ => {}
            }
        }
    }

    Ok(())
}

/// Fetch the current reading and history once and write them to a JSON file
async fn export_to_file(settings: &Settings, export_path: &Path) -> Result<()> {
    let backend = build_backend(settings)?;
    let thresholds = &settings.thresholds;

    let snapshot = match backend.fetch_current().await {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            warn!("Current reading unavailable: {}", e);
            None
        }
    };
    let tiers = snapshot.as_ref().map(|s| thresholds.classify(s));

    let history = HistoryChain::from_backend(
        &backend,
        &settings.history.providers,
        settings.history.limit,
    )
    .load()
    .await;

    let export = export_json(snapshot.as_ref(), tiers.as_ref(), Some(&history));
    write_export(export_path, &export)?;

    println!("Exported dashboard state to: {}", export_path.display());
    Ok(())
}
