//! linetrack: live bus tracking CLI, terminal strip and JSON dashboard.

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use comfy_table::{Cell, Table};

use linetrack_core::config::{self, Config};
use linetrack_core::feed::FeedState;
use linetrack_core::format;
use linetrack_core::protocol;
use linetrack_core::render::TrackingSnapshot;
use linetrack_core::route::RouteModel;
use linetrack_core::session::{LineTrackingSession, TrackingOptions};
use linetrack_core::types::*;

mod api;
mod error;
mod live;
mod logging;
mod runner;
mod terminal;
mod web;

use api::{CitywayApi, LineApi};
use terminal::{TextStrip, DEFAULT_STRIP_WIDTH};

#[derive(Parser)]
#[command(name = "linetrack", version, about = "Live bus line tracker")]
struct Cli {
    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file [default: ~/.linetrack/config.yaml]
    #[arg(long, global = true, env = "LINETRACK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Line and goal selection; falls back to the `tracking` config section.
#[derive(Args)]
struct TargetArgs {
    /// Line id
    #[arg(short, long, env = "LINETRACK_LINE")]
    line: Option<String>,

    /// Line direction
    #[arg(short, long)]
    direction: Option<String>,

    /// Goal station id
    #[arg(short, long, env = "LINETRACK_GOAL")]
    goal: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow a line live and draw it in the terminal
    Track {
        #[command(flatten)]
        target: TargetArgs,

        /// Strip width in columns
        #[arg(long, default_value_t = DEFAULT_STRIP_WIDTH)]
        width: usize,
    },

    /// Follow a line live and serve snapshots over HTTP
    Serve {
        #[command(flatten)]
        target: TargetArgs,

        /// Bind address
        #[arg(long)]
        host: Option<String>,

        /// Port
        #[arg(long)]
        port: Option<u16>,
    },

    /// List the stations of a line with their route distances
    Stops {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Replay saved feed messages against a saved station list
    Replay {
        /// Station list response (JSON)
        stops: PathBuf,

        /// Feed messages, one socket message per line ("-" for stdin)
        frames: PathBuf,

        #[command(flatten)]
        target: TargetArgs,

        /// Strip width in columns
        #[arg(long, default_value_t = DEFAULT_STRIP_WIDTH)]
        width: usize,
    },

    /// Manage the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective config
    Show,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let config_path = cli.config.unwrap_or_else(config::config_file);
    let config = config::load_config_from(&config_path);

    match cli.command {
        Commands::Track { target, width } => cmd_track(&config, &target, width).await,
        Commands::Serve { target, host, port } => cmd_serve(&config, &target, host, port).await,
        Commands::Stops { target } => cmd_stops(&config, &target).await,
        Commands::Replay {
            stops,
            frames,
            target,
            width,
        } => cmd_replay(&config, &target, stops, frames, width),
        Commands::Config { action } => cmd_config(&config, config_path, action),
    }
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {message}");
    std::process::exit(1);
}

fn line_ref(config: &Config, target: &TargetArgs) -> Option<LineRef> {
    let line = target.line.clone().or_else(|| config.tracking.line.clone())?;
    let direction = target
        .direction
        .clone()
        .unwrap_or_else(|| config.tracking.direction.clone());
    Some(LineRef::new(line, direction))
}

fn goal_id(config: &Config, target: &TargetArgs) -> Option<String> {
    target.goal.clone().or_else(|| config.tracking.goal.clone())
}

/// Line and options for a live command; exits when either is missing.
fn resolve_target(config: &Config, target: &TargetArgs) -> (LineRef, TrackingOptions) {
    let line = line_ref(config, target)
        .unwrap_or_else(|| fail("no line selected (use --line or set tracking.line)"));
    let goal = goal_id(config, target)
        .unwrap_or_else(|| fail("no goal station selected (use --goal or set tracking.goal)"));
    (line, config.tracking.options(goal))
}

fn cityway(config: &Config) -> Arc<dyn LineApi> {
    Arc::new(CitywayApi::new(config.api.clone()))
}

fn print_frame(strip: &mut TextStrip, snapshot: &TrackingSnapshot) {
    snapshot.render(strip);
    println!("{}", strip.frame());
    println!();
}

async fn cmd_track(config: &Config, target: &TargetArgs, width: usize) {
    let (line, options) = resolve_target(config, target);
    let handle = runner::start_tracking(cityway(config), line, options)
        .await
        .unwrap_or_else(|e| fail(e));

    let mut snapshots = handle.subscribe();
    let mut strip = TextStrip::new(width);
    print_frame(&mut strip, &handle.snapshot());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                print_frame(&mut strip, &snapshot);
            }
        }
    }

    if let Some(session) = handle.join().await {
        println!(
            "Fixes: {} received, {} applied, {} vehicles",
            session.fixes_received,
            session.fixes_applied,
            session.vehicles().count()
        );
    }
}

async fn cmd_serve(config: &Config, target: &TargetArgs, host: Option<String>, port: Option<u16>) {
    let (line, options) = resolve_target(config, target);
    let host = host.unwrap_or_else(|| config.dashboard.host.clone());
    let port = port.unwrap_or(config.dashboard.port);

    let handle = runner::start_tracking(cityway(config), line, options)
        .await
        .unwrap_or_else(|e| fail(e));
    let state = Arc::new(web::AppState::new(handle.subscribe()));

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    if let Err(e) = web::serve(state, &host, port, shutdown).await {
        handle.shutdown();
        fail(e);
    }
    handle.join().await;
}

async fn cmd_stops(config: &Config, target: &TargetArgs) {
    let line = line_ref(config, target)
        .unwrap_or_else(|| fail("no line selected (use --line or set tracking.line)"));
    let stops = cityway(config)
        .fetch_stops(&line)
        .await
        .unwrap_or_else(|e| fail(e));

    let mut route = RouteModel::build(&stops).unwrap_or_else(|e| fail(e));
    if let Some(goal) = goal_id(config, target) {
        route.set_goal(&goal).unwrap_or_else(|e| fail(e));
    }

    println!();
    println!(
        "Line {} direction {}: {} stations, {}",
        line.line_id,
        line.direction,
        route.len(),
        format::format_distance(route.stations().last().map_or(0.0, |s| s.route_distance_m))
    );
    println!();
    print_station_table(&route);
}

fn print_station_table(route: &RouteModel) {
    let goal = route.goal().map(|g| g.route_distance_m);

    let mut table = Table::new();
    table.set_header(vec!["#", "Id", "Name", "Lat", "Lon", "Along route", "To goal"]);
    for (i, station) in route.stations().iter().enumerate() {
        let marker = if route.goal_index() == Some(i) { " @" } else { "" };
        table.add_row(vec![
            Cell::new(i),
            Cell::new(format!("{}{marker}", station.id)),
            Cell::new(&station.name),
            Cell::new(format!("{:.5}", station.location.lat)),
            Cell::new(format!("{:.5}", station.location.lon)),
            Cell::new(format::format_distance(station.route_distance_m)),
            Cell::new(
                goal.map(|g| format::format_distance(g - station.route_distance_m))
                    .unwrap_or("-".into()),
            ),
        ]);
    }
    println!("{table}");
}

fn cmd_replay(config: &Config, target: &TargetArgs, stops: PathBuf, frames: PathBuf, width: usize) {
    let goal = goal_id(config, target)
        .unwrap_or_else(|| fail("no goal station selected (use --goal or set tracking.goal)"));
    let line = line_ref(config, target).unwrap_or_else(|| LineRef::new("replay", "1"));

    let body = std::fs::read_to_string(&stops)
        .unwrap_or_else(|e| fail(format!("reading {}: {e}", stops.display())));
    let records = protocol::parse_stops(&body)
        .unwrap_or_else(|e| fail(format!("parsing {}: {e}", stops.display())));

    let mut session = LineTrackingSession::new(line, config.tracking.options(goal));
    session.load_route(&records).unwrap_or_else(|e| fail(e));
    session.on_feed_state(FeedState::Negotiating);
    session.on_feed_state(FeedState::Connected);

    let reader: Box<dyn BufRead> = if frames.to_str() == Some("-") {
        Box::new(io::stdin().lock())
    } else {
        let f = std::fs::File::open(&frames).unwrap_or_else(|e| {
            fail(format!("opening {}: {e}", frames.display()));
        });
        Box::new(io::BufReader::new(f))
    };

    let messages = runner::replay_messages(&mut session, reader);
    session.on_feed_state(FeedState::Disconnected);

    println!();
    println!(
        "Replay: {messages} messages, {} fixes, {} applied, {} vehicles",
        session.fixes_received,
        session.fixes_applied,
        session.vehicles().count()
    );
    println!();

    let snapshot = session.snapshot();
    println!("{}", terminal::render_frame(&snapshot, width));
    println!();
    print_vehicle_table(&snapshot);
}

fn print_vehicle_table(snapshot: &TrackingSnapshot) {
    if snapshot.vehicles.is_empty() {
        return;
    }

    let mut table = Table::new();
    table.set_header(vec![
        "Vehicle", "Along route", "Smoothed", "To goal", "ETA", "Last update", "Trail", "Next",
    ]);
    for v in &snapshot.vehicles {
        table.add_row(vec![
            Cell::new(&v.id),
            Cell::new(format::format_distance(v.route_distance_m)),
            Cell::new(
                v.smoothed_distance_m
                    .map(format::format_distance)
                    .unwrap_or("-".into()),
            ),
            Cell::new(format!(
                "{}{}",
                if v.distance_to_goal_m < 0.0 { "-" } else { "" },
                format::format_distance(v.distance_to_goal_m)
            )),
            Cell::new(format::format_duration(format::eta_seconds(v.distance_to_goal_m))),
            Cell::new(
                v.last_update
                    .map(format::format_clock)
                    .unwrap_or("-".into()),
            ),
            Cell::new(v.history.len()),
            Cell::new(if v.is_next { "*" } else { "" }),
        ]);
    }
    println!("{table}");
}

fn cmd_config(config: &Config, path: PathBuf, action: ConfigAction) {
    match action {
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                fail(format!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                ));
            }
            config::save_config_to(&Config::default(), &path).unwrap_or_else(|e| fail(e));
            println!("Wrote {}", path.display());
        }
        ConfigAction::Show => {
            println!("# {}", path.display());
            print!("{}", config::serialize_config(config));
        }
    }
}
