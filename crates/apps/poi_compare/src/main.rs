use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use session::{
    ClientConfig, Driver, ReqwestClient, Session, SessionStore, Viewport, encode, fragment,
    resolve_state, unix_time_ms,
};
use streaming::{DatasetCatalog, SessionEvent};

mod report;

use report::RunSummary;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Compare POI datasets against OpenStreetMap (Overpass) or Wikidata"
)]
struct Args {
    /// Dataset catalog JSON file: {"country": {"datasetId": {"url": "..."}}}
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Dataset to load and switch on, as id=baseUrl (repeatable)
    #[arg(long = "dataset", value_parser = parse_dataset)]
    datasets: Vec<(String, String)>,

    /// Catalog dataset id to switch on (repeatable)
    #[arg(long = "activate")]
    activate: Vec<String>,

    /// Map center latitude
    #[arg(long, allow_negative_numbers = true)]
    lat: Option<f64>,

    /// Map center longitude
    #[arg(long, allow_negative_numbers = true)]
    lon: Option<f64>,

    /// Map zoom level
    #[arg(long, default_value_t = 15)]
    zoom: u8,

    /// State string or URL fragment to restore; takes precedence over the
    /// state file
    #[arg(long)]
    state: Option<String>,

    /// Where the session state is remembered (default: $POI_STATE_FILE)
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Setting to switch on, e.g. hideCompletePOI (repeatable)
    #[arg(long = "setting")]
    settings: Vec<String>,

    /// Provider endpoints JSON file
    #[arg(long)]
    endpoints: Option<PathBuf>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

fn parse_dataset(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((id, url)) if !id.is_empty() && !url.is_empty() => {
            Ok((id.to_string(), url.to_string()))
        }
        _ => Err(format!("expected id=baseUrl, got `{s}`")),
    }
}

/// Log how each added, scored or restyled point would be drawn.
fn log_event(session: &Session, event: SessionEvent) {
    match event {
        SessionEvent::PointAdded { key, index }
        | SessionEvent::PointScored { key, index }
        | SessionEvent::PointRestyled { key, index } => {
            if let Some(point) = session.store().points(&key).get(index) {
                let marker = session.display().marker(point);
                debug!(tile = %key, index, grade = ?marker.grade, visible = marker.visible, "point");
            }
        }
        other => debug!(event = ?other, "session event"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = ClientConfig::load(args.endpoints.as_deref())?;
    let store = args
        .state_file
        .clone()
        .or_else(|| config.state_file.clone())
        .map(SessionStore::new);

    let mut session = Session::new(config.endpoints.clone());
    let mut effects = Vec::new();

    if let Some(path) = &args.catalog {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading catalog {}", path.display()))?;
        let catalog = DatasetCatalog::from_json(&text)
            .with_context(|| format!("parsing catalog {}", path.display()))?;
        effects.extend(session.add_catalog(&catalog));
    }
    for (id, url) in &args.datasets {
        effects.push(session.add_dataset(id, url));
        effects.extend(session.set_dataset_active(id, true));
    }

    let stored = match &store {
        Some(store) => store.load(unix_time_ms()).unwrap_or_else(|err| {
            warn!(path = %store.path().display(), "ignoring stored state: {err}");
            None
        }),
        None => None,
    };
    if let Some(state) = resolve_state(args.state.as_deref(), stored) {
        info!(state = %state, "restoring session state");
        let (restored, _) = session.apply_state_str(&state);
        effects.extend(restored);
    }

    for id in &args.activate {
        effects.extend(session.set_dataset_active(id, true));
    }
    for id in &args.settings {
        effects.extend(session.change_setting(id, true));
    }
    match (args.lat, args.lon) {
        (Some(lat), Some(lon)) => {
            effects.extend(session.set_view(Viewport::new(args.zoom, lat, lon)))
        }
        (None, None) => {}
        _ => bail!("--lat and --lon must be given together"),
    }
    if session.view().is_none() {
        bail!("no map view: pass --lat/--lon or a state with a map segment");
    }

    let client = ReqwestClient::new(config.http_timeout)?;
    let mut driver = Driver::new(&client).with_event_sink(log_event);
    if let Some(store) = store {
        driver = driver.with_store(store);
    }
    let report = driver.run(&mut session, effects).await;

    let summary = RunSummary::new(&session, report, fragment(&encode(&session.state())));
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        summary.print_text();
    }
    Ok(())
}
