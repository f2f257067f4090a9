use std::env;
use std::fs::File;
use std::io::BufWriter;
use std::process;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use reliability::config;
use reliability::delay_model;
use reliability::distribution_store::Store;
use reliability::error::{Error, Result};
use reliability::precomputation;
use reliability::realtime;
use reliability::timetable::Timetable;
use reliability::types;

fn dump_store(store: &Store, path: &str) -> Result<()> {
    let file = File::create(path).map_err(|source| Error::Io {
        path: path.to_owned(),
        source,
    })?;
    serde_json::to_writer(BufWriter::new(file), store)?;
    Ok(())
}

fn run(config_path: &str) -> Result<()> {
    let start = Instant::now();
    let config = config::load_config(config_path)?;
    let mut timetable = Timetable::load(&config.timetable_path)?;
    info!(
        "loaded {} stations, {} routes and {} route edges from {}",
        timetable.stations.len(),
        timetable.routes.len(),
        timetable.route_edges.len(),
        config.timetable_path
    );
    let reference = config.reference_timestamp();
    if let Some(last) = timetable.route_edges.iter().flat_map(|e| &e.connections).map(|c| c.arrival.scheduled).max() {
        let end = chrono::DateTime::from_timestamp(types::from_mtime(last, reference), 0);
        info!("schedule from {} until {:?}", config.schedule_begin, end);
    }
    if let Ok(now) = SystemTime::now().duration_since(UNIX_EPOCH) {
        info!("now is {}", types::format_time(types::to_mtime(now.as_secs() as i64, reference)));
    }
    let s_t = delay_model::load_delay_model(&config)?;

    let mut store = Store::new();
    let report = precomputation::perform_precomputation(&timetable, s_t.as_ref(), &config, &mut store);
    info!("precomputation: {}", serde_json::to_string(&report)?);

    if let Some(path) = &config.realtime_path {
        let messages = realtime::load_messages(path)?;
        let report = realtime::apply_realtime_batch(&mut timetable, s_t.as_ref(), &config, &mut store, &messages);
        info!("realtime: {}", serde_json::to_string(&report)?);
    }

    if let Some(path) = &config.dump_path {
        dump_store(&store, path)?;
        info!("wrote {} distributions to {}", store.len(), path);
    }
    info!("done in {:?}", start.elapsed());
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("usage: {} <config.json>", args[0]);
        process::exit(2);
    }
    if let Err(e) = run(&args[1]) {
        error!("{}", e);
        process::exit(1);
    }
}
