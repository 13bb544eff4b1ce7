use std::path::PathBuf;

use event_grid::state::ViewerState;
use event_grid::{ui, RunConfig};

fn main() -> eframe::Result {
    env_logger::init();

    // Optional first argument: a JSON run configuration.
    let state = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => match RunConfig::from_json_file(&path) {
            Ok(cfg) => ViewerState::from_config(&cfg),
            Err(e) => {
                log::error!("Failed to read config: {e:#}");
                ViewerState::with_status(format!("Error: {e:#}"))
            }
        },
        None => ViewerState::default(),
    };

    ui::run_viewer("Event Grid – Prediction Viewer", state)
}
