mod attendance;
mod calc;
mod config;
mod db;
mod drafts;
mod error;
mod fields;
mod ipc;
mod model;
mod pipeline;
mod reorder;
mod stats;

use std::io::{self, BufRead, Write};
use tracing::{info, warn};

fn main() {
    let cfg = config::DaemonConfig::from_env();
    config::init_logging(&cfg);
    info!(version = env!("CARGO_PKG_VERSION"), "gradesheetd starting");

    let mut state = ipc::AppState::default();
    if let Some(path) = cfg.workspace.as_deref() {
        // A bad startup workspace leaves the daemon up; the UI can select another.
        if let Err(e) = ipc::open_workspace(&mut state, path) {
            warn!(workspace = %path.display(), error = %e, "startup workspace not opened");
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to answer to; reply without one.
                warn!(error = %e, "unparseable request line");
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    info!("stdin closed, shutting down");
}
