//! Headless Quill EQ runner
//!
//! Starts the engine on the default devices, optionally applies a named
//! preset, and logs level/state events until interrupted.
//!
//! ```text
//! RUST_LOG=info quill [preset-name]
//! ```

use anyhow::{bail, Result};
use tracing::info;

use quill_core::{AudioEngine, Event, PRESETS};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let engine = AudioEngine::new()?;

    if let Some(name) = std::env::args().nth(1) {
        let Some((_, settings)) = PRESETS.iter().find(|(n, _)| n.eq_ignore_ascii_case(&name))
        else {
            let names: Vec<_> = PRESETS.iter().map(|(n, _)| *n).collect();
            bail!("unknown preset '{}' (available: {})", name, names.join(", "));
        };
        engine.params().apply_settings(settings);
        info!(preset = %name, "preset applied");
    }

    engine.start()?;
    info!("engine starting - press Ctrl+C to quit");

    while let Some(event) = engine.wait_event() {
        match event {
            Event::LevelUpdate { left, right } => {
                // Meters are chatty; keep them out of the default level
                tracing::debug!(left, right, "levels");
            }
            Event::Error { message } => {
                tracing::error!("{}", message);
            }
            other => info!(?other, "event"),
        }
    }

    Ok(())
}
