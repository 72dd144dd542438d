use std::path::PathBuf;

use anyhow::{Context, Result, bail};

use flipbook::host::{self, PlayerContext, Viewport};
use flipbook::{PlaybackState, SequenceConfig, open_sequence};

fn usage() -> ! {
    eprintln!("usage: flipbook <sequence.json> | flipbook --user");
    std::process::exit(2);
}

fn load_config() -> Result<SequenceConfig> {
    let arg = std::env::args().nth(1).unwrap_or_else(|| usage());
    if arg == "--user" {
        let Some(loaded) = SequenceConfig::load_user() else {
            let path = SequenceConfig::user_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<no config dir>".into());
            bail!("no user config found at {path}");
        };
        return Ok(loaded?);
    }
    if arg.starts_with('-') {
        usage();
    }
    let path = PathBuf::from(arg);
    SequenceConfig::from_file(&path).with_context(|| format!("loading {}", path.display()))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let config = load_config()?;
    let sequence = open_sequence(&config).context("failed to open sequence")?;
    log::info!(
        "Playing {}{} frames at {} fps on a {} Hz tick ({}x{})",
        if sequence.runs_until_close() { "~" } else { "" },
        sequence.total_frames(),
        sequence.source_frame_rate(),
        config.tick_rate,
        config.target_width,
        config.target_height
    );

    let mut ctx = PlayerContext::new(
        Viewport {
            width: config.target_width,
            height: config.target_height,
        },
        config.tick_rate,
        sequence,
    );

    let mut last_shown = None;
    let report = host::run_headless(&mut ctx, None, |paint| {
        if last_shown != Some(paint.frame_number) {
            last_shown = Some(paint.frame_number);
            let at = paint.placement;
            log::debug!(
                "Paint frame {} ({}x{} at {:.1},{:.1} size {:.1}x{:.1})",
                paint.frame_number,
                paint.buffer.width(),
                paint.buffer.height(),
                at.x,
                at.y,
                at.width,
                at.height
            );
        }
    })?;

    log::info!(
        "{:?} after {} ticks in {:.2}s: {} frames, {} stalled ticks",
        report.state,
        report.ticks,
        report.elapsed.as_secs_f64(),
        report.frames_shown,
        report.stalls
    );

    if report.state == PlaybackState::Aborted {
        match ctx.sequence.error() {
            Some(e) => bail!("playback aborted: {e}"),
            None => bail!("playback aborted"),
        }
    }
    Ok(())
}
