//! Headless host: drives a score display from the terminal.
//!
//! Lines on stdin stand in for the keyboard and the pointer, host
//! notifications are logged.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use crossbeam_channel::RecvTimeoutError;
use score_display::DisplayConfig;
use score_display::host::{FileHostSurface, HostSurface, StaticHostSurface};
use score_display::input::{DisplayAction, Key, KeyInput, Modifiers};
use score_display::loader::{DefaultRepositoryFactory, Mscore, MscoreConverter, ScoreLoader, export_wd};
use score_display::logic::backend::DefaultBackendFactory;
use score_display::logic::start_display;
use score_display::models::ScoreSource;
use score_display::state::ScoreDisplay;
use score_display::system::bus::{HostEvent, SystemBus, SystemEvent};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "score-display", version, about = "Interactive score display")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load a score and play it, reading commands from stdin
    Play(PlayArgs),
    /// Export a score file to a pre-rendered `.wd` directory with MuseScore
    Export {
        score: PathBuf,
        /// Defaults to the score path with a `.wd` extension
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct PlayArgs {
    /// `.wd` directory (path or URL), or a score file with `--file`
    locator: String,
    /// Convert a score file instead of reading a pre-rendered directory
    #[arg(long)]
    file: bool,
    /// Host manifest with `<track>` and `<a>` elements, read once it exists
    #[arg(long, conflicts_with = "track")]
    host: Option<PathBuf>,
    /// Track as `src` or `src:type` (audio, midi, synth); repeatable
    #[arg(long)]
    track: Vec<String>,
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,
    #[arg(long, default_value_t = 1280.0)]
    width: f64,
    #[arg(long, default_value_t = 900.0)]
    height: f64,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Cli::parse().command {
        Command::Play(args) => play(args),
        Command::Export { score, output } => {
            let output = output.unwrap_or_else(|| score.with_extension("wd"));
            export_wd(&Mscore::from_env(), &score, &output)
                .with_context(|| format!("exporting {}", score.display()))?;
            log::info!("MAIN: Exported {}", output.display());
            Ok(())
        }
    }
}

fn play(args: PlayArgs) -> anyhow::Result<()> {
    log::info!("MAIN: Booting score display...");
    let config = DisplayConfig::load(&args.config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("Loader Thread")
        .build()
        .context("starting the loader runtime")?;

    let bus = SystemBus::new();
    let converter = Arc::new(MscoreConverter::new(Mscore::from_env()));
    let repositories = Arc::new(DefaultRepositoryFactory::new(config.source.clone(), converter));
    let loader = ScoreLoader::new(
        runtime.handle().clone(),
        repositories,
        config.loader.clone(),
        config.positions.clone(),
    );
    let backends = Box::new(DefaultBackendFactory::new(
        config.playback.clone(),
        config.synth.clone(),
    ));
    let display = ScoreDisplay::new(bus.clone(), &config, loader, backends, host_surface(&args));

    let source = if args.file {
        ScoreSource::file(&args.locator)
    } else {
        ScoreSource::directory(&args.locator)
    };
    bus.sys_tx.send(SystemEvent::Resize {
        width: args.width,
        height: args.height,
    })?;
    bus.sys_tx.send(SystemEvent::SetSource(source))?;
    bus.sys_tx.send(SystemEvent::FocusGained)?;

    let subscription = start_display(display, config.playback.frame_rate)?;
    spawn_stdin_thread(bus.clone())?;

    while subscription.is_running() {
        match bus.host_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => report(&event),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    drop(subscription);
    log::info!("MAIN: Bye");
    Ok(())
}

fn host_surface(args: &PlayArgs) -> Box<dyn HostSurface> {
    if let Some(path) = &args.host {
        return Box::new(FileHostSurface::new(path));
    }
    if args.track.is_empty() {
        return Box::new(StaticHostSurface::empty());
    }

    let markup: String = args
        .track
        .iter()
        .map(|entry| {
            let (src, engine) = match entry.rsplit_once(':') {
                Some((src, engine)) if matches!(engine, "audio" | "midi" | "synth") => (src, engine),
                _ => (entry.as_str(), ""),
            };
            format!(
                r#"<track src="{}" type="{}"/>"#,
                quick_xml::escape::escape(src),
                engine
            )
        })
        .collect();
    Box::new(StaticHostSurface::new(markup))
}

fn report(event: &HostEvent) {
    match event {
        HostEvent::ScoreVisible => log::info!("HOST: Score visible"),
        HostEvent::Errored => log::error!("HOST: Score failed to load"),
        HostEvent::Highlight {
            element_id: Some(id),
        } => log::info!("HOST: Highlight element {}", id),
        HostEvent::Highlight { element_id: None } => log::info!("HOST: Highlight cleared"),
        HostEvent::ScrollTo { left } => log::info!("HOST: Scroll to {:.0}", left),
        HostEvent::TimeChange { time } => log::debug!("HOST: Time {:?}", time),
    }
}

/// What one stdin line turns into.
#[derive(Debug, PartialEq)]
enum Outgoing {
    Key(KeyInput),
    Action(DisplayAction),
    System(SystemEvent),
}

fn parse_command(line: &str) -> Option<Outgoing> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let number = |i: usize| words.get(i).and_then(|w| w.parse::<f64>().ok());

    let outgoing = match words.as_slice() {
        ["key", name, modifiers @ ..] => {
            let mut held = Modifiers::default();
            for modifier in modifiers {
                match *modifier {
                    "shift" => held.shift = true,
                    "ctrl" => held.ctrl = true,
                    "alt" => held.alt = true,
                    "meta" => held.meta = true,
                    _ => return None,
                }
            }
            let key: Key = name.parse().ok()?;
            Outgoing::Key(KeyInput {
                key,
                modifiers: held,
            })
        }
        ["space"] | ["left"] | ["right"] | ["s"] | ["z"] => {
            Outgoing::Key(KeyInput::plain(words[0].parse().ok()?))
        }
        ["play"] => Outgoing::Action(DisplayAction::TogglePlay),
        ["stop"] => Outgoing::Action(DisplayAction::Stop),
        ["next"] => Outgoing::Action(DisplayAction::NextTrack),
        ["track", index] => Outgoing::Action(DisplayAction::SelectTrack(index.parse().ok()?)),
        ["seek", _] => Outgoing::Action(DisplayAction::SeekTo(number(1)?)),
        ["progress", _] => Outgoing::Action(DisplayAction::SeekRatio(number(1)?)),
        ["click", id] => Outgoing::Action(DisplayAction::ClickElement(id.to_string())),
        ["page", page, _, _] => Outgoing::Action(DisplayAction::ClickPage {
            page: page.parse::<usize>().ok()?.checked_sub(1)?,
            x: number(2)?,
            y: number(3)?,
        }),
        ["scroll", _] => Outgoing::Action(DisplayAction::Scrolled(number(1)?)),
        ["resize", _, _] => Outgoing::System(SystemEvent::Resize {
            width: number(1)?,
            height: number(2)?,
        }),
        ["focus"] => Outgoing::System(SystemEvent::FocusGained),
        ["blur"] => Outgoing::System(SystemEvent::FocusLost),
        ["open", locator] => Outgoing::System(SystemEvent::SetSource(ScoreSource::directory(locator))),
        ["convert", locator] => Outgoing::System(SystemEvent::SetSource(ScoreSource::file(locator))),
        ["quit"] => Outgoing::System(SystemEvent::Quit),
        _ => return None,
    };
    Some(outgoing)
}

/// Reads commands until stdin closes, then asks the display to quit.
fn spawn_stdin_thread(bus: SystemBus) -> anyhow::Result<()> {
    thread::Builder::new()
        .name("Stdin Thread".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let sent = match parse_command(&line) {
                    Some(Outgoing::Key(input)) => bus.raw_input_tx.send(input).is_ok(),
                    Some(Outgoing::Action(action)) => bus.action_tx.send(action).is_ok(),
                    Some(Outgoing::System(event)) => bus.sys_tx.send(event).is_ok(),
                    None => {
                        log::warn!("MAIN: Unknown command '{}'", line.trim());
                        true
                    }
                };
                if !sent {
                    return;
                }
            }
            let _ = bus.sys_tx.send(SystemEvent::Quit);
        })
        .context("spawning the stdin thread")?;
    Ok(())
}
