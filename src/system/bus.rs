//! Shared channel infrastructure between the host, the frame thread and the
//! audio threads.
//!
//! The `SystemBus` is the communication hub of one score display, using
//! lock-free channels for message passing.

use crate::input::events::{DisplayAction, KeyInput};
use crate::models::ScoreSource;
use crossbeam_channel::{Receiver, Sender, unbounded};
use rodio::Source;
use std::fmt;
use std::path::PathBuf;

/// System-level events sent by the host to the frame thread.
#[derive(Debug, Clone, PartialEq)]
pub enum SystemEvent {
    /// Container resized to new dimensions.
    Resize { width: f64, height: f64 },
    /// Window height changed (normal layout depends on it).
    WindowHeight { height: f64 },
    /// Keyboard focus entered the component.
    FocusGained,
    /// Keyboard focus left the component.
    FocusLost,
    /// The host assigned a score locator.
    SetSource(ScoreSource),
    /// Shutdown requested.
    Quit,
}

/// Notifications sent from the display to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// Every page of the current generation is loaded. Once per generation.
    ScoreVisible,
    /// The highlighted element changed (`None` clears the highlight).
    Highlight { element_id: Option<String> },
    /// Scroll the container to this horizontal offset, smoothly.
    ScrollTo { left: f64 },
    /// The current generation failed to load its metadata.
    Errored,
    /// The reported playback time changed (`None` after stop).
    TimeChange { time: Option<f64> },
}

/// Commands sent to an audio thread.
pub enum AudioCommand {
    /// Load an audio file for playback.
    Load { path: PathBuf },
    /// Play a generated source from its start.
    Stream {
        source: Box<dyn Source<Item = f32> + Send>,
    },
    /// Queue interleaved samples behind the current ones.
    Append {
        samples: Vec<f32>,
        channels: u16,
        sample_rate: u32,
    },
    /// Drop everything queued.
    Clear,
    /// Start playback.
    Play,
    /// Pause playback.
    Pause,
    /// Stop and reset playback position.
    Stop,
    /// Seek to a position (in seconds).
    Seek { position_secs: f64 },
    /// Change volume level.
    SetVolume { volume: f32 },
}

impl fmt::Debug for AudioCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioCommand::Load { path } => write!(f, "Load({:?})", path),
            AudioCommand::Stream { .. } => write!(f, "Stream"),
            AudioCommand::Append { samples, .. } => write!(f, "Append({})", samples.len()),
            AudioCommand::Clear => write!(f, "Clear"),
            AudioCommand::Play => write!(f, "Play"),
            AudioCommand::Pause => write!(f, "Pause"),
            AudioCommand::Stop => write!(f, "Stop"),
            AudioCommand::Seek { position_secs } => write!(f, "Seek({:.3})", position_secs),
            AudioCommand::SetVolume { volume } => write!(f, "SetVolume({})", volume),
        }
    }
}

/// Aggregates the cross-thread communication channels.
///
/// - Raw keyboard events from the host
/// - Display actions (clicks, transport buttons, bound keys)
/// - System events (resize, focus, source changes, quit)
/// - Host notifications going out
///
/// Audio threads own their command channel; see `logic::audio_thread`.
#[derive(Clone)]
pub struct SystemBus {
    /// Host → Frame: raw keyboard events.
    pub raw_input_tx: Sender<KeyInput>,
    pub raw_input_rx: Receiver<KeyInput>,

    /// Host → Frame: display actions.
    pub action_tx: Sender<DisplayAction>,
    pub action_rx: Receiver<DisplayAction>,

    /// Host → Frame: system events.
    pub sys_tx: Sender<SystemEvent>,
    pub sys_rx: Receiver<SystemEvent>,

    /// Frame → Host: notifications.
    pub host_tx: Sender<HostEvent>,
    pub host_rx: Receiver<HostEvent>,
}

impl SystemBus {
    /// Creates a new system bus with all channels initialized.
    pub fn new() -> Self {
        let (raw_input_tx, raw_input_rx) = unbounded();
        let (action_tx, action_rx) = unbounded();
        let (sys_tx, sys_rx) = unbounded();
        let (host_tx, host_rx) = unbounded();

        Self {
            raw_input_tx,
            raw_input_rx,
            action_tx,
            action_rx,
            sys_tx,
            sys_rx,
            host_tx,
            host_rx,
        }
    }

    /// Sends a host notification; a host that stopped listening is not an error.
    pub fn notify(&self, event: HostEvent) {
        let _ = self.host_tx.send(event);
    }
}

impl Default for SystemBus {
    fn default() -> Self {
        Self::new()
    }
}
