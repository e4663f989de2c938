//! Playback, synchronization and viewport logic, and the frame thread that
//! drives them.

pub mod audio;
pub mod audio_thread;
pub mod backend;
pub mod player;
pub mod sync;
pub mod synth;
pub mod viewport;

use crate::error::Result;
use crate::state::ScoreDisplay;
use crate::system::frame::FrameSubscription;

/// Starts the frame thread for `display`.
///
/// Each tick runs one display frame:
/// 1. Handles system events (resize, focus, source changes, quit)
/// 2. Applies keyboard input and host actions
/// 3. Commits finished loads
/// 4. Polls playback, updates the highlight and auto-scroll
///
/// The thread ends when the host sends `SystemEvent::Quit` or the returned
/// subscription is dropped.
pub fn start_display(mut display: ScoreDisplay, frame_rate: u32) -> Result<FrameSubscription> {
    FrameSubscription::start(frame_rate, move || display.frame())
}
