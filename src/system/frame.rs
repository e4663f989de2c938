//! Frame loop subscription.
//!
//! The display is driven by a dedicated thread ticking at a fixed rate. The
//! subscription is a scoped guard: dropping it stops and joins the thread.

use crate::error::{Result, ScoreError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub struct FrameSubscription {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl FrameSubscription {
    /// Calls `tick` `rate` times per second until it returns `false` or the
    /// subscription is dropped.
    pub fn start<F>(rate: u32, mut tick: F) -> Result<Self>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();
        let tick_duration = Duration::from_nanos(1_000_000_000 / rate.max(1) as u64);

        let handle = thread::Builder::new()
            .name("Frame Thread".to_string())
            .spawn(move || {
                log::info!("FRAME: Thread started at {} Hz", rate);
                let mut next_tick = Instant::now();

                while !thread_stop.load(Ordering::Relaxed) {
                    if !tick() {
                        break;
                    }

                    next_tick += tick_duration;
                    let now = Instant::now();
                    if now < next_tick {
                        thread::sleep(next_tick - now);
                    } else {
                        // Running late: do not try to catch up
                        next_tick = now;
                    }
                }

                thread_stop.store(true, Ordering::Relaxed);
                log::info!("FRAME: Thread stopped");
            })
            .map_err(|e| ScoreError::Config(format!("failed to spawn frame thread: {}", e)))?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// False once the tick callback asked to stop.
    pub fn is_running(&self) -> bool {
        !self.stop.load(Ordering::Relaxed)
    }
}

impl Drop for FrameSubscription {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("FRAME: Thread panicked");
            }
        }
    }
}
