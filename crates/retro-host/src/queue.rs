//! Work the emulation thread hands to the host thread.
//!
//! Commands are executed in enqueue order by [`CommandReceiver::drain`], which
//! the host calls once per tick. Audio initialization is the one command the
//! producer waits on: the run loop must not start before a sink exists.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use tracing::{debug, warn};

use crate::host::{AudioOutput, ImageFormat};

/// Interval at which a waiting producer re-checks whether it should give up.
const REPLY_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub(crate) type AudioReplySender = Sender<Box<dyn AudioOutput>>;

/// One unit of deferred host-thread work.
pub enum DeferredCommand {
    /// Open the audio device and send the output back.
    InitAudio {
        sample_rate: f64,
        buffer_secs: f32,
        reply: AudioReplySender,
    },
    CreateTexture {
        width: u32,
        height: u32,
        format: ImageFormat,
        pixels: Vec<u8>,
        flip_y: bool,
    },
    UpdateTexture {
        pixels: Vec<u8>,
        flip_y: bool,
    },
}

impl std::fmt::Debug for DeferredCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InitAudio {
                sample_rate,
                buffer_secs,
                ..
            } => f
                .debug_struct("InitAudio")
                .field("sample_rate", sample_rate)
                .field("buffer_secs", buffer_secs)
                .finish_non_exhaustive(),
            Self::CreateTexture {
                width,
                height,
                format,
                pixels,
                flip_y,
            } => f
                .debug_struct("CreateTexture")
                .field("width", width)
                .field("height", height)
                .field("format", format)
                .field("bytes", &pixels.len())
                .field("flip_y", flip_y)
                .finish(),
            Self::UpdateTexture { pixels, flip_y } => f
                .debug_struct("UpdateTexture")
                .field("bytes", &pixels.len())
                .field("flip_y", flip_y)
                .finish(),
        }
    }
}

pub fn channel() -> (CommandSender, CommandReceiver) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (CommandSender { tx }, CommandReceiver { rx })
}

/// Producer half, owned by the emulation side.
#[derive(Clone)]
pub struct CommandSender {
    tx: Sender<DeferredCommand>,
}

impl CommandSender {
    /// Enqueues without blocking. Returns false once the host side is gone.
    pub fn send(&self, command: DeferredCommand) -> bool {
        self.tx.send(command).is_ok()
    }

    /// Asks the host thread to open the audio device and waits for the output.
    ///
    /// Gives up with `None` when `keep_waiting` turns false or the host side drops
    /// the request, so a stop request never deadlocks on this rendezvous.
    pub fn request_audio(
        &self,
        sample_rate: f64,
        buffer_secs: f32,
        keep_waiting: &AtomicBool,
    ) -> Option<Box<dyn AudioOutput>> {
        let (reply, response) = crossbeam_channel::bounded(1);
        if !self.send(DeferredCommand::InitAudio {
            sample_rate,
            buffer_secs,
            reply,
        }) {
            return None;
        }
        debug!(sample_rate, "waiting for host audio initialization");
        loop {
            match response.recv_timeout(REPLY_POLL_INTERVAL) {
                Ok(output) => return Some(output),
                Err(RecvTimeoutError::Timeout) => {
                    if !keep_waiting.load(Ordering::Acquire) {
                        return None;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    warn!("audio initialization request dropped by the host");
                    return None;
                }
            }
        }
    }
}

/// Consumer half, owned by the host thread.
pub struct CommandReceiver {
    rx: Receiver<DeferredCommand>,
}

impl CommandReceiver {
    /// Runs `f` on every queued command, oldest first, until the queue is empty.
    pub fn drain(&self, mut f: impl FnMut(DeferredCommand)) -> usize {
        let mut executed = 0;
        loop {
            match self.rx.try_recv() {
                Ok(command) => {
                    f(command);
                    executed += 1;
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return executed,
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::NullAudioOutput;
    use std::{sync::Arc, thread};

    fn update(tag: u8) -> DeferredCommand {
        DeferredCommand::UpdateTexture {
            pixels: vec![tag],
            flip_y: false,
        }
    }

    #[test]
    fn drain_runs_commands_in_fifo_order() {
        let (tx, rx) = channel();
        for tag in 0..5 {
            assert!(tx.send(update(tag)));
        }
        let mut seen = Vec::new();
        let count = rx.drain(|cmd| {
            if let DeferredCommand::UpdateTexture { pixels, .. } = cmd {
                seen.push(pixels[0]);
            }
        });
        assert_eq!(count, 5);
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
        assert_eq!(rx.drain(|_| {}), 0);
    }

    #[test]
    fn audio_request_blocks_until_the_host_replies() {
        let (tx, rx) = channel();
        let keep_waiting = Arc::new(AtomicBool::new(true));
        let waiting = keep_waiting.clone();
        let producer =
            thread::spawn(move || tx.request_audio(44_100.0, 0.1, &waiting).map(|o| o.frames_available()));

        let mut handled = 0;
        while handled == 0 {
            handled = rx.drain(|cmd| match cmd {
                DeferredCommand::InitAudio { reply, .. } => {
                    let _ = reply.send(Box::new(NullAudioOutput::new(128)));
                }
                other => panic!("unexpected command {other:?}"),
            });
            thread::yield_now();
        }
        assert_eq!(producer.join().expect("producer"), Some(128));
    }

    #[test]
    fn audio_request_gives_up_when_stopped() {
        let (tx, rx) = channel();
        let keep_waiting = AtomicBool::new(false);
        assert!(tx.request_audio(48_000.0, 0.1, &keep_waiting).is_none());
        // The request itself was still enqueued.
        assert_eq!(rx.drain(|_| {}), 1);
    }

    #[test]
    fn dropped_receiver_makes_send_fail() {
        let (tx, rx) = channel();
        drop(rx);
        assert!(!tx.send(update(0)));
        let keep_waiting = AtomicBool::new(true);
        assert!(tx.request_audio(48_000.0, 0.1, &keep_waiting).is_none());
    }
}
