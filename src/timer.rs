//! src/timer.rs
//!
//! `ControlTimer`: a randomized, gateable heartbeat. Ticks are produced only
//! while armed; producing one tick disarms it until the next reset. All
//! state lives inside the timer's own task, mutated only via its command
//! channels, so no external locking is needed.

use rand::Rng;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant, Sleep};
use tokio_util::sync::CancellationToken;

enum ControlCommand {
    Reset,
    Stop,
}

/// Cloneable handle for resetting/stopping a `ControlTimer` from any task.
#[derive(Clone)]
pub struct ControlTimerCommands {
    commands: mpsc::Sender<ControlCommand>,
}

impl ControlTimerCommands {
    pub async fn reset(&self) {
        let _ = self.commands.send(ControlCommand::Reset).await;
    }

    pub async fn stop(&self) {
        let _ = self.commands.send(ControlCommand::Stop).await;
    }
}

/// Spawns the timer task and returns a cloneable command handle plus the
/// single-consumer tick receiver. `base` is jittered by +/-50% on every arm
/// to avoid synchronized gossip storms across a cohort.
pub fn spawn(base: Duration, shutdown: CancellationToken) -> (ControlTimerCommands, mpsc::Receiver<()>) {
    let (cmd_tx, mut cmd_rx) = mpsc::channel(8);
    let (tick_tx, tick_rx) = mpsc::channel(1);

    tokio::spawn(async move {
        let mut set = false;
        let mut deadline: std::pin::Pin<Box<Sleep>> = Box::pin(sleep(Duration::MAX));

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(ControlCommand::Reset) => {
                            let jittered = jitter(base);
                            deadline.as_mut().reset(Instant::now() + jittered);
                            set = true;
                        }
                        Some(ControlCommand::Stop) => {
                            deadline.as_mut().reset(Instant::now() + Duration::from_secs(3600 * 24));
                            set = false;
                        }
                        None => break,
                    }
                }
                _ = &mut deadline, if set => {
                    set = false;
                    if tick_tx.send(()).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    (ControlTimerCommands { commands: cmd_tx }, tick_rx)
}

fn jitter(base: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let factor: f64 = rng.gen_range(0.5..1.5);
    Duration::from_secs_f64(base.as_secs_f64() * factor)
}
