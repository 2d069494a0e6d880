//! Feedback loop: the counting animation while a request is outstanding.
//!
//! Every tick draws a random score, writes it to the board and plays a
//! tick tone. The board refuses the write once the attempt has left
//! `Awaiting`, which also ends the loop.

use super::board::Board;
use super::tone::ToneSink;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Range the jittering score is drawn from.
pub const SCORE_RANGE: RangeInclusive<u32> = 10_000..=99_999;

/// Start the loop for `attempt`. Resolves to the number of ticks written.
pub(crate) fn spawn(
    board: Arc<Board>,
    tone: Arc<dyn ToneSink>,
    attempt: u64,
    period: Duration,
    cancel_token: CancellationToken,
) -> JoinHandle<u32> {
    tokio::spawn(async move {
        let mut rng = StdRng::from_entropy();
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks = 0u32;

        loop {
            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => break,
                _ = ticker.tick() => {
                    let score = rng.gen_range(SCORE_RANGE);
                    if !board.jitter(attempt, score, tone.as_ref()) {
                        break;
                    }
                    ticks += 1;
                }
            }
        }

        log::debug!("[FEEDBACK] attempt {} stopped after {} ticks", attempt, ticks);
        ticks
    })
}
