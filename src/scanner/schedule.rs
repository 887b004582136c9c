use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

/// Run `tick` now and then every `period` until `stop` reads true or its
/// sender is dropped. Stop is only checked between ticks, so a cycle that has
/// started always runs to completion. Overrunning cycles delay the next tick
/// instead of bunching up.
pub async fn run_every<F, Fut>(name: &str, period: Duration, mut stop: watch::Receiver<bool>, mut tick: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if *stop.borrow_and_update() {
            break;
        }
        tokio::select! {
            _ = ticker.tick() => {}
            changed = stop.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
        }
        if *stop.borrow() {
            break;
        }
        tick().await;
    }
    info!("{name} stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn first_tick_is_immediate_then_periodic() {
        let (stop_tx, stop_rx) = watch::channel(false);
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let handle = tokio::spawn(async move {
            run_every("test", Duration::from_secs(10), stop_rx, move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await;
        });

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        stop_tx.send(true).unwrap();
        handle.await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_tick_finishes_before_stop() {
        let (stop_tx, stop_rx) = watch::channel(false);
        let finished = Arc::new(AtomicUsize::new(0));
        let f = finished.clone();
        let handle = tokio::spawn(async move {
            run_every("slow", Duration::from_secs(10), stop_rx, move || {
                let f = f.clone();
                async move {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    f.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await;
        });

        tokio::time::sleep(Duration::from_secs(2)).await;
        stop_tx.send(true).unwrap();
        handle.await.unwrap();
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_sender_stops_the_loop() {
        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run_every("orphan", Duration::from_secs(10), stop_rx, || async {}));
        tokio::time::sleep(Duration::from_secs(1)).await;
        drop(stop_tx);
        handle.await.unwrap();
    }
}
