//! The delivery engine: batching timer, queue flush, retry, circuit.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rand::Rng;

use crate::client::Shared;
use crate::constants::BEACON_MAX_BYTES;
use crate::macros::beam_debug;
use crate::protocol::LogEntry;
use crate::store::LogStore;
use crate::transport::BatchRequest;

struct WorkerState {
    shutdown: bool,
    kick: bool,
    interval: Duration,
}

/// The background worker driving periodic flushes.
///
/// A single repeating timer implemented as a condvar timeout: each tick
/// runs one flush and re-arms; a kick (queue reached the batch size)
/// flushes immediately; a configuration change replaces the interval in
/// place. The rate-limiter janitor rides along on every tick.
pub(crate) struct DeliveryWorker {
    state: Arc<(Mutex<WorkerState>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

impl DeliveryWorker {
    pub(crate) fn start(shared: Arc<Shared>) -> Self {
        let interval = shared.options().batch_interval;
        let state = Arc::new((
            Mutex::new(WorkerState {
                shutdown: false,
                kick: false,
                interval,
            }),
            Condvar::new(),
        ));

        let worker_state = state.clone();
        let handle = thread::Builder::new()
            .name("logbeam-delivery".into())
            .spawn(move || {
                let (lock, cvar) = worker_state.as_ref();
                let mut guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
                let mut last_flush = Instant::now();
                loop {
                    if guard.shutdown {
                        return;
                    }
                    // a kick raised while the previous flush ran must not
                    // be slept through
                    let kicked = std::mem::take(&mut guard.kick);
                    if kicked || last_flush.elapsed() >= guard.interval {
                        drop(guard);
                        flush_queue(&shared, false);
                        shared
                            .limiter
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .purge_stale();
                        last_flush = Instant::now();
                        guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
                        continue;
                    }
                    let timeout = guard
                        .interval
                        .checked_sub(last_flush.elapsed())
                        .unwrap_or_else(|| Duration::from_secs(0));
                    guard = cvar
                        .wait_timeout(guard, timeout)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            })
            .ok();

        DeliveryWorker { state, handle }
    }

    /// Requests an immediate flush.
    pub(crate) fn kick(&self) {
        let (lock, cvar) = self.state.as_ref();
        lock.lock().unwrap_or_else(PoisonError::into_inner).kick = true;
        cvar.notify_one();
    }

    /// Replaces the tick interval; takes effect on the next wakeup.
    pub(crate) fn set_interval(&self, interval: Duration) {
        let (lock, cvar) = self.state.as_ref();
        lock.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .interval = interval;
        cvar.notify_one();
    }

    pub(crate) fn shutdown(&mut self) {
        {
            let (lock, cvar) = self.state.as_ref();
            lock.lock()
                .unwrap_or_else(PoisonError::into_inner)
                .shutdown = true;
            cvar.notify_one();
        }
        if let Some(handle) = self.handle.take() {
            handle.join().ok();
        }
    }
}

impl Drop for DeliveryWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Flushes pending batches.
///
/// Three preconditions: not already sending (`is_sending` is the sole
/// serialization point), circuit not open, and a configured DSN. During a
/// regular flush each delivered batch chains into the next while records
/// remain; the shutdown flush sends what a single pass can and leaves the
/// rest persisted.
pub(crate) fn flush_queue(shared: &Shared, is_unload: bool) {
    if shared.is_sending.swap(true, Ordering::SeqCst) {
        return;
    }
    flush_inner(shared, is_unload);
    shared.is_sending.store(false, Ordering::SeqCst);
}

fn flush_inner(shared: &Shared, is_unload: bool) {
    loop {
        {
            let mut circuit = shared
                .circuit
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if !circuit.allow() {
                return;
            }
        }

        let options = shared.options();
        let Some(dsn) = options.dsn.clone() else {
            return;
        };
        let transport = shared
            .transport
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(transport) = transport else { return };

        // batch selection: drain the oldest records available
        let (batch, from_store) = match &shared.store {
            Some(store) => match store.read_oldest(options.batch_size) {
                Ok(batch) => (batch, true),
                Err(err) => {
                    beam_debug!(options, "failed to read batch from store: {}", err);
                    return;
                }
            },
            None => {
                let mut queue = shared.queue.lock().unwrap_or_else(PoisonError::into_inner);
                let take = options.batch_size.min(queue.len());
                (queue.drain(..take).collect::<Vec<_>>(), false)
            }
        };
        if batch.is_empty() {
            return;
        }
        let ids: Vec<String> = batch.iter().filter_map(|entry| entry.id.clone()).collect();

        let body = match serde_json::to_vec(&batch) {
            Ok(body) => body,
            Err(err) => {
                beam_debug!(options, "failed to serialize batch: {}", err);
                restore_memory_batch(shared, batch, from_store);
                return;
            }
        };
        let request = BatchRequest {
            dsn,
            api_key: options.api_key.clone(),
            body,
        };

        // on shutdown the beacon goes first; a queued beacon is a success
        let mut attempt = if is_unload
            && request.body.len() < BEACON_MAX_BYTES
            && transport.send_beacon(&request)
        {
            Ok(())
        } else {
            transport.send_batch(&request)
        };

        let max_retries = if is_unload { 0 } else { options.max_retries };
        let mut retries = 0u32;
        let delivered = loop {
            match attempt {
                Ok(()) => break true,
                Err(err) => {
                    let opened = {
                        let mut circuit = shared
                            .circuit
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner);
                        circuit.record_failure();
                        circuit.is_open()
                    };
                    if let Some(callback) = &options.on_send_failure {
                        callback(&err, &batch);
                    }
                    beam_debug!(options, "batch delivery failed: {}", err);
                    if opened || retries >= max_retries {
                        break false;
                    }
                    thread::sleep(backoff_delay(options.retry_delay, retries));
                    retries += 1;
                    attempt = transport.send_batch(&request);
                }
            }
        };

        if !delivered {
            // the batch stays persisted and is picked up by a later flush
            restore_memory_batch(shared, batch, from_store);
            return;
        }

        shared
            .circuit
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record_success();
        if let Some(callback) = &options.on_send_success {
            callback(&batch);
        }
        let more = if let (true, Some(store)) = (from_store, &shared.store) {
            if let Err(err) = store.delete_by_ids(&ids) {
                // chaining would re-deliver the undeleted batch
                beam_debug!(options, "failed to delete delivered records: {}", err);
                false
            } else {
                store
                    .read_oldest(1)
                    .map(|rest| !rest.is_empty())
                    .unwrap_or(false)
            }
        } else {
            let queue = shared.queue.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(fallback) = &shared.fallback {
                if queue.is_empty() {
                    fallback.clear();
                } else if let Err(err) = fallback.save(&queue) {
                    beam_debug!(options, "failed to rewrite fallback slot: {}", err);
                }
            }
            !queue.is_empty()
        };

        if !more || is_unload {
            return;
        }
    }
}

/// Puts an undelivered memory-sourced batch back at the front of the
/// queue. Store-sourced batches were never removed and need nothing.
fn restore_memory_batch(shared: &Shared, batch: Vec<LogEntry>, from_store: bool) {
    if from_store {
        return;
    }
    let mut queue = shared.queue.lock().unwrap_or_else(PoisonError::into_inner);
    let rest = std::mem::take(&mut *queue);
    *queue = batch;
    queue.extend(rest);
    if let Some(fallback) = &shared.fallback {
        let _ = fallback.save(&queue);
    }
}

fn backoff_delay(base: Duration, retries: u32) -> Duration {
    let exponential = base.saturating_mul(2u32.saturating_pow(retries));
    exponential + Duration::from_millis(rand::thread_rng().gen_range(0..100))
}
