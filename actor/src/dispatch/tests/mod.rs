use super::*;
use futures::channel::{mpsc, oneshot};
use mailroom_runtime::Scope;
use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex as StdMutex,
    },
    time::Duration,
};


/// Observation surface shared with a probed dispatcher's handlers.
struct Probe {
    consumed: Arc<StdMutex<Vec<u32>>>,
    undelivered: Arc<StdMutex<Vec<(u32, Option<String>)>>>,
    completed: Arc<StdMutex<Vec<Option<String>>>>,
    entered: Arc<AtomicUsize>,
    overlapped: Arc<AtomicBool>,
}

impl Probe {
    fn consumed(&self) -> Vec<u32> {
        self.consumed.lock().expect("consumed lock").clone()
    }

    fn undelivered(&self) -> Vec<(u32, Option<String>)> {
        self.undelivered.lock().expect("undelivered lock").clone()
    }

    fn completed(&self) -> Vec<Option<String>> {
        self.completed.lock().expect("completed lock").clone()
    }

    fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }
}

/// Build a dispatcher whose handlers record everything they see and report
/// each completed message on the returned channel.
fn probed(scope: &Scope) -> (Dispatcher<u32>, Probe, mpsc::UnboundedReceiver<u32>) {
    probed_with_gate(scope, None)
}

/// Like [probed], but the first handler invocation waits on `gate` before
/// finishing, letting tests freeze a message in flight.
fn probed_with_gate(
    scope: &Scope,
    gate: Option<oneshot::Receiver<()>>,
) -> (Dispatcher<u32>, Probe, mpsc::UnboundedReceiver<u32>) {
    // Opt-in diagnostics: RUST_LOG=mailroom_actor=trace cargo test -- --nocapture
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let consumed = Arc::new(StdMutex::new(Vec::new()));
    let undelivered = Arc::new(StdMutex::new(Vec::new()));
    let completed = Arc::new(StdMutex::new(Vec::new()));
    let entered = Arc::new(AtomicUsize::new(0));
    let overlapped = Arc::new(AtomicBool::new(false));
    let inflight = Arc::new(AtomicBool::new(false));
    let gate = Arc::new(StdMutex::new(gate));
    let (done_tx, done_rx) = mpsc::unbounded();

    let dispatcher = Builder::new(scope.clone())
        .on_complete({
            let completed = completed.clone();
            move |cause: Option<Fault>| {
                completed
                    .lock()
                    .expect("completed lock")
                    .push(cause.map(|cause| cause.to_string()));
            }
        })
        .on_undelivered({
            let undelivered = undelivered.clone();
            move |msg: u32, cause: Option<Fault>| {
                undelivered
                    .lock()
                    .expect("undelivered lock")
                    .push((msg, cause.map(|cause| cause.to_string())));
            }
        })
        .build({
            let consumed = consumed.clone();
            let entered = entered.clone();
            let overlapped = overlapped.clone();
            let inflight = inflight.clone();
            let gate = gate.clone();
            move |msg: u32| {
                let consumed = consumed.clone();
                let entered = entered.clone();
                let overlapped = overlapped.clone();
                let inflight = inflight.clone();
                let gate = gate.lock().expect("gate lock").take();
                let done_tx = done_tx.clone();
                async move {
                    entered.fetch_add(1, Ordering::SeqCst);
                    if inflight.swap(true, Ordering::SeqCst) {
                        overlapped.store(true, Ordering::SeqCst);
                    }
                    if let Some(gate) = gate {
                        let _ = gate.await;
                    }
                    // Linger long enough that overlapping handlers would trip
                    // the detector.
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    consumed.lock().expect("consumed lock").push(msg);
                    inflight.store(false, Ordering::SeqCst);
                    let _ = done_tx.unbounded_send(msg);
                    Ok(())
                }
            }
        });

    let probe = Probe {
        consumed,
        undelivered,
        completed,
        entered,
        overlapped,
    };
    (dispatcher, probe, done_rx)
}

/// Poll `cond` until it holds, panicking after a bounded wait.
async fn eventually(mut cond: impl FnMut() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("condition not reached in time");
}
