//! Control-loop scheduler (§4.G).
//!
//! One task drains the stream store's change subscription. Each notified
//! operative id gets (or lazily spawns) a dedicated worker task woken over
//! a capacity-1 `mpsc` channel — a full channel means a step is already
//! pending, which is sufficient: every step re-reads the compacted view
//! from scratch, so coalescing duplicate wake-ups is correct.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::cancel::{CancelMap, CancelToken};
use crate::step::{run_step, ControlContext};

const ROOT_GROUP: &str = "__root__";

pub struct Scheduler {
    ctx: Arc<ControlContext>,
    cancel: Arc<CancelMap>,
    workers: Mutex<HashMap<String, mpsc::Sender<()>>>,
}

impl Scheduler {
    pub fn new(ctx: Arc<ControlContext>) -> Self {
        Self {
            ctx,
            cancel: Arc::new(CancelMap::new()),
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Drain the stream store's subscription until it closes. Intended to
    /// be spawned as a long-lived task.
    pub async fn run(self: Arc<Self>) {
        let mut changes = self.ctx.stream.subscribe();
        while let Some(operative_id) = changes.next().await {
            self.wake(&operative_id);
        }
    }

    fn wake(self: &Arc<Self>, operative_id: &str) {
        {
            let workers = self.workers.lock();
            if let Some(tx) = workers.get(operative_id) {
                let _ = tx.try_send(());
                return;
            }
        }

        let (tx, rx) = mpsc::channel(1);
        self.workers.lock().insert(operative_id.to_string(), tx.clone());

        let token = self.cancel.register(operative_id);
        self.cancel.add_to_group(ROOT_GROUP, operative_id);

        let scheduler = self.clone();
        let id = operative_id.to_string();
        tokio::spawn(scheduler.run_worker(id, rx, token));

        let _ = tx.try_send(());
    }

    async fn run_worker(self: Arc<Self>, operative_id: String, mut rx: mpsc::Receiver<()>, token: CancelToken) {
        while rx.recv().await.is_some() {
            if token.is_cancelled() {
                break;
            }
            if let Err(err) = run_step(&self.ctx, &operative_id).await {
                tracing::warn!(operative_id = %operative_id, error = %err, "control loop step failed");
            }
        }
        self.workers.lock().remove(&operative_id);
        self.cancel.remove(&operative_id);
        self.cancel.remove_from_group(ROOT_GROUP, &operative_id);
    }

    /// Cancel every in-flight and pending step, cascading from the root
    /// group to every registered operative token.
    pub fn cancel_all(&self) {
        self.cancel.cancel(ROOT_GROUP);
    }
}
