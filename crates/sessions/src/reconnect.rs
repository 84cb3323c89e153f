//! Cancellable fixed-delay reconnect timers.
//!
//! Each scheduled phone gets its own timer task.  When the delay elapses the
//! phone is sent down the channel returned from [`ReconnectScheduler::new`];
//! whoever owns the receiver performs the reconnect.  Cancelling removes the
//! timer before it fires, so a deliberate deletion never races a pending
//! reconnect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use pb_domain::trace::TraceEvent;
use pb_domain::PhoneNumber;

struct Pending {
    id: u64,
    cancel: CancellationToken,
}

pub struct ReconnectScheduler {
    delay: Duration,
    next_id: AtomicU64,
    pending: Mutex<HashMap<PhoneNumber, Pending>>,
    fire: mpsc::UnboundedSender<PhoneNumber>,
}

impl ReconnectScheduler {
    pub fn new(delay: Duration) -> (Arc<Self>, mpsc::UnboundedReceiver<PhoneNumber>) {
        let (fire, rx) = mpsc::unbounded_channel();
        let scheduler = Arc::new(Self {
            delay,
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            fire,
        });
        (scheduler, rx)
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Arm a timer for `phone`, replacing any timer already pending for it.
    pub fn schedule(self: &Arc<Self>, phone: PhoneNumber) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();

        if let Some(prev) = self.pending.lock().insert(
            phone.clone(),
            Pending {
                id,
                cancel: cancel.clone(),
            },
        ) {
            prev.cancel.cancel();
        }

        TraceEvent::ReconnectScheduled {
            phone: phone.to_string(),
            delay_ms: self.delay.as_millis() as u64,
        }
        .emit();

        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(this.delay) => this.fire(phone, id),
            }
        });
    }

    /// Disarm the pending timer for `phone`.  Returns whether one existed.
    pub fn cancel(&self, phone: &PhoneNumber) -> bool {
        match self.pending.lock().remove(phone) {
            Some(p) => {
                p.cancel.cancel();
                tracing::debug!(phone = %phone, "pending reconnect cancelled");
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, phone: &PhoneNumber) -> bool {
        self.pending.lock().contains_key(phone)
    }

    pub fn cancel_all(&self) {
        for (_, p) in self.pending.lock().drain() {
            p.cancel.cancel();
        }
    }

    fn fire(&self, phone: PhoneNumber, id: u64) {
        // Remove and send under one lock so a concurrent cancel either wins
        // outright or sees nothing left to cancel.
        let mut pending = self.pending.lock();
        if pending.get(&phone).map(|p| p.id) != Some(id) {
            return;
        }
        pending.remove(&phone);
        if self.fire.send(phone.clone()).is_err() {
            tracing::debug!(phone = %phone, "reconnect receiver gone");
        }
    }
}
