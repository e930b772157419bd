//! Outbound typing indicator.
//!
//! `typing:start` goes out on the first keystroke; every keystroke re-arms
//! an idle timer and `typing:stop` goes out when it expires, on an explicit
//! stop, or when the notifier is dropped.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

use courier_shared::protocol::TypingNotice;
use courier_shared::{ClientEvent, ConversationId, UserId};

use crate::transport::TransportHandle;

struct Active {
    notice: TypingNotice,
    generation: u64,
    timer: JoinHandle<()>,
}

#[derive(Default)]
struct TypingState {
    active: Option<Active>,
    generation: u64,
}

pub struct TypingNotifier {
    transport: TransportHandle,
    idle: Duration,
    state: Arc<Mutex<TypingState>>,
}

impl TypingNotifier {
    pub fn new(transport: TransportHandle, idle: Duration) -> Self {
        Self {
            transport,
            idle,
            state: Arc::new(Mutex::new(TypingState::default())),
        }
    }

    /// Record a keystroke in `conversation`. Must be called within a Tokio
    /// runtime.
    pub fn keystroke(&self, conversation: ConversationId, receiver: UserId) {
        let notice = TypingNotice {
            conversation_id: conversation,
            receiver_id: receiver,
        };
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        match state.active.take() {
            Some(active) if active.notice == notice => active.timer.abort(),
            Some(active) => {
                active.timer.abort();
                self.emit(ClientEvent::TypingStop(active.notice));
                self.emit(ClientEvent::TypingStart(notice.clone()));
            }
            None => self.emit(ClientEvent::TypingStart(notice.clone())),
        }

        state.generation += 1;
        let generation = state.generation;
        let timer = self.spawn_timer(notice.clone(), generation);
        state.active = Some(Active {
            notice,
            generation,
            timer,
        });
    }

    /// Emit `typing:stop` now if typing is active.
    pub fn stop(&self) {
        let active = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .active
            .take();
        if let Some(active) = active {
            active.timer.abort();
            self.emit(ClientEvent::TypingStop(active.notice));
        }
    }

    pub fn is_active(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .active
            .is_some()
    }

    fn spawn_timer(&self, notice: TypingNotice, generation: u64) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);
        let transport = self.transport.clone();
        let idle = self.idle;
        tokio::spawn(async move {
            tokio::time::sleep(idle).await;
            let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
            // A newer keystroke re-armed the timer.
            if state.active.as_ref().map(|a| a.generation) != Some(generation) {
                return;
            }
            state.active = None;
            drop(state);
            if let Err(e) = transport.try_emit(ClientEvent::TypingStop(notice)) {
                tracing::warn!(error = %e, "typing stop not sent");
            }
        })
    }

    fn emit(&self, event: ClientEvent) {
        let name = event.name();
        if let Err(e) = self.transport.try_emit(event) {
            tracing::warn!(event = name, error = %e, "typing notice not sent");
        }
    }
}

impl Drop for TypingNotifier {
    fn drop(&mut self) {
        self.stop();
    }
}
