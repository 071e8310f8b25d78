// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Memoized single-use async initializer.
//!
//! A [`ReadyGate`] runs its initialization routine at most once at a time and
//! caches the successful result. Callers that arrive while initialization is
//! pending are queued and released in registration order once it finishes.
//!
//! # State Machine
//!
//! ```text
//! ┌───────────────┐  get_or_init   ┌─────────┐   init Ok   ┌───────┐
//! │ Uninitialized │ ─────────────► │ Pending │ ──────────► │ Ready │
//! └───────────────┘                └─────────┘             └───────┘
//!         ▲                             │                      │
//!         └──────── init Err ───────────┘                      │
//!                                                              │
//!   disable() from any state                                   ▼
//!   ─────────────────────────────────────────────────────► ┌──────────┐
//!                                                          │ Disabled │
//!                                                          └──────────┘
//! ```
//!
//! `Disabled` is terminal. Its waiter queue is never drained, so every call
//! made after [`ReadyGate::disable()`] stays pending forever.

use crate::error::{ClientError, Result};
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::oneshot;
use tracing::debug;

type Waiter<T> = oneshot::Sender<Result<T>>;

enum GateState<T> {
    Uninitialized,
    Pending(Vec<Waiter<T>>),
    Ready(T),
    Disabled(Vec<Waiter<T>>),
}

/// Single-use, memoized async initializer with a terminal disabled state.
pub struct ReadyGate<T> {
    state: Mutex<GateState<T>>,
}

impl<T> Default for ReadyGate<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ReadyGate<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GateState::Uninitialized),
        }
    }

    fn lock(&self) -> MutexGuard<'_, GateState<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Check whether initialization completed successfully.
    pub fn is_ready(&self) -> bool {
        matches!(*self.lock(), GateState::Ready(_))
    }

    /// Check whether the gate was permanently disabled.
    pub fn is_disabled(&self) -> bool {
        matches!(*self.lock(), GateState::Disabled(_))
    }

    /// Number of callers currently parked on the gate.
    pub fn waiting(&self) -> usize {
        match &*self.lock() {
            GateState::Pending(waiters) | GateState::Disabled(waiters) => waiters.len(),
            _ => 0,
        }
    }

    /// Permanently disable the gate.
    ///
    /// Queued waiters move into the disabled queue and are never released.
    /// Any cached value is dropped.
    pub fn disable(&self) {
        let mut state = self.lock();
        let previous = std::mem::replace(&mut *state, GateState::Disabled(Vec::new()));
        if let GateState::Pending(waiters) = previous {
            *state = GateState::Disabled(waiters);
        }
        debug!("Ready gate disabled");
    }
}

enum Entry<T> {
    Done(T),
    Wait(oneshot::Receiver<Result<T>>),
    Run,
}

impl<T: Clone + Send> ReadyGate<T> {
    /// Resolve the gate, running `init` if no caller has started it yet.
    ///
    /// `init` is only invoked by the caller that moves the gate out of
    /// `Uninitialized`. Everyone else awaits that caller's result.
    pub async fn get_or_init<F, Fut>(&self, init: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let entry = {
            let mut state = self.lock();
            match &mut *state {
                GateState::Ready(value) => Entry::Done(value.clone()),
                GateState::Pending(waiters) | GateState::Disabled(waiters) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    Entry::Wait(rx)
                }
                GateState::Uninitialized => {
                    *state = GateState::Pending(Vec::new());
                    Entry::Run
                }
            }
        };

        match entry {
            Entry::Done(value) => Ok(value),
            Entry::Wait(rx) => match rx.await {
                Ok(result) => result,
                // Sender dropped without a result only happens for a disabled queue
                Err(_) => std::future::pending().await,
            },
            Entry::Run => {
                let guard = InitGuard { gate: self, armed: true };
                let result = init().await;
                guard.complete(result).await
            }
        }
    }
}

/// Resets the gate if the initializing future is dropped mid-flight.
struct InitGuard<'a, T: Clone + Send> {
    gate: &'a ReadyGate<T>,
    armed: bool,
}

impl<'a, T: Clone + Send> InitGuard<'a, T> {
    async fn complete(mut self, result: Result<T>) -> Result<T> {
        self.armed = false;

        let waiters = {
            let mut state = self.gate.lock();
            match &*state {
                GateState::Disabled(_) => None,
                _ => {
                    let next = match &result {
                        Ok(value) => GateState::Ready(value.clone()),
                        Err(_) => GateState::Uninitialized,
                    };
                    match std::mem::replace(&mut *state, next) {
                        GateState::Pending(waiters) => Some(waiters),
                        _ => Some(Vec::new()),
                    }
                }
            }
        };

        let Some(waiters) = waiters else {
            // Disabled while initializing: the initializer hangs like everyone else
            return std::future::pending().await;
        };

        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
        result
    }
}

impl<'a, T: Clone + Send> Drop for InitGuard<'a, T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.gate.lock();
        if let GateState::Pending(_) = &*state {
            if let GateState::Pending(waiters) =
                std::mem::replace(&mut *state, GateState::Uninitialized)
            {
                for waiter in waiters {
                    let _ = waiter.send(Err(ClientError::Internal(
                        "ready gate initialization cancelled".to_string(),
                    )));
                }
            }
        }
    }
}
