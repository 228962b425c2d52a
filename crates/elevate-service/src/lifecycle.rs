//! Service Lifecycle: state machine for the privileged service process
//!
//! A file service is created by the broker when the bridge binds it, starts
//! serving once the connection is handed to the bridge, and ends when the
//! bridge sends the one-way destroy signal.
//!
//! # Lifecycle States
//!
//! ```text
//!                    ┌─────────────┐
//!        spawn  ──>  │  Starting   │
//!                    └──────┬──────┘
//!                           │ on_serving()
//!                    ┌──────▼──────┐
//!                    │   Serving   │ ← Answering calls from the bridge
//!                    └──────┬──────┘
//!                           │ on_destroyed()
//!                    ┌──────▼──────┐
//!                    │  Destroyed  │ ← Process exits, calls refused
//!                    └─────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use elevate_service::lifecycle::{LifecycleState, ServiceLifecycle};
//!
//! let mut lifecycle = ServiceLifecycle::new("com.example.dronestuff:file_service");
//! assert_eq!(lifecycle.state(), LifecycleState::Starting);
//!
//! lifecycle.on_serving();
//! assert!(lifecycle.accepts_calls());
//!
//! lifecycle.on_destroyed();
//! assert!(!lifecycle.accepts_calls());
//! ```

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant, SystemTime};

/// Lifecycle states for a hosted file service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Process spawned, connection not yet handed out
    Starting,

    /// Connected to the bridge and answering calls
    Serving,

    /// Destroy signal received; the hosting process is exiting
    Destroyed,
}

impl LifecycleState {
    pub fn as_str(&self) -> &str {
        match self {
            LifecycleState::Starting => "starting",
            LifecycleState::Serving => "serving",
            LifecycleState::Destroyed => "destroyed",
        }
    }
}

/// Transition record
#[derive(Debug, Clone)]
pub struct LifecycleEvent {
    /// Process name of the service
    pub service_id: String,

    pub from: LifecycleState,

    pub to: LifecycleState,

    /// Time spent in `from`
    pub elapsed: Duration,

    pub timestamp: SystemTime,
}

/// Lifecycle state machine for one service instance
#[derive(Debug)]
pub struct ServiceLifecycle {
    service_id: String,

    state: LifecycleState,

    /// When the current state was entered
    state_entered_at: Instant,

    /// Calls answered while alive
    calls_served: u64,
}

impl ServiceLifecycle {
    /// Create a lifecycle in the Starting state
    pub fn new(service_id: &str) -> Self {
        Self {
            service_id: service_id.to_string(),
            state: LifecycleState::Starting,
            state_entered_at: Instant::now(),
            calls_served: 0,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    /// Everything short of Destroyed answers calls
    pub fn accepts_calls(&self) -> bool {
        self.state != LifecycleState::Destroyed
    }

    pub fn calls_served(&self) -> u64 {
        self.calls_served
    }

    pub fn call_served(&mut self) {
        self.calls_served += 1;
    }

    /// Transition: Starting → Serving
    pub fn on_serving(&mut self) -> Option<LifecycleEvent> {
        if self.state != LifecycleState::Starting {
            return None;
        }
        self.transition(LifecycleState::Serving)
    }

    /// Transition: Starting/Serving → Destroyed
    pub fn on_destroyed(&mut self) -> Option<LifecycleEvent> {
        if self.state == LifecycleState::Destroyed {
            return None;
        }
        self.transition(LifecycleState::Destroyed)
    }

    fn transition(&mut self, new_state: LifecycleState) -> Option<LifecycleEvent> {
        let event = LifecycleEvent {
            service_id: self.service_id.clone(),
            from: self.state,
            to: new_state,
            elapsed: self.state_entered_at.elapsed(),
            timestamp: SystemTime::now(),
        };

        self.state = new_state;
        self.state_entered_at = Instant::now();

        Some(event)
    }
}
