//! # Render context and hooks
//!
//! A [`RenderContext`] is created for exactly one component render and
//! dropped when the render returns, on every exit path. It resolves
//! `use_state` calls to the rendering unit's pending state slots in call order
//! and carries the transition-pending flag for that render.
//!
//! Dispatchers never touch a tree directly. They publish an [`UpdateRequest`]
//! on the reconciler's update channel, keyed by the originating unit.

use crate::error::{ReconcileError, ReconcileResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;
use tokio::sync::mpsc::UnboundedSender;

/// Write of one state slot
#[derive(Debug, Clone, PartialEq)]
pub struct StatePatch {
    pub slot: usize,
    pub value: Value,
}

/// State patch addressed to a work unit by key
#[derive(Debug, Clone, PartialEq)]
pub struct Effect {
    pub key: String,
    pub patch: StatePatch,
}

/// Identifies a transition by the key of the unit that started it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransitionId(String);

impl TransitionId {
    pub fn new(key: impl Into<String>) -> Self {
        TransitionId(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Message sent up to the reconciler when a component asks for new state
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    pub effect: Effect,
    pub transition: Option<TransitionId>,
}

pub struct RenderContext<'a> {
    key: &'a str,
    states: &'a mut Vec<Value>,
    slot: usize,
    transition_pending: bool,
    updates: &'a UnboundedSender<UpdateRequest>,
}

impl<'a> RenderContext<'a> {
    pub(crate) fn new(
        key: &'a str,
        states: &'a mut Vec<Value>,
        transition_pending: bool,
        updates: &'a UnboundedSender<UpdateRequest>,
    ) -> Self {
        Self {
            key,
            states,
            slot: 0,
            transition_pending,
            updates,
        }
    }

    /// Key of the rendering unit
    pub fn key(&self) -> &str {
        self.key
    }

    pub fn is_transition_pending(&self) -> bool {
        self.transition_pending
    }

    /// Read the next state slot, seeding it with `initial` on first use.
    pub fn use_state<T>(&mut self, initial: T) -> ReconcileResult<(T, Dispatcher<T>)>
    where
        T: Serialize + DeserializeOwned,
    {
        let slot = self.slot;
        self.slot += 1;

        let value = match self.states.get(slot) {
            Some(stored) => serde_json::from_value(stored.clone())?,
            None => {
                self.states.push(serde_json::to_value(&initial)?);
                initial
            }
        };

        let dispatcher = Dispatcher {
            key: self.key.to_string(),
            slot,
            updates: self.updates.clone(),
            _marker: PhantomData,
        };

        Ok((value, dispatcher))
    }

    /// Pending flag plus a handle that tags dispatches as a transition
    pub fn use_transition(&self) -> (bool, StartTransition) {
        let start = StartTransition {
            id: TransitionId::new(self.key),
        };
        (self.transition_pending, start)
    }
}

/// Handle that writes one state slot of one unit
pub struct Dispatcher<T> {
    key: String,
    slot: usize,
    updates: UnboundedSender<UpdateRequest>,
    _marker: PhantomData<fn(T)>,
}

impl<T: Serialize> Dispatcher<T> {
    /// Request an urgent update
    pub fn set(&self, value: T) -> ReconcileResult<()> {
        self.send(value, None)
    }

    /// Request an update tagged with the scope's transition
    pub fn set_in(&self, scope: &TransitionScope, value: T) -> ReconcileResult<()> {
        self.send(value, Some(scope.id.clone()))
    }

    fn send(&self, value: T, transition: Option<TransitionId>) -> ReconcileResult<()> {
        let request = UpdateRequest {
            effect: Effect {
                key: self.key.clone(),
                patch: StatePatch {
                    slot: self.slot,
                    value: serde_json::to_value(value)?,
                },
            },
            transition,
        };

        self.updates
            .send(request)
            .map_err(|_| ReconcileError::ChannelClosed)
    }
}

impl<T> Clone for Dispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            slot: self.slot,
            updates: self.updates.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Dispatcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("key", &self.key)
            .field("slot", &self.slot)
            .finish()
    }
}

/// Starts transition-tagged regions
#[derive(Debug, Clone)]
pub struct StartTransition {
    id: TransitionId,
}

impl StartTransition {
    pub fn id(&self) -> &TransitionId {
        &self.id
    }

    /// Run `f` with a scope; dispatches made through it are transitions.
    pub fn run<R>(&self, f: impl FnOnce(&TransitionScope) -> R) -> R {
        let scope = TransitionScope {
            id: self.id.clone(),
        };
        f(&scope)
    }
}

/// Proof of being inside a transition region
#[derive(Debug)]
pub struct TransitionScope {
    id: TransitionId,
}

impl TransitionScope {
    pub fn id(&self) -> &TransitionId {
        &self.id
    }
}
