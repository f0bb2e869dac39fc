//! Change events and cascade confirmation seams
//!
//! State changes are reported as values through registered callbacks; the
//! engine never talks to a UI directly. Cascade confirmation is a trait so
//! an interactive frontend, a policy, or a test double can all answer it.

use std::sync::Arc;

use async_trait::async_trait;

use crate::item::ItemId;

/// Notification emitted after the store changed
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// Items whose fields changed in place (enabled state, edge counts)
    ItemsChanged(Vec<ItemId>),
    /// Items removed from the collection
    ItemsRemoved(Vec<ItemId>),
}

/// What a cascade would additionally change, shown before asking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeSummary {
    /// Items the cascade would additionally enable
    pub to_enable: Vec<ItemId>,
    /// Items the cascade would additionally disable
    pub to_disable: Vec<ItemId>,
}

impl CascadeSummary {
    pub fn is_empty(&self) -> bool {
        self.to_enable.is_empty() && self.to_disable.is_empty()
    }
}

/// Answer to a cascade confirmation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeDecision {
    /// Apply the requested change and the whole cascade
    ApplyCascade,
    /// Apply the requested change to the selected items only
    DirectOnly,
    /// Apply nothing
    Cancel,
}

/// Asked once per state change whose cascade is non-empty
#[async_trait]
pub trait CascadeConfirmer: Send + Sync {
    async fn confirm(&self, summary: &CascadeSummary) -> CascadeDecision;
}

/// Confirmer that always answers a fixed decision; the non-interactive
/// default, wired to the configured answer
pub struct PolicyConfirmer {
    decision: CascadeDecision,
}

impl PolicyConfirmer {
    pub fn new(decision: CascadeDecision) -> Self {
        Self { decision }
    }
}

#[async_trait]
impl CascadeConfirmer for PolicyConfirmer {
    async fn confirm(&self, _summary: &CascadeSummary) -> CascadeDecision {
        self.decision
    }
}

/// Subscriber invoked synchronously after each change
pub type ChangeCallback = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;
