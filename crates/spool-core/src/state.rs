//! Per-connection client state.
//!
//! The subscription is the only thing that changes over a connection's life,
//! and it changes once: `Init` becomes `Subscribed` when SUB succeeds, which
//! also starts the delivery loop. [`ClientState::phase`] is derived from the
//! presence of a [`Subscription`], so the phase, the channel handle and the
//! running delivery task cannot disagree.
//!
//! The delivery loop's remaining credit is deliberately absent: it lives in the
//! delivery task and is changed only there. RDY reaches it through the credit
//! sender held here.

use std::{io, sync::Arc};

use tokio::{
    sync::{oneshot, watch},
    task::JoinHandle,
};

use crate::queue::Channel;

/// Protocol phase of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Connected, not yet subscribed
    Init,
    /// Subscribed; a delivery loop is running
    Subscribed,
}

/// Signals handed from the connection loop to the delivery loop at SUB time.
#[derive(Debug)]
pub(crate) struct DeliveryHandoff {
    /// Fires (or closes) when the connection loop terminates
    pub(crate) exit: oneshot::Receiver<()>,
    /// Reports a failed message write back to the connection loop
    pub(crate) fault: oneshot::Sender<io::Error>,
}

/// Live subscription of a connection.
pub(crate) struct Subscription {
    pub(crate) topic: String,
    pub(crate) channel: Arc<dyn Channel>,
    /// Latest credit grant; the delivery loop overwrites its credit with it
    pub(crate) credit: watch::Sender<u32>,
    pub(crate) delivery: JoinHandle<()>,
}

/// State owned by one connection loop.
pub struct ClientState {
    subscription: Option<Subscription>,
    handoff: Option<DeliveryHandoff>,
}

impl ClientState {
    pub(crate) fn new(handoff: DeliveryHandoff) -> Self {
        Self { subscription: None, handoff: Some(handoff) }
    }

    /// Current protocol phase.
    pub fn phase(&self) -> Phase {
        if self.subscription.is_some() { Phase::Subscribed } else { Phase::Init }
    }

    pub(crate) fn subscription(&self) -> Option<&Subscription> {
        self.subscription.as_ref()
    }

    /// Take the delivery signals. Succeeds at most once per connection.
    pub(crate) fn take_handoff(&mut self) -> Option<DeliveryHandoff> {
        self.handoff.take()
    }

    pub(crate) fn set_subscription(&mut self, subscription: Subscription) {
        debug_assert!(self.subscription.is_none(), "subscription is one-way");
        self.subscription = Some(subscription);
    }

    pub(crate) fn subscription_mut(&mut self) -> Option<&mut Subscription> {
        self.subscription.as_mut()
    }
}

impl std::fmt::Debug for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientState").field("phase", &self.phase()).finish_non_exhaustive()
    }
}
