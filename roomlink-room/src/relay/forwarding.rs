use crate::config::RelayConfig;
use crate::error::{Error, Result};
use backon::{BackoffBuilder, ConstantBuilder};
use parking_lot::Mutex;
use roomlink_channel::{
    Channel, ChannelEvent, ForwardingConfigure, ForwardingDescriptor, ForwardingId,
    PublicationId, PublicationInfo,
};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error};

/// Bookkeeping state of a forwarding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardingState {
    Active,
    /// Removed from the agent before the engine confirmed the stop.
    /// Never reverted, whatever the engine answers.
    Detached,
}

/// Binding between an origin publication and the relay publication an
/// agent created for it
#[derive(Debug)]
pub struct Forwarding {
    id: ForwardingId,
    configure: ForwardingConfigure,
    origin_publication: PublicationInfo,
    relaying_publication: PublicationInfo,
    state: Mutex<ForwardingState>,
}

impl Forwarding {
    /// Build a forwarding once its relaying publication is visible
    ///
    /// `events` must be subscribed before the start-forwarding call was
    /// issued, so a publish notification for the relay cannot be missed.
    pub(crate) async fn resolve(
        channel: &dyn Channel,
        events: broadcast::Receiver<ChannelEvent>,
        origin_publication: PublicationInfo,
        descriptor: ForwardingDescriptor,
        settings: &RelayConfig,
    ) -> Result<Self> {
        let relaying_publication = resolve_relaying_publication(
            channel,
            events,
            &descriptor.relaying_publication_id,
            settings,
        )
        .await?;

        Ok(Self {
            id: descriptor.id,
            configure: descriptor.configure,
            origin_publication,
            relaying_publication,
            state: Mutex::new(ForwardingState::Active),
        })
    }

    #[must_use]
    pub const fn id(&self) -> &ForwardingId {
        &self.id
    }

    #[must_use]
    pub const fn configure(&self) -> ForwardingConfigure {
        self.configure
    }

    #[must_use]
    pub const fn origin_publication(&self) -> &PublicationInfo {
        &self.origin_publication
    }

    #[must_use]
    pub const fn relaying_publication(&self) -> &PublicationInfo {
        &self.relaying_publication
    }

    #[must_use]
    pub fn state(&self) -> ForwardingState {
        *self.state.lock()
    }

    pub(crate) fn detach(&self) {
        *self.state.lock() = ForwardingState::Detached;
    }
}

impl PartialEq for Forwarding {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Forwarding {}

/// Look the relaying publication up until it shows, within the retry budget
///
/// Between lookups the wait ends early when the channel announces the relay.
async fn resolve_relaying_publication(
    channel: &dyn Channel,
    mut events: broadcast::Receiver<ChannelEvent>,
    relaying_publication_id: &PublicationId,
    settings: &RelayConfig,
) -> Result<PublicationInfo> {
    let attempts = settings.resolve_attempts.max(1) as usize;
    let backoff = ConstantBuilder::default()
        .with_delay(settings.resolve_interval())
        .with_max_times(attempts - 1)
        .build();

    for (attempt, delay) in std::iter::once(Duration::ZERO).chain(backoff).enumerate() {
        if delay > Duration::ZERO {
            wait_for_relay(&mut events, relaying_publication_id, delay).await;
        }
        if let Some(publication) = channel.publication(relaying_publication_id) {
            debug!(
                relaying_publication_id = %relaying_publication_id,
                attempt = attempt + 1,
                "Relaying publication resolved"
            );
            return Ok(publication);
        }
    }

    error!(
        relaying_publication_id = %relaying_publication_id,
        attempts,
        "Relaying publication never became visible"
    );
    Err(Error::RelayProtocol {
        relaying_publication_id: relaying_publication_id.clone(),
        attempts,
    })
}

/// Sleep for `delay`, returning early if the relay is announced
async fn wait_for_relay(
    events: &mut broadcast::Receiver<ChannelEvent>,
    relaying_publication_id: &PublicationId,
    delay: Duration,
) {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            () = &mut sleep => return,
            received = events.recv() => match received {
                Ok(ChannelEvent::StreamPublished(publication))
                    if &publication.id == relaying_publication_id => return,
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => {
                    sleep.as_mut().await;
                    return;
                }
            },
        }
    }
}
