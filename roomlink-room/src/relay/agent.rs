use super::forwarding::Forwarding;
use crate::config::RelayConfig;
use crate::error::Result;
use parking_lot::Mutex;
use roomlink_channel::{Channel, MemberId, PublicationId, PublicationInfo, RelayBot};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Server-side member that relays publications of a relayed room
///
/// Owns the live set of forwardings it started. The set is the only
/// mutable state shared between concurrent publish and unpublish calls.
pub struct RelayAgent {
    bot: Arc<dyn RelayBot>,
    channel: Arc<dyn Channel>,
    settings: RelayConfig,
    forwardings: Mutex<Vec<Arc<Forwarding>>>,
}

impl RelayAgent {
    pub(crate) fn new(
        bot: Arc<dyn RelayBot>,
        channel: Arc<dyn Channel>,
        settings: RelayConfig,
    ) -> Self {
        Self {
            bot,
            channel,
            settings,
            forwardings: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn id(&self) -> MemberId {
        self.bot.id()
    }

    #[must_use]
    pub fn subtype(&self) -> String {
        self.bot.subtype()
    }

    /// Snapshot of the live forwardings
    #[must_use]
    pub fn forwardings(&self) -> Vec<Arc<Forwarding>> {
        self.forwardings.lock().clone()
    }

    #[must_use]
    pub fn forwarding_for_relay(&self, relaying_publication_id: &PublicationId) -> Option<Arc<Forwarding>> {
        self.forwardings
            .lock()
            .iter()
            .find(|f| &f.relaying_publication().id == relaying_publication_id)
            .cloned()
    }

    #[must_use]
    pub fn forwarding_for_origin(&self, origin_publication_id: &PublicationId) -> Option<Arc<Forwarding>> {
        self.forwardings
            .lock()
            .iter()
            .find(|f| &f.origin_publication().id == origin_publication_id)
            .cloned()
    }

    /// Start relaying `origin`
    ///
    /// Engine failures come back as `Error::Channel`. If the engine names a
    /// relaying publication that never becomes visible within the retry
    /// budget the result is `Error::RelayProtocol` and nothing is recorded.
    pub async fn start_forwarding(
        &self,
        origin: &PublicationInfo,
        max_subscribers: Option<u32>,
    ) -> Result<Arc<Forwarding>> {
        let max_subscribers = self.settings.max_subscribers(max_subscribers);

        let events = self.channel.events();
        let descriptor = self
            .bot
            .start_forwarding(&origin.id, Some(max_subscribers))
            .await?;

        let forwarding = Arc::new(
            Forwarding::resolve(
                self.channel.as_ref(),
                events,
                origin.clone(),
                descriptor,
                &self.settings,
            )
            .await?,
        );
        self.forwardings.lock().push(Arc::clone(&forwarding));

        info!(
            bot_id = %self.bot.id(),
            forwarding_id = %forwarding.id(),
            origin_publication_id = %origin.id,
            relaying_publication_id = %forwarding.relaying_publication().id,
            max_subscribers,
            "Forwarding started"
        );
        Ok(forwarding)
    }

    /// Stop a forwarding
    ///
    /// The record leaves the live set before the engine is asked to stop
    /// and is not restored if the engine refuses. Returns false when the
    /// forwarding was already stopped or the engine call failed.
    pub async fn stop_forwarding(&self, forwarding: &Forwarding) -> bool {
        let Some(detached) = self.detach(forwarding) else {
            debug!(forwarding_id = %forwarding.id(), "Forwarding already stopped");
            return false;
        };

        match self.bot.stop_forwarding(detached.id()).await {
            Ok(()) => {
                info!(bot_id = %self.bot.id(), forwarding_id = %detached.id(), "Forwarding stopped");
                true
            }
            Err(err) => {
                warn!(
                    bot_id = %self.bot.id(),
                    forwarding_id = %detached.id(),
                    error = %err,
                    "Stop forwarding failed, record stays removed"
                );
                false
            }
        }
    }

    fn detach(&self, forwarding: &Forwarding) -> Option<Arc<Forwarding>> {
        let mut forwardings = self.forwardings.lock();
        let index = forwardings.iter().position(|f| f.id() == forwarding.id())?;
        let detached = forwardings.remove(index);
        detached.detach();
        Some(detached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::relay::ForwardingState;
    use roomlink_channel::memory::{MemoryEngine, RelayVisibility};
    use roomlink_channel::{
        ChannelError, ChannelProvider, LocalStream, MemberInit, PublicationOptions,
    };
    use std::time::Duration;

    struct Fixture {
        engine: Arc<MemoryEngine>,
        channel: Arc<dyn Channel>,
        agent: RelayAgent,
        origin: PublicationInfo,
    }

    async fn fixture() -> Fixture {
        let engine = MemoryEngine::new();
        let channel = engine.provider().create(None, None).await.unwrap();
        let alice = channel.join(MemberInit::default()).await.unwrap();
        let bot = channel.create_bot("sfu").await.unwrap();
        let origin = alice
            .publish(LocalStream::video(), PublicationOptions::default())
            .await
            .unwrap();
        let agent = RelayAgent::new(bot, Arc::clone(&channel), RelayConfig::default());
        Fixture {
            engine,
            channel,
            agent,
            origin,
        }
    }

    #[tokio::test]
    async fn test_start_forwarding_resolves_relay() {
        let f = fixture().await;
        let forwarding = f.agent.start_forwarding(&f.origin, None).await.unwrap();

        assert_eq!(forwarding.origin_publication().id, f.origin.id);
        assert_eq!(
            forwarding.relaying_publication().origin.as_ref(),
            Some(&f.origin.id)
        );
        assert_eq!(forwarding.configure().max_subscribers, 10);
        assert_eq!(forwarding.state(), ForwardingState::Active);
        assert!(f
            .channel
            .publication(&forwarding.relaying_publication().id)
            .is_some());
        assert_eq!(f.agent.forwardings().len(), 1);
        assert!(f.agent.forwarding_for_origin(&f.origin.id).is_some());
    }

    #[tokio::test]
    async fn test_max_subscribers_clamped_to_limit() {
        let f = fixture().await;
        let forwarding = f.agent.start_forwarding(&f.origin, Some(1000)).await.unwrap();
        assert_eq!(forwarding.configure().max_subscribers, 99);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_relay_resolved_within_budget() {
        let f = fixture().await;
        f.engine
            .set_relay_visibility(RelayVisibility::Delayed(Duration::from_millis(450)));

        let started = tokio::time::Instant::now();
        let forwarding = f.agent.start_forwarding(&f.origin, None).await.unwrap();
        let elapsed = started.elapsed();

        assert!(f
            .channel
            .publication(&forwarding.relaying_publication().id)
            .is_some());
        // the publish notification ends the wait before the next poll tick
        assert!(elapsed >= Duration::from_millis(450));
        assert!(elapsed < Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_relay_never_visible_is_protocol_violation() {
        let f = fixture().await;
        f.engine.set_relay_visibility(RelayVisibility::Never);

        let started = tokio::time::Instant::now();
        let err = f.agent.start_forwarding(&f.origin, None).await.err().unwrap();

        assert!(matches!(err, Error::RelayProtocol { attempts: 10, .. }));
        assert!(started.elapsed() <= Duration::from_secs(1));
        assert!(f.agent.forwardings().is_empty());
    }

    #[tokio::test]
    async fn test_native_start_failure() {
        let f = fixture().await;
        f.engine.set_fail_start_forwarding(true);
        let err = f.agent.start_forwarding(&f.origin, None).await.err().unwrap();
        assert!(matches!(err, Error::Channel(ChannelError::Native(_))));
        assert!(f.agent.forwardings().is_empty());
    }

    #[tokio::test]
    async fn test_stop_twice() {
        let f = fixture().await;
        let forwarding = f.agent.start_forwarding(&f.origin, None).await.unwrap();

        assert!(f.agent.stop_forwarding(&forwarding).await);
        assert!(f.agent.forwardings().is_empty());
        assert_eq!(forwarding.state(), ForwardingState::Detached);
        assert!(f
            .channel
            .publication(&forwarding.relaying_publication().id)
            .is_none());

        assert!(!f.agent.stop_forwarding(&forwarding).await);
    }

    #[tokio::test]
    async fn test_stop_removes_record_even_when_native_fails() {
        let f = fixture().await;
        let forwarding = f.agent.start_forwarding(&f.origin, None).await.unwrap();
        f.engine.set_fail_stop_forwarding(true);

        assert!(!f.agent.stop_forwarding(&forwarding).await);
        assert!(f.agent.forwardings().is_empty());
        assert_eq!(forwarding.state(), ForwardingState::Detached);
        // the relay is still live on the engine side
        assert!(f
            .channel
            .publication(&forwarding.relaying_publication().id)
            .is_some());
    }
}
