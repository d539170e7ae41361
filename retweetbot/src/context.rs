use std::sync::Arc;

use crate::actions::BotActions;
use crate::clock::Clock;
use crate::config::BotConfig;
use crate::dedup::DedupFilter;
use crate::gate::RateLimitGate;
use crate::keys::KeySpace;
use crate::registration::{RegistrationService, RegistrationStore};
use crate::store::KvStore;
use crate::twitter::TwitterApi;

/// Everything the bot's components share, built once at startup.
///
/// Cheap to clone; components take what they need from it.
#[derive(Clone)]
pub struct BotContext {
    pub config: Arc<BotConfig>,
    pub store: Arc<dyn KvStore>,
    pub twitter: Arc<dyn TwitterApi>,
    pub registrations: Arc<dyn RegistrationStore>,
    pub clock: Arc<dyn Clock>,
}

impl BotContext {
    pub fn new(
        config: BotConfig,
        store: Arc<dyn KvStore>,
        twitter: Arc<dyn TwitterApi>,
        registrations: Arc<dyn RegistrationStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            twitter,
            registrations,
            clock,
        }
    }

    pub fn keys(&self) -> KeySpace {
        self.config.keys()
    }

    pub fn gate(&self) -> RateLimitGate {
        RateLimitGate::new(
            self.store.clone(),
            self.clock.clone(),
            self.keys(),
            self.config.cooldown,
        )
    }

    pub fn dedup(&self) -> DedupFilter {
        DedupFilter::new(self.store.clone(), self.clock.clone(), self.keys())
    }

    pub fn actions(&self) -> BotActions {
        BotActions::new(self.twitter.clone(), self.gate())
    }

    pub fn registration_service(&self) -> RegistrationService {
        RegistrationService::new(self.registrations.clone(), self.actions(), self.clock.clone())
    }
}
