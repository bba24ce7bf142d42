//! Health-aware provider selection with a short-lived cached decision.
//!
//! Every payment attempt asks the selector for a provider. The decision is
//! cached for five seconds so bursts of payments do not turn into bursts of
//! health probes; within the TTL the cached choice is returned verbatim.

use crate::entities::ProviderName;
use crate::providers::{ProviderClient, ProviderError, ProviderHealth};
use crate::store::{Store, StoreError};
use async_trait::async_trait;
use redis::AsyncCommands;
use std::sync::Arc;
use tracing::{debug, warn};

/// String key caching the most recent provider choice.
const PROVIDER_CHOICE_KEY: &str = "provider";
/// Lifetime of a cached choice, bounding both probe traffic and staleness.
const CHOICE_TTL_SECS: u64 = 5;

/// Short-lived memo of the last provider decision.
#[async_trait]
pub trait ChoiceCache: Send + Sync {
    /// The cached choice, if present and unexpired.
    async fn current(&self) -> Result<Option<ProviderName>, StoreError>;

    /// Overwrite the cached choice, restarting its TTL.
    async fn remember(&self, choice: ProviderName) -> Result<(), StoreError>;
}

/// TTL'd string key implementation of [`ChoiceCache`].
#[derive(Clone)]
pub struct StoreChoiceCache {
    store: Store,
    key: String,
}

impl StoreChoiceCache {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            key: PROVIDER_CHOICE_KEY.to_string(),
        }
    }
}

#[async_trait]
impl ChoiceCache for StoreChoiceCache {
    async fn current(&self) -> Result<Option<ProviderName>, StoreError> {
        let mut conn = self.store.conn().await?;
        let cached: Option<String> = conn.get(&self.key).await?;
        match cached {
            Some(raw) => match raw.parse::<ProviderName>() {
                Ok(name) => Ok(Some(name)),
                Err(_) => {
                    warn!(value = %raw, "ignoring unrecognized cached provider choice");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn remember(&self, choice: ProviderName) -> Result<(), StoreError> {
        let mut conn = self.store.conn().await?;
        let _: () = conn
            .set_ex(&self.key, choice.as_str(), CHOICE_TTL_SECS)
            .await?;
        Ok(())
    }
}

/// Chooses between the primary and fallback processors.
pub struct ProviderSelector {
    default: Arc<dyn ProviderClient>,
    fallback: Arc<dyn ProviderClient>,
    cache: Arc<dyn ChoiceCache>,
}

impl ProviderSelector {
    pub fn new(
        default: Arc<dyn ProviderClient>,
        fallback: Arc<dyn ProviderClient>,
        cache: Arc<dyn ChoiceCache>,
    ) -> Self {
        Self {
            default,
            fallback,
            cache,
        }
    }

    /// Pick a provider for one payment attempt.
    ///
    /// An unexpired cached choice wins outright. Otherwise both providers
    /// are polled, the decision ladder runs, and the result is cached for
    /// the next five seconds.
    pub async fn pick(&self) -> Arc<dyn ProviderClient> {
        match self.cache.current().await {
            Ok(Some(name)) => {
                debug!(provider = %name, "using cached provider choice");
                return self.by_name(name);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "provider choice cache read failed"),
        }

        let (default_health, fallback_health) =
            tokio::join!(self.default.health(), self.fallback.health());
        if let Err(e) = &default_health {
            warn!(provider = %ProviderName::Default, error = %e, "provider health poll failed");
        }
        if let Err(e) = &fallback_health {
            warn!(provider = %ProviderName::Fallback, error = %e, "provider health poll failed");
        }

        let choice = choose(&default_health, &fallback_health);
        if let Err(e) = self.cache.remember(choice).await {
            warn!(error = %e, "failed to cache provider choice");
        }
        self.by_name(choice)
    }

    fn by_name(&self, name: ProviderName) -> Arc<dyn ProviderClient> {
        match name {
            ProviderName::Default => Arc::clone(&self.default),
            ProviderName::Fallback => Arc::clone(&self.fallback),
        }
    }
}

/// The decision ladder. Biased toward the primary: the fallback wins only
/// when the primary's poll failed, when only the primary reports failing, or
/// when both report failing and the fallback is more than roughly 11%
/// faster.
fn choose(
    default_health: &Result<ProviderHealth, ProviderError>,
    fallback_health: &Result<ProviderHealth, ProviderError>,
) -> ProviderName {
    match (default_health, fallback_health) {
        (Err(_), _) => ProviderName::Fallback,
        (Ok(_), Err(_)) => ProviderName::Default,
        (Ok(df), Ok(fb)) => {
            if df.failing && !fb.failing {
                ProviderName::Fallback
            } else if df.failing
                && fb.failing
                && fb.min_response_time * 10 < df.min_response_time * 9
            {
                ProviderName::Fallback
            } else {
                ProviderName::Default
            }
        }
    }
}
