use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, OnceLock};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

/// Process-wide registry of per-provider booking locks, lazily populated on
/// first use. Holding a provider's lock serializes the overlap check and the
/// following insert for that provider, so two writers cannot both see a free
/// slot and both commit.
static PROVIDER_SLOTS: OnceLock<StdMutex<HashMap<Uuid, Arc<Mutex<()>>>>> = OnceLock::new();

pub struct ProviderSlotLocks;

impl ProviderSlotLocks {
    /// Acquire the booking lock for one provider. The returned guard owns the
    /// lock and releases it on drop, including early returns on error paths.
    pub async fn acquire(provider_id: Uuid) -> OwnedMutexGuard<()> {
        let slot = {
            let registry = PROVIDER_SLOTS.get_or_init(|| StdMutex::new(HashMap::new()));
            let mut map = registry.lock().unwrap_or_else(|e| e.into_inner());
            map.entry(provider_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        debug!("Waiting for slot lock on provider {}", provider_id);
        slot.lock_owned().await
    }
}
