//! Shared test helpers for the integration tests.

use std::sync::Arc;
use std::time::Duration;

use spigot_core::testing::{FakeWallet, ManualClock, testnet_address};
use spigot_core::{
    Amount, BalanceTracker, Bech32mValidator, ClientIdentity, PayoutCoordinator, PayoutPolicy,
    PayoutRequest,
};
use tokio::task::JoinHandle;

/// A coordinator wired to an in-memory wallet and a manual clock, with the
/// balance refresher running.
pub struct Harness {
    pub coordinator: Arc<PayoutCoordinator>,
    pub wallet: Arc<FakeWallet>,
    pub clock: Arc<ManualClock>,
    refresher: JoinHandle<()>,
}

impl Harness {
    pub async fn start(balance_units: u64, policy: PayoutPolicy) -> Self {
        let wallet = Arc::new(FakeWallet::new(Amount::from_units(balance_units)));
        let clock = Arc::new(ManualClock::default());
        let balance = Arc::new(
            BalanceTracker::initialize(wallet.clone(), clock.clone(), "default")
                .await
                .expect("fake wallet balance"),
        );
        let refresher = balance.clone().spawn_refresher(Duration::from_secs(3600));
        let coordinator = PayoutCoordinator::new(
            policy,
            wallet.clone(),
            Arc::new(Bech32mValidator),
            clock.clone(),
            balance,
        );
        Self {
            coordinator: Arc::new(coordinator),
            wallet,
            clock,
            refresher,
        }
    }

    /// Wait until the cached balance equals `units`.
    pub async fn wait_for_balance(&self, units: u64) {
        let target = Amount::from_units(units);
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.coordinator.balance().snapshot().spendable != target {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("balance refresh");
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.refresher.abort();
    }
}

/// Testnet policy with a one-day cooldown.
pub fn policy(default_units: u64) -> PayoutPolicy {
    PayoutPolicy::new(
        Amount::from_units(default_units),
        Duration::from_secs(86_400),
        spigot_core::Network::Testnet,
    )
}

/// Request from `identity` to the testnet address derived from `seed`.
pub fn request(identity: &str, seed: u8) -> PayoutRequest {
    PayoutRequest::new(ClientIdentity::new(identity), testnet_address(seed))
}
