//! Chaotic storage wrapper for fault injection testing
//!
//! Storage wrapper that randomly fails operations to test error handling.
//! Used to verify the relay degrades to error replies instead of crashing
//! or broadcasting unwritten positions.

#![allow(clippy::disallowed_types, reason = "Locking simple RNG state")]

use std::sync::{Arc, Mutex};

use waypost_proto::payloads::{directory::DriverRecord, location::DriverPosition};

use super::{Storage, StorageError, StoredClient, StoredDriver};

/// Chaotic storage wrapper that randomly injects failures
///
/// Delegates to an underlying storage implementation but randomly fails
/// operations based on a configured failure rate. Uses Arc<Mutex<>> for the
/// RNG state, making it Clone and thread-safe.
#[derive(Clone)]
pub struct ChaoticStorage<S: Storage> {
    inner: S,
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    /// RNG state for deterministic chaos
    rng: Arc<Mutex<ChaoticRng>>,
}

/// Simple deterministic RNG for chaos injection
///
/// Uses linear congruential generator (LCG) for fast, deterministic
/// randomness. This ensures chaos tests are reproducible with the same seed.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Generate next random value [0.0, 1.0)
    fn next(&mut self) -> f64 {
        // LCG constants from Numerical Recipes
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }

    /// Check if we should fail (returns true with probability = `failure_rate`)
    fn should_fail(&mut self, failure_rate: f64) -> bool {
        self.next() < failure_rate
    }
}

impl<S: Storage> ChaoticStorage<S> {
    /// Create a new chaotic storage wrapper
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Create with explicit seed for reproducible chaos
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self { inner, failure_rate, rng: Arc::new(Mutex::new(ChaoticRng::new(seed))) }
    }

    /// Underlying storage (for checking invariants after chaos).
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Check if this operation should fail
    fn should_fail(&self) -> bool {
        #[allow(clippy::expect_used)]
        self.rng.lock().expect("ChaoticRng mutex poisoned").should_fail(self.failure_rate)
    }

    fn injected() -> StorageError {
        StorageError::Io("chaotic failure injection".to_string())
    }
}

impl<S: Storage> Storage for ChaoticStorage<S> {
    fn create_logistic_client(&self, client: &StoredClient) -> Result<(), StorageError> {
        if self.should_fail() {
            return Err(Self::injected());
        }
        self.inner.create_logistic_client(client)
    }

    fn load_logistic_client(&self, client_id: &str) -> Result<Option<StoredClient>, StorageError> {
        if self.should_fail() {
            return Err(Self::injected());
        }
        self.inner.load_logistic_client(client_id)
    }

    fn create_driver(&self, driver: &StoredDriver) -> Result<(), StorageError> {
        if self.should_fail() {
            return Err(Self::injected());
        }
        self.inner.create_driver(driver)
    }

    fn load_driver(&self, driver_id: &str) -> Result<Option<StoredDriver>, StorageError> {
        if self.should_fail() {
            return Err(Self::injected());
        }
        self.inner.load_driver(driver_id)
    }

    fn driver_identity_taken(&self, record: &DriverRecord) -> Result<bool, StorageError> {
        if self.should_fail() {
            return Err(Self::injected());
        }
        self.inner.driver_identity_taken(record)
    }

    fn list_drivers(&self, logistic_client_id: &str) -> Result<Vec<StoredDriver>, StorageError> {
        if self.should_fail() {
            return Err(Self::injected());
        }
        self.inner.list_drivers(logistic_client_id)
    }

    fn upsert_position(
        &self,
        driver_id: &str,
        latitude: f64,
        longitude: f64,
        updated_at_secs: u64,
    ) -> Result<Option<DriverPosition>, StorageError> {
        if self.should_fail() {
            return Err(Self::injected());
        }
        self.inner.upsert_position(driver_id, latitude, longitude, updated_at_secs)
    }

    fn query_positions(&self, driver_id: &str) -> Result<Vec<DriverPosition>, StorageError> {
        if self.should_fail() {
            return Err(Self::injected());
        }
        self.inner.query_positions(driver_id)
    }
}
