//! Environment abstraction for deterministic testing.
//!
//! Decouples relay logic from system resources (wall clock, randomness) so
//! unit tests can pin both to fixed values while production uses the real
//! thing via [`crate::SystemEnv`].

/// Abstract environment providing time and randomness.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `random_bytes()` uses cryptographically secure entropy in production
/// - `wall_clock_secs()` never goes backwards within one execution context
pub trait Environment: Clone + Send + Sync + 'static {
    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Current wall-clock time as seconds since the Unix epoch.
    ///
    /// Stamped onto stored positions and directory records.
    fn wall_clock_secs(&self) -> u64;

    /// Generates a random `u64`.
    ///
    /// Convenience for session and driver identifiers.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Generates `n` random bytes rendered as lowercase hex (2n characters).
    ///
    /// Used for issued temporary passwords.
    fn random_hex(&self, n: usize) -> String {
        let mut bytes = vec![0u8; n];
        self.random_bytes(&mut bytes);
        hex::encode(bytes)
    }
}
