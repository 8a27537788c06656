use chrono::Duration;

use crate::{
    db_types::{OrderId, SuffixLease},
    traits::PaymentGatewayError,
};

/// Storage contract for the suffix lease pool.
///
/// A suffix is a three-digit fractional disambiguator in the configured range (a sub-range of 1..=999). At most one
/// active lease may hold a given suffix at any instant; `acquire` must be atomic against concurrent `acquire` calls.
///
/// A lease that is neither released nor renewed becomes reclaimable once its expiry *plus the pool's grace window*
/// has passed. Until then the suffix stays out of circulation so that a late-arriving transfer can still settle the
/// order it was leased for.
#[allow(async_fn_in_trait)]
pub trait SuffixLeaseStore {
    /// Leases a free suffix to `order_id` for `ttl`.
    ///
    /// Returns [`PaymentGatewayError::SuffixPoolExhausted`] when every suffix in the range is currently leased.
    /// Callers should surface this as a retryable condition, not a failure.
    async fn acquire_suffix(&self, order_id: &OrderId, ttl: Duration) -> Result<u16, PaymentGatewayError>;

    /// Releases the lease held by `order_id`, making the suffix immediately available again.
    /// Releasing an order that holds no lease is a no-op; returns whether a lease was actually removed.
    async fn release_suffix(&self, order_id: &OrderId) -> Result<bool, PaymentGatewayError>;

    /// Pushes the lease expiry forward by `additional_ttl`.
    /// Fails with [`PaymentGatewayError::LeaseNotFound`] if the order holds no lease.
    async fn renew_suffix(&self, order_id: &OrderId, additional_ttl: Duration)
        -> Result<SuffixLease, PaymentGatewayError>;

    /// The lease currently held by `order_id`, if any.
    async fn fetch_lease(&self, order_id: &OrderId) -> Result<Option<SuffixLease>, PaymentGatewayError>;
}
