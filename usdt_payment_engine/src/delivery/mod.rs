//! Downstream delivery dispatch.
//!
//! After a purchase order is paid, the benefit it bought (a premium membership, an energy rental) is granted by an
//! external collaborator. The engine only knows the closed set of [`OrderType`] variants; each purchase variant has
//! exactly one handler, registered when the registry is built. A registry missing a handler for a purchase variant
//! does not construct — unknown or unhandled types are caught at startup, never at dispatch time.
//!
//! Handlers are async closures in the same shape as the event hooks used elsewhere in the codebase. They receive the
//! full order (including its opaque payload) and report how delivery went. Delivery runs strictly after the payment
//! transaction has committed; a handler can be slow or fail without holding up settlement processing.

use std::{collections::HashMap, fmt::Display, future::Future, pin::Pin, sync::Arc};

use thiserror::Error;

use crate::db_types::{Order, OrderType};

/// The delivery collaborator's verdict for one paid order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    /// The benefit was granted in full.
    Delivered,
    /// Some of the benefit was granted. The order is closed as `PartialDelivery` and flagged for manual follow-up.
    Partial(String),
    /// Nothing was granted. The order stays `Paid` and delivery will be retried later — the money has already
    /// been received and is never silently dropped.
    Failed(String),
}

impl Display for DeliveryResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryResult::Delivered => write!(f, "Delivered"),
            DeliveryResult::Partial(reason) => write!(f, "Partial ({reason})"),
            DeliveryResult::Failed(reason) => write!(f, "Failed ({reason})"),
        }
    }
}

pub type DeliveryHandler =
    Arc<dyn Fn(Order) -> Pin<Box<dyn Future<Output = DeliveryResult> + Send>> + Send + Sync>;

#[derive(Debug, Clone, Error)]
#[error("No delivery handler registered for order type '{0}'")]
pub struct MissingHandlerError(OrderType);

/// One handler per purchase order type. Construct with [`DeliveryRegistry::builder`].
#[derive(Clone, Default)]
pub struct DeliveryRegistry {
    handlers: HashMap<OrderType, DeliveryHandler>,
}

impl DeliveryRegistry {
    pub fn builder() -> DeliveryRegistryBuilder {
        DeliveryRegistryBuilder::default()
    }

    pub fn handler_for(&self, order_type: OrderType) -> Option<&DeliveryHandler> {
        self.handlers.get(&order_type)
    }
}

impl std::fmt::Debug for DeliveryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types = self.handlers.keys().map(|t| t.to_string()).collect::<Vec<_>>();
        types.sort();
        write!(f, "DeliveryRegistry [{}]", types.join(", "))
    }
}

#[derive(Default)]
pub struct DeliveryRegistryBuilder {
    handlers: HashMap<OrderType, DeliveryHandler>,
}

impl DeliveryRegistryBuilder {
    pub fn register<F>(mut self, order_type: OrderType, f: F) -> Self
    where F: (Fn(Order) -> Pin<Box<dyn Future<Output = DeliveryResult> + Send>>) + Send + Sync + 'static {
        self.handlers.insert(order_type, Arc::new(f));
        self
    }

    /// Fails if any purchase order type is left without a handler.
    pub fn build(self) -> Result<DeliveryRegistry, MissingHandlerError> {
        for t in OrderType::PURCHASE_TYPES {
            if !self.handlers.contains_key(&t) {
                return Err(MissingHandlerError(t));
            }
        }
        Ok(DeliveryRegistry { handlers: self.handlers })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn registry_requires_every_purchase_type() {
        let result = DeliveryRegistry::builder()
            .register(OrderType::PremiumPurchase, |_| Box::pin(async { DeliveryResult::Delivered }))
            .build();
        assert!(result.is_err());
        let registry = DeliveryRegistry::builder()
            .register(OrderType::PremiumPurchase, |_| Box::pin(async { DeliveryResult::Delivered }))
            .register(OrderType::EnergyPurchase, |_| Box::pin(async { DeliveryResult::Delivered }))
            .build()
            .unwrap();
        assert!(registry.handler_for(OrderType::PremiumPurchase).is_some());
        assert!(registry.handler_for(OrderType::BalanceDeposit).is_none());
    }
}
