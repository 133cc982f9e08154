use std::sync::Arc;

use super::exchange::TokenExchange;

/// Shared state for auth route handlers.
pub(super) struct ExchangeState<V, A, S> {
    pub(super) exchange: Arc<TokenExchange<V, A, S>>,
}

// Manual Clone: avoid derive adding `V: Clone, A: Clone, S: Clone` bounds.
impl<V, A, S> Clone for ExchangeState<V, A, S> {
    fn clone(&self) -> Self {
        Self {
            exchange: self.exchange.clone(),
        }
    }
}
