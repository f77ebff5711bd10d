use carpool_core::IdentityResolver;
use carpool_lifecycle::LifecycleOrchestrator;
use carpool_shared::Masked;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<LifecycleOrchestrator>,
    pub identity: Arc<dyn IdentityResolver>,
    /// Expected value of the `x-webhook-secret` header on payment callbacks.
    pub webhook_secret: Masked<String>,
}
