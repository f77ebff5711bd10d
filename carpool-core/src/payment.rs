use async_trait::async_trait;
use carpool_domain::PaymentInstruction;

use crate::BoxError;

/// Receives refund and compensation intent. Money movement happens on the other side.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn submit(&self, instruction: &PaymentInstruction) -> Result<(), BoxError>;
}
