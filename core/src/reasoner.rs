//! Reasoning-model seam.
//!
//! The model interaction is an external call with unbounded latency
//! variance; implementations must enforce a hard request timeout and map
//! expiry to `DecisionTimeout`. The orchestrator treats it as a blocking
//! call, never fire-and-forget.

use async_trait::async_trait;

use crate::error::VerifyError;
use crate::model::Usage;

/// One decision request: the rendered prompt text plus the fresh screenshot.
#[derive(Debug, Clone)]
pub struct DecisionRequest {
    pub prompt: String,
    /// Base64-encoded PNG of the current observation.
    pub screenshot_b64: String,
}

/// Raw model reply; the encoder turns `text` into a [`crate::model::Decision`].
#[derive(Debug, Clone)]
pub struct ModelReply {
    pub text: String,
    pub usage: Usage,
}

#[async_trait]
pub trait Reasoner: Send + Sync {
    fn name(&self) -> &str;

    async fn decide(&self, request: DecisionRequest) -> Result<ModelReply, VerifyError>;
}
