use async_trait::async_trait;

/// Source of the currently most profitable GPU algorithm id.
///
/// Opaque to the orchestrator: it may be slow or fail, and it is never retried within a
/// cycle.
#[async_trait]
pub trait AlgorithmSelector: Send + Sync {
    async fn best_algorithm(&self) -> anyhow::Result<String>;

    fn name(&self) -> &'static str;
}

/// Always answers the same algorithm. Used when profitability lookup is disabled.
#[derive(Debug, Clone)]
pub struct FixedAlgorithm(pub String);

#[async_trait]
impl AlgorithmSelector for FixedAlgorithm {
    async fn best_algorithm(&self) -> anyhow::Result<String> {
        Ok(self.0.clone())
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}
