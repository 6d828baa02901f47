use crate::driver::{ExecuteOptions, QueryRows};
use crate::error::AccessError;
use async_trait::async_trait;

/// The seam between the dispatch path and the components that ride on it.
///
/// The connection manager implements this; the ticket scheduler and the
/// insight store consume it. Keeping the seam in the core crate lets those
/// consumers be tested against a stub executor without pulling in the
/// whole gateway.
#[async_trait]
pub trait TemplateExecutor: Send + Sync {
    /// Execute the named template with positional parameters on some
    /// permissible account.
    async fn execute_template(
        &self,
        template: &str,
        params: &[serde_json::Value],
        opts: ExecuteOptions,
    ) -> Result<QueryRows, AccessError>;
}
