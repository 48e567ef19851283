//! Caller-supplied time limits for capability calls.

use std::future::Future;
use std::time::Duration;

use crate::error::{RolePackError, Result};

/// Await `fut`, failing with `on_timeout(limit)` if it runs past `limit`.
///
/// With no limit the future is awaited as is.
pub(crate) async fn bounded<T, F, E>(limit: Option<Duration>, fut: F, on_timeout: E) -> Result<T>
where
    F: Future<Output = Result<T>>,
    E: FnOnce(Duration) -> RolePackError,
{
    match limit {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(on_timeout(limit)),
        },
        None => fut.await,
    }
}

/// Re-label a capability failure as an embedding error unless it already is one.
pub(crate) fn embedding_failure(provider: &str, err: RolePackError) -> RolePackError {
    match err {
        err @ RolePackError::EmbeddingError { .. } => err,
        other => RolePackError::EmbeddingError {
            provider: provider.to_string(),
            message: other.to_string(),
        },
    }
}

/// Re-label a capability failure as a rerank error unless it already is one.
pub(crate) fn rerank_failure(reranker: &str, err: RolePackError) -> RolePackError {
    match err {
        err @ RolePackError::RerankerError { .. } => err,
        other => RolePackError::RerankerError {
            reranker: reranker.to_string(),
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn expired_call_maps_to_timeout_error() {
        let result: Result<()> = bounded(
            Some(Duration::from_millis(50)),
            async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            },
            |limit| RolePackError::EmbeddingError {
                provider: "slow".into(),
                message: format!("timed out after {limit:?}"),
            },
        )
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, RolePackError::EmbeddingError { .. }));
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn unbounded_call_passes_through() {
        let value = bounded(None, async { Ok(7) }, |_| unreachable!()).await.unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn foreign_errors_are_relabelled() {
        let err = embedding_failure("bge", RolePackError::ConfigError("boom".into()));
        assert!(
            matches!(err, RolePackError::EmbeddingError { ref provider, .. } if provider == "bge")
        );

        let err = rerank_failure(
            "bge-reranker",
            RolePackError::RerankerError { reranker: "inner".into(), message: "x".into() },
        );
        assert!(
            matches!(err, RolePackError::RerankerError { ref reranker, .. } if reranker == "inner")
        );
    }
}
