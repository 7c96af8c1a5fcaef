//! redkeep kubehub: the platform boundary.
//!
//! [`Platform`] is the only capability the reconciler needs from the orchestration platform:
//! a label-selected list of workloads and an atomic create. [`KubePlatform`] implements it
//! with kube-rs; [`fake::FakePlatform`] implements it in memory for tests.

#![forbid(unsafe_code)]

use std::future::Future;

use anyhow::{Context, Result};
use kube::Client;
use redkeep_core::{PlatformError, ResourceSpec, RoleSelector, WorkloadRecord};
use tokio_util::sync::CancellationToken;

mod client;
pub mod fake;
mod observe;

pub use client::KubePlatform;
pub use observe::{observe_cluster, observe_role, ClusterObservation};

#[async_trait::async_trait]
pub trait Platform: Send + Sync {
    /// Lists workloads in the selector's namespace matching its labels. One list call,
    /// results returned verbatim.
    async fn list(&self, selector: &RoleSelector) -> Result<Vec<WorkloadRecord>, PlatformError>;

    /// Submits a create for exactly `spec`. Name collisions surface as
    /// [`PlatformError::AlreadyExists`].
    async fn create(&self, spec: &ResourceSpec) -> Result<(), PlatformError>;
}

/// Client from the ambient kubeconfig or in-cluster service account.
pub async fn get_kube_client() -> Result<Client> {
    Client::try_default().await.context("building kube client from default config")
}

/// Races a platform call against cancellation. A token that is already cancelled wins
/// without polling `fut`.
pub async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, PlatformError>
where
    F: Future<Output = Result<T, PlatformError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PlatformError::Cancelled),
        res = fut => res,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let res: Result<(), PlatformError> = cancellable(&cancel, async { Ok(()) }).await;
        assert_eq!(res, Err(PlatformError::Cancelled));
    }

    #[tokio::test]
    async fn live_token_passes_result_through() {
        let cancel = CancellationToken::new();
        let res = cancellable(&cancel, async { Ok::<_, PlatformError>(7) }).await;
        assert_eq!(res, Ok(7));
    }
}
