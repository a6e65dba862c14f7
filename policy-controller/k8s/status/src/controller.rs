use crate::update::{StatusPolicy, Update};
use kuadrant_policy_controller_core::{PolicyKind, ResourceId, POLICY_CONTROLLER_NAME};
use kuadrant_policy_controller_k8s_api::{
    self as k8s,
    policy::{AuthPolicy, DNSPolicy, RateLimitPolicy, TLSPolicy, TokenRateLimitPolicy},
};
use tokio::sync::mpsc::UnboundedReceiver;

/// Applies status patches computed by reconciliation passes.
pub struct Controller {
    client: k8s::Client,
    updates: UnboundedReceiver<Update>,
}

impl Controller {
    pub fn new(client: k8s::Client, updates: UnboundedReceiver<Update>) -> Self {
        Self { client, updates }
    }

    pub async fn process_updates(mut self) {
        let patch_params = k8s::PatchParams::apply(POLICY_CONTROLLER_NAME);

        while let Some(Update { kind, id, patch }) = self.updates.recv().await {
            let result = match kind {
                PolicyKind::Auth => self.patch::<AuthPolicy>(&id, &patch_params, &patch).await,
                PolicyKind::RateLimit => {
                    self.patch::<RateLimitPolicy>(&id, &patch_params, &patch).await
                }
                PolicyKind::TokenRateLimit => {
                    self.patch::<TokenRateLimitPolicy>(&id, &patch_params, &patch)
                        .await
                }
                PolicyKind::Tls => self.patch::<TLSPolicy>(&id, &patch_params, &patch).await,
                PolicyKind::Dns => self.patch::<DNSPolicy>(&id, &patch_params, &patch).await,
            };

            let ResourceId { namespace, name } = &id;
            match result {
                Ok(()) => tracing::debug!(%kind, %namespace, %name, "Patched status"),
                // The next pass recomputes the status against the newer
                // version.
                Err(k8s::Error::Api(error)) if error.code == 409 => {
                    tracing::debug!(%kind, %namespace, %name, "Conflict patching status");
                }
                Err(error) => {
                    tracing::error!(%kind, %namespace, %name, %error, "Failed to patch status");
                }
            }
        }
    }

    async fn patch<P: StatusPolicy>(
        &self,
        id: &ResourceId,
        params: &k8s::PatchParams,
        patch: &k8s::Patch<serde_json::Value>,
    ) -> Result<(), k8s::Error> {
        let api = k8s::Api::<P>::namespaced(self.client.clone(), &id.namespace);
        api.patch_status(&id.name, params, patch).await?;
        Ok(())
    }
}
