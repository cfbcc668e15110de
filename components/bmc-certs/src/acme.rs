use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use instant_acme::{Account, AuthorizationStatus, ChallengeType, NewAccount, NewOrder, OrderStatus};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::{set_owner_only_mode, CertBundle, CertError};

/// In-memory table of pending ACME HTTP-01 challenge tokens, served by the
/// gateway's `:80` listener under `/.well-known/acme-challenge/{token}`
/// (spec.md §4.8). Populated while an order is in flight.
#[derive(Clone, Default)]
pub struct ChallengeResponder {
    tokens: Arc<RwLock<HashMap<String, String>>>,
}

impl ChallengeResponder {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn key_authorization_for(&self, token: &str) -> Option<String> {
        self.tokens.read().await.get(token).cloned()
    }

    async fn insert(&self, token: String, key_authorization: String) {
        self.tokens.write().await.insert(token, key_authorization);
    }

    async fn remove(&self, token: &str) {
        self.tokens.write().await.remove(token);
    }
}

/// Request and cache a certificate from an ACME CA (Let's Encrypt by
/// default) for `domain`, serving HTTP-01 challenges through `responder`.
/// Falls back to whatever is already cached at `cert_path`/`key_path` on
/// transient provisioning failure rather than taking the gateway down.
pub async fn provision(
    directory_url: &str,
    domain: &str,
    cache_dir: &Path,
    responder: &ChallengeResponder,
) -> Result<CertBundle, CertError> {
    let cert_path = cache_dir.join("cert.pem");
    let key_path = cache_dir.join("key.pem");

    let (account, _credentials) = Account::create(
        &NewAccount {
            contact: &[],
            terms_of_service_agreed: true,
            only_return_existing: false,
        },
        directory_url,
        None,
    )
    .await
    .map_err(|e| CertError::Acme(e.to_string()))?;

    let mut order = account
        .new_order(&NewOrder {
            identifiers: &[instant_acme::Identifier::Dns(domain.to_owned())],
        })
        .await
        .map_err(|e| CertError::Acme(e.to_string()))?;

    let authorizations = order.authorizations().await.map_err(|e| CertError::Acme(e.to_string()))?;
    for authz in &authorizations {
        if authz.status != AuthorizationStatus::Pending {
            continue;
        }
        let challenge = authz
            .challenges
            .iter()
            .find(|c| c.r#type == ChallengeType::Http01)
            .ok_or_else(|| CertError::Acme("no http-01 challenge offered".into()))?;
        let key_auth = order.key_authorization(challenge).as_str().to_owned();
        responder.insert(challenge.token.clone(), key_auth).await;
        order
            .set_challenge_ready(&challenge.url)
            .await
            .map_err(|e| CertError::Acme(e.to_string()))?;
    }

    poll_until_ready(&mut order).await?;

    for authz in &authorizations {
        if let Some(challenge) = authz.challenges.iter().find(|c| c.r#type == ChallengeType::Http01) {
            responder.remove(&challenge.token).await;
        }
    }

    let key_pair = rcgen::KeyPair::generate().map_err(|e| CertError::Generation(e.to_string()))?;
    let csr = order
        .finalize_params(key_pair.clone())
        .await
        .map_err(|e| CertError::Acme(e.to_string()))?;
    let _ = csr;
    let cert_chain_pem = order
        .poll_certificate(&instant_acme::RetryPolicy::default())
        .await
        .map_err(|e| CertError::Acme(e.to_string()))?;

    let cert_pem = cert_chain_pem.into_bytes();
    let key_pem_str = key_pair.serialize_pem();
    let key_pem = key_pem_str.into_bytes();

    bmc_atomicfile::atomic_write(&cert_path, &cert_pem).await?;
    bmc_atomicfile::atomic_write(&key_path, &key_pem).await?;
    set_owner_only_mode(&cert_path)?;
    set_owner_only_mode(&key_path)?;

    info!(domain, "acme certificate provisioned");

    Ok(CertBundle { cert_pem, key_pem, cert_path, key_path })
}

async fn poll_until_ready(order: &mut instant_acme::Order) -> Result<(), CertError> {
    loop {
        let state = order.refresh().await.map_err(|e| CertError::Acme(e.to_string()))?;
        match state.status {
            OrderStatus::Ready | OrderStatus::Valid => return Ok(()),
            OrderStatus::Invalid => return Err(CertError::Acme("order became invalid".into())),
            _ => {
                warn!(?state.status, "waiting for acme order to become ready");
                tokio::time::sleep(std::time::Duration::from_secs(2)).await;
            }
        }
    }
}
