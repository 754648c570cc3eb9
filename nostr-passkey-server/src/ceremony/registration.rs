use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{
    attach_prf_salt, parse_identity, random_salt, sanitize_web_id, CeremonyError,
    CeremonyOptions, CeremonyService, IdentityResponse, RegistrationOptionsRequest,
    RegistrationVerifyRequest,
};
use crate::provisioning::provision_with_timeout;
use crate::store::{CeremonyKind, NewChallenge, NewCredential, StorageError};

const DEFAULT_USER_NAME: &str = "nostr-user";
const DEFAULT_DISPLAY_NAME: &str = "Nostr User";

impl CeremonyService {
    /// Issue registration options with a fresh PRF salt
    pub async fn registration_options(
        &self,
        request: RegistrationOptionsRequest,
    ) -> Result<CeremonyOptions, CeremonyError> {
        let identity = request.identity.as_deref().map(parse_identity).transpose()?;
        if let Some(identity) = &identity {
            if self.storage.credential_by_identity(identity).await?.is_some() {
                warn!(stage = "Init", identity = %identity, "Registration requested for a registered identity");
                return Err(CeremonyError::IdentityAlreadyRegistered);
            }
        }

        let prf_salt = random_salt()?;
        let user_name = identity
            .as_ref()
            .map(|i| i.as_str().to_string())
            .unwrap_or_else(|| DEFAULT_USER_NAME.to_string());
        let display_name = request
            .display_name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string());

        let mut issued =
            self.verifier
                .start_registration(Uuid::new_v4(), &user_name, &display_name)?;
        attach_prf_salt(&mut issued.options, &prf_salt);

        self.storage
            .store_challenge(NewChallenge {
                challenge: issued.challenge,
                ceremony: CeremonyKind::Registration,
                identity: None,
                prf_salt: Some(prf_salt.clone()),
                state: issued.state,
                expires_at: NewChallenge::default_expiry(),
            })
            .await?;

        info!(stage = "OptionsIssued", "Registration options issued");

        Ok(CeremonyOptions {
            options: issued.options,
            prf_salt: URL_SAFE_NO_PAD.encode(prf_salt),
        })
    }

    /// Verify an attestation and store the credential for the identity
    pub async fn verify_registration(
        &self,
        request: RegistrationVerifyRequest,
    ) -> Result<IdentityResponse, CeremonyError> {
        let identity = parse_identity(&request.identity)?;
        let client_web_id = request.web_id.as_deref().map(sanitize_web_id).transpose()?;

        let challenge = self.consume_response_challenge(&request.attestation).await?;
        if challenge.ceremony != CeremonyKind::Registration {
            warn!(stage = "OptionsIssued", identity = %identity, "Authentication challenge presented for registration");
            return Err(CeremonyError::CeremonyMismatch);
        }
        if challenge.identity.as_ref().is_some_and(|bound| bound != &identity) {
            warn!(stage = "OptionsIssued", identity = %identity, "Registration challenge bound to another identity");
            return Err(CeremonyError::ChallengeIdentityMismatch);
        }
        if self.storage.credential_by_identity(&identity).await?.is_some() {
            return Err(CeremonyError::IdentityAlreadyRegistered);
        }

        let verified = self
            .verifier
            .finish_registration(&request.attestation, &challenge.state)
            .inspect_err(|e| warn!(stage = "OptionsIssued", identity = %identity, error = %e, "Attestation rejected"))?;

        info!(
            stage = "Verified",
            identity = %identity,
            credential_id = %verified.credential_id,
            "Attestation verified"
        );

        let prf_salt = challenge.prf_salt.ok_or_else(|| {
            CeremonyError::Internal("registration challenge has no PRF salt".into())
        })?;

        let mut web_id = client_web_id;
        let mut pod_url = None;
        if let Some(provisioner) = &self.provisioner {
            match provision_with_timeout(provisioner.as_ref(), &identity, self.provisioning_timeout)
                .await
            {
                Ok(pod) => {
                    info!(stage = "Verified", identity = %identity, pod_url = %pod.pod_url, "Pod provisioned");
                    web_id = Some(pod.web_id);
                    pod_url = Some(pod.pod_url);
                }
                Err(e) => {
                    warn!(stage = "Verified", identity = %identity, error = %e, "Pod provisioning failed, continuing without a pod");
                }
            }
        }

        let credential = self
            .storage
            .insert_credential(NewCredential {
                credential_id: verified.credential_id,
                identity: identity.clone(),
                public_key_bytes: verified.public_key_bytes,
                counter: verified.counter,
                device_type: verified.device_type,
                backed_up: verified.backed_up,
                transports: verified.transports,
                prf_salt,
                web_id,
                pod_url,
            })
            .await
            .map_err(|e| match e {
                StorageError::Duplicate(_) => CeremonyError::IdentityAlreadyRegistered,
                other => {
                    error!(stage = "Verified", identity = %identity, error = %other, "Failed to store credential");
                    CeremonyError::Store(other)
                }
            })?;

        info!(
            stage = "Stored",
            identity = %credential.identity,
            credential_id = %credential.credential_id,
            "Registration complete"
        );

        Ok(IdentityResponse::from_credential(credential))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use nostr_passkey_core::{Identity, NostrKeypair};
    use serde_json::Value;

    use super::super::test_support::*;
    use super::*;
    use crate::provisioning::{PodInfo, PodProvisioner, ProvisioningError};

    #[tokio::test]
    async fn test_registration_stores_credential_with_issued_salt() {
        let service = service();
        let authenticator = authenticator(1);

        let (identity, credential) = register(&service, &authenticator).await;

        let stored = service
            .storage
            .credential_by_identity(&identity)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.credential_id, authenticator.credential_id());
        assert_eq!(credential.did_nostr, format!("did:nostr:{identity}"));
        assert_eq!(stored.prf_salt.len(), 32);
        assert!(credential.web_id.is_none());
        assert!(credential.pod_url.is_none());
    }

    #[tokio::test]
    async fn test_options_carry_prf_salt() {
        let service = service();
        let issued = service
            .registration_options(RegistrationOptionsRequest::default())
            .await
            .unwrap();
        assert_eq!(
            issued.options.pointer("/publicKey/extensions/prf/eval/first"),
            Some(&Value::String(issued.prf_salt.clone()))
        );
    }

    #[tokio::test]
    async fn test_second_registration_rejected() {
        let service = service();
        let authenticator = authenticator(1);
        let (identity, _) = register(&service, &authenticator).await;

        let again = service
            .registration_options(RegistrationOptionsRequest {
                display_name: None,
                identity: Some(identity.to_string()),
            })
            .await;
        assert!(matches!(again, Err(CeremonyError::IdentityAlreadyRegistered)));

        // A second device deriving the same identity is also refused at verify time.
        let other = super::super::test_support::authenticator(9);
        let issued = service
            .registration_options(RegistrationOptionsRequest::default())
            .await
            .unwrap();
        let result = service
            .verify_registration(RegistrationVerifyRequest {
                attestation: other.create(&issued.options).unwrap(),
                identity: identity.to_string(),
                web_id: None,
            })
            .await;
        assert!(matches!(result, Err(CeremonyError::IdentityAlreadyRegistered)));
    }

    #[tokio::test]
    async fn test_challenge_cannot_be_replayed() {
        let service = service();
        let authenticator = authenticator(2);
        let issued = service
            .registration_options(RegistrationOptionsRequest::default())
            .await
            .unwrap();
        let attestation = authenticator.create(&issued.options).unwrap();
        let identity = identity_from(&authenticator, &issued.prf_salt);

        service
            .verify_registration(RegistrationVerifyRequest {
                attestation: attestation.clone(),
                identity: identity.to_string(),
                web_id: None,
            })
            .await
            .unwrap();

        let replay = service
            .verify_registration(RegistrationVerifyRequest {
                attestation,
                identity: NostrKeypair::generate().unwrap().identity().to_string(),
                web_id: None,
            })
            .await;
        assert!(matches!(replay, Err(CeremonyError::ChallengeNotFoundExpiredOrUsed)));
    }

    #[tokio::test]
    async fn test_invalid_identity_and_web_id() {
        let service = service();
        let result = service
            .verify_registration(RegistrationVerifyRequest {
                attestation: Value::Null,
                identity: "a".repeat(63),
                web_id: None,
            })
            .await;
        assert!(matches!(result, Err(CeremonyError::IdentityInvalid)));

        let result = service
            .verify_registration(RegistrationVerifyRequest {
                attestation: Value::Null,
                identity: "a".repeat(64),
                web_id: Some("http://insecure.example/card#me".into()),
            })
            .await;
        assert!(matches!(result, Err(CeremonyError::InvalidWebId(_))));
    }

    #[tokio::test]
    async fn test_failed_attestation_burns_challenge_and_stores_nothing() {
        let service = service();
        let authenticator = authenticator(3);
        let issued = service
            .registration_options(RegistrationOptionsRequest::default())
            .await
            .unwrap();
        let mut attestation = authenticator.create(&issued.options).unwrap();
        attestation["response"]["publicKey"] = Value::String("***".into());
        let identity = identity_from(&authenticator, &issued.prf_salt);

        let result = service
            .verify_registration(RegistrationVerifyRequest {
                attestation,
                identity: identity.to_string(),
                web_id: None,
            })
            .await;
        assert!(matches!(result, Err(CeremonyError::MalformedCeremonyResponse(_))));
        assert!(service
            .storage
            .credential_by_identity(&identity)
            .await
            .unwrap()
            .is_none());
    }

    struct FixedProvisioner(Option<PodInfo>);

    #[async_trait]
    impl PodProvisioner for FixedProvisioner {
        async fn provision(&self, _identity: &Identity) -> Result<PodInfo, ProvisioningError> {
            self.0
                .clone()
                .ok_or(ProvisioningError::MissingControl("controls.account.create"))
        }
    }

    #[tokio::test]
    async fn test_provisioned_pod_recorded() {
        let pod = PodInfo {
            web_id: "https://pods.example.com/x/profile/card#me".into(),
            pod_url: "https://pods.example.com/x/".into(),
        };
        let service = service().with_provisioner(
            Arc::new(FixedProvisioner(Some(pod.clone()))),
            Duration::from_secs(1),
        );
        let authenticator = authenticator(4);
        let (_, credential) = register(&service, &authenticator).await;
        assert_eq!(credential.web_id, Some(pod.web_id));
        assert_eq!(credential.pod_url, Some(pod.pod_url));
    }

    #[tokio::test]
    async fn test_provisioning_failure_keeps_client_web_id() {
        let service = service()
            .with_provisioner(Arc::new(FixedProvisioner(None)), Duration::from_secs(1));
        let authenticator = authenticator(5);
        let issued = service
            .registration_options(RegistrationOptionsRequest::default())
            .await
            .unwrap();
        let identity = identity_from(&authenticator, &issued.prf_salt);

        let credential = service
            .verify_registration(RegistrationVerifyRequest {
                attestation: authenticator.create(&issued.options).unwrap(),
                identity: identity.to_string(),
                web_id: Some("https://alice.example.com/card#me".into()),
            })
            .await
            .unwrap();
        assert_eq!(credential.web_id.as_deref(), Some("https://alice.example.com/card#me"));
        assert!(credential.pod_url.is_none());
    }
}
