use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use nostr_passkey_core::Identity;
use tracing::{error, info, warn};

use super::{
    attach_prf_salt, parse_identity, AuthenticationOptionsRequest, AuthenticationVerifyRequest,
    CeremonyError, CeremonyOptions, CeremonyService, IdentityResponse,
};
use crate::store::{CeremonyKind, NewChallenge};

impl CeremonyService {
    /// Issue authentication options bound to the identity's credential
    ///
    /// The PRF salt is the one stored at registration, so the authenticator
    /// reproduces the same key.
    pub async fn authentication_options(
        &self,
        request: AuthenticationOptionsRequest,
    ) -> Result<CeremonyOptions, CeremonyError> {
        let identity = parse_identity(&request.identity)?;
        let credential = self
            .storage
            .credential_by_identity(&identity)
            .await?
            .ok_or(CeremonyError::CredentialNotFound)?;

        let mut issued = self.verifier.start_authentication(&credential)?;
        attach_prf_salt(&mut issued.options, &credential.prf_salt);

        self.storage
            .store_challenge(NewChallenge {
                challenge: issued.challenge,
                ceremony: CeremonyKind::Authentication,
                identity: Some(identity.clone()),
                prf_salt: Some(credential.prf_salt.clone()),
                state: issued.state,
                expires_at: NewChallenge::default_expiry(),
            })
            .await?;

        info!(stage = "OptionsIssued", identity = %identity, "Authentication options issued");

        Ok(CeremonyOptions {
            options: issued.options,
            prf_salt: URL_SAFE_NO_PAD.encode(&credential.prf_salt),
        })
    }

    /// Verify an assertion for an identity already proven by a NIP-98 header
    pub async fn verify_authentication(
        &self,
        nip98_identity: &Identity,
        request: AuthenticationVerifyRequest,
    ) -> Result<IdentityResponse, CeremonyError> {
        let identity = parse_identity(&request.identity)?;
        if nip98_identity != &identity {
            warn!(
                stage = "Init",
                identity = %identity,
                nip98_identity = %nip98_identity,
                "NIP-98 signer differs from claimed identity"
            );
            return Err(CeremonyError::AssertionIdentityMismatch);
        }

        let challenge = self.consume_response_challenge(&request.assertion).await?;
        if challenge.ceremony != CeremonyKind::Authentication {
            warn!(stage = "OptionsIssued", identity = %identity, "Registration challenge presented for authentication");
            return Err(CeremonyError::CeremonyMismatch);
        }
        if challenge.identity.as_ref() != Some(&identity) {
            warn!(stage = "OptionsIssued", identity = %identity, "Authentication challenge bound to another identity");
            return Err(CeremonyError::ChallengeIdentityMismatch);
        }

        let credential = self
            .storage
            .credential_by_identity(&identity)
            .await?
            .ok_or(CeremonyError::CredentialNotFound)?;

        let verified = self
            .verifier
            .finish_authentication(&request.assertion, &challenge.state, &credential)
            .inspect_err(|e| warn!(stage = "OptionsIssued", identity = %identity, error = %e, "Assertion rejected"))?;
        if verified.credential_id != credential.credential_id {
            warn!(
                stage = "OptionsIssued",
                identity = %identity,
                credential_id = %verified.credential_id,
                "Assertion made with an unregistered credential"
            );
            return Err(CeremonyError::CredentialMismatch);
        }

        info!(stage = "Verified", identity = %identity, credential_id = %credential.credential_id, "Assertion verified");

        if verified.counter <= credential.counter {
            error!(
                stage = "Verified",
                identity = %identity,
                credential_id = %credential.credential_id,
                stored = credential.counter,
                presented = verified.counter,
                "Credential counter did not advance, possible cloned authenticator"
            );
            return Err(CeremonyError::CounterRegression {
                stored: credential.counter,
                presented: verified.counter,
            });
        }

        let updated = self
            .storage
            .update_counter(
                &credential.credential_id,
                verified.counter,
                verified.updated_material.as_deref(),
            )
            .await?;
        if !updated {
            error!(
                stage = "Verified",
                identity = %identity,
                credential_id = %credential.credential_id,
                presented = verified.counter,
                "Conditional counter update matched no row"
            );
            return Err(CeremonyError::CounterRegression {
                stored: credential.counter,
                presented: verified.counter,
            });
        }

        info!(
            stage = "CounterUpdated",
            identity = %identity,
            credential_id = %credential.credential_id,
            counter = verified.counter,
            "Authentication complete"
        );

        Ok(IdentityResponse::from_credential(credential))
    }
}
