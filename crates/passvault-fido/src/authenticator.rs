use std::future::Future;

use uuid::Uuid;

use crate::{
    attestation::{build_attestation_object, build_authenticator_data, AttestedCredentialData},
    keys::CredentialKeyPair,
    store::CredentialStoreError,
    AbortSignal, Fido2AuthenticatorError, Fido2CredentialStore, Fido2CredentialView,
    Fido2UserInterface, Flags, GetAssertionRequest, GetAssertionResult, MakeCredentialRequest,
    MakeCredentialResult, NewCredentialParams, PickCredentialParams,
    PublicKeyCredentialDescriptor, PublicKeyCredentialParameters, VaultItem, VaultItemContent,
    PUBLIC_KEY_TYPE,
};

/// The FIDO2 authenticator emulator.
///
/// Orchestrates the `makeCredential` and `getAssertion` state machines:
/// validate input, check exclusions or resolve candidates, obtain consent,
/// persist or mutate the backing vault item, then encode and sign. Every
/// step short-circuits to one of the WebAuthn error codes; the vault is
/// only touched by the persistence step, so a failure before it leaves no
/// partial mutation behind.
pub struct Fido2Authenticator<'a> {
    user_interface: &'a dyn Fido2UserInterface,
    credential_store: &'a dyn Fido2CredentialStore,
}

impl<'a> Fido2Authenticator<'a> {
    #[allow(missing_docs)]
    pub fn new(
        user_interface: &'a dyn Fido2UserInterface,
        credential_store: &'a dyn Fido2CredentialStore,
    ) -> Fido2Authenticator<'a> {
        Fido2Authenticator {
            user_interface,
            credential_store,
        }
    }

    /// Create a new credential and return its attestation object.
    pub async fn make_credential(
        &self,
        request: MakeCredentialRequest,
        abort_signal: Option<AbortSignal>,
    ) -> Result<MakeCredentialResult, Fido2AuthenticatorError> {
        let mut abort_signal = abort_signal;

        let require_resident_key = require_bool(&request.require_resident_key)?;
        let require_user_verification = require_bool(&request.require_user_verification)?;

        if !request
            .pub_key_cred_params
            .iter()
            .any(PublicKeyCredentialParameters::is_es256)
        {
            return Err(Fido2AuthenticatorError::NotSupported);
        }

        if let Some(exclude_list) = &request.exclude_list {
            let excluded = self
                .find_excluded_credentials(exclude_list, &request.rp.id)
                .await?;
            if !excluded.is_empty() {
                self.user_interface
                    .inform_excluded_credential(excluded)
                    .await;
                return Err(Fido2AuthenticatorError::NotAllowed);
            }
        }

        let key_pair = CredentialKeyPair::generate();
        let consent_params = NewCredentialParams {
            credential_name: rp_display_name(&request),
            user_name: request.user.display_name.clone(),
            user_verification: require_user_verification,
        };

        let (credential_id, user_verified) = if require_resident_key {
            self.create_discoverable(&request, &key_pair, consent_params, &mut abort_signal)
                .await?
        } else {
            self.create_non_discoverable(&request, &key_pair, consent_params, &mut abort_signal)
                .await?
        };

        let cose_public_key = key_pair.cose_public_key()?;
        let attested = AttestedCredentialData {
            credential_id: *credential_id.as_bytes(),
            cose_public_key: cose_public_key.clone(),
        };
        let authenticator_data = build_authenticator_data(
            &request.rp.id,
            Flags {
                user_present: true,
                user_verified,
                attested_credential_data: true,
            },
            0,
            Some(&attested),
        );
        let attestation_object = build_attestation_object(&authenticator_data)?;

        Ok(MakeCredentialResult {
            authenticator_data,
            attestation_object,
            credential_id: credential_id.as_bytes().to_vec(),
            public_key: cose_public_key,
        })
    }

    /// Sign a challenge with an existing credential.
    pub async fn get_assertion(
        &self,
        request: GetAssertionRequest,
        abort_signal: Option<AbortSignal>,
    ) -> Result<GetAssertionResult, Fido2AuthenticatorError> {
        let mut abort_signal = abort_signal;

        let require_user_verification = require_bool(&request.require_user_verification)?;

        let items = self
            .credential_store
            .get_all_decrypted()
            .await
            .map_err(store_error)?;

        let allow_ids: Option<Vec<Uuid>> = match &request.allow_list {
            Some(list) if !list.is_empty() => Some(parse_descriptor_ids(list)),
            _ => None,
        };

        let candidates: Vec<VaultItem> = match &allow_ids {
            Some(ids) => items
                .into_iter()
                .filter(|item| {
                    item.addressed_credential_id()
                        .is_some_and(|id| ids.contains(&id))
                })
                .filter(|item| credential_matches_rp(item, &request.rp_id))
                .collect(),
            None => items
                .into_iter()
                .filter(|item| item.is_discoverable())
                .filter(|item| credential_matches_rp(item, &request.rp_id))
                .collect(),
        };

        if candidates.is_empty() {
            if allow_ids.is_some() {
                // Reported to the user rather than silently swallowed, so
                // they can fall back to another authenticator.
                self.user_interface.inform_credential_not_found().await;
            }
            return Err(Fido2AuthenticatorError::NotAllowed);
        }

        let item_ids: Vec<Uuid> = candidates.iter().filter_map(|item| item.id).collect();
        let picked = race_abort(
            &mut abort_signal,
            self.user_interface.pick_credential(PickCredentialParams {
                item_ids,
                user_verification: require_user_verification,
            }),
        )
        .await?;
        let picked_id = picked.item_id.ok_or(Fido2AuthenticatorError::NotAllowed)?;

        let mut selected = candidates
            .into_iter()
            .find(|item| item.id == Some(picked_id))
            .ok_or(Fido2AuthenticatorError::NotAllowed)?;

        let selected_credential_id = selected.addressed_credential_id().ok_or_else(|| {
            log::error!("selected vault item has no addressable credential id");
            Fido2AuthenticatorError::Unknown
        })?;

        let (counter, user_handle, key_value) = {
            let credential = selected.fido2_credential_mut().ok_or_else(|| {
                log::error!("selected vault item lost its credential");
                Fido2AuthenticatorError::Unknown
            })?;
            credential.counter += 1;
            (
                credential.counter,
                credential.user_handle.clone(),
                credential.key_value.clone(),
            )
        };

        // The mutated counter is persisted before anything is signed; if
        // this fails the relying party never sees the assertion.
        let encrypted = self
            .credential_store
            .encrypt(selected)
            .await
            .map_err(store_error)?;
        self.credential_store
            .update_with_server(encrypted)
            .await
            .map_err(store_error)?;

        let key_pair = CredentialKeyPair::from_pkcs8_der(&key_value)?;
        let authenticator_data = build_authenticator_data(
            &request.rp_id,
            Flags {
                user_present: true,
                user_verified: picked.user_verified,
                attested_credential_data: false,
            },
            counter,
            None,
        );

        let mut message = authenticator_data.clone();
        message.extend_from_slice(&request.client_data_hash);
        let signature = key_pair.sign(&message)?;

        Ok(GetAssertionResult {
            authenticator_data,
            signature,
            selected_credential_id: selected_credential_id.as_bytes().to_vec(),
            user_handle,
        })
    }

    async fn create_discoverable(
        &self,
        request: &MakeCredentialRequest,
        key_pair: &CredentialKeyPair,
        consent_params: NewCredentialParams,
        abort_signal: &mut Option<AbortSignal>,
    ) -> Result<(Uuid, bool), Fido2AuthenticatorError> {
        let consent = race_abort(
            abort_signal,
            self.user_interface.confirm_new_credential(consent_params),
        )
        .await?;
        if !consent.confirmed {
            return Err(Fido2AuthenticatorError::NotAllowed);
        }

        let credential = build_credential_view(request, key_pair, None)?;
        let item = VaultItem {
            id: None,
            organization_id: None,
            name: rp_display_name(request),
            content: VaultItemContent::Fido2Credential(credential),
        };

        let encrypted = self
            .credential_store
            .encrypt(item)
            .await
            .map_err(store_error)?;
        let created_id = self
            .credential_store
            .create_with_server(encrypted)
            .await
            .map_err(store_error)?;

        Ok((created_id, consent.user_verified))
    }

    async fn create_non_discoverable(
        &self,
        request: &MakeCredentialRequest,
        key_pair: &CredentialKeyPair,
        consent_params: NewCredentialParams,
        abort_signal: &mut Option<AbortSignal>,
    ) -> Result<(Uuid, bool), Fido2AuthenticatorError> {
        let picked = race_abort(
            abort_signal,
            self.user_interface
                .confirm_new_non_discoverable_credential(consent_params),
        )
        .await?;
        let item_id = picked.item_id.ok_or(Fido2AuthenticatorError::NotAllowed)?;

        let mut item = self
            .credential_store
            .get(item_id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| {
                log::error!("user picked a vault item that does not exist");
                Fido2AuthenticatorError::Unknown
            })?;

        let non_discoverable_id = Uuid::new_v4();
        let credential = build_credential_view(request, key_pair, Some(non_discoverable_id))?;
        match &mut item.content {
            VaultItemContent::Login {
                fido2_credential, ..
            } => *fido2_credential = Some(credential),
            VaultItemContent::Fido2Credential(_) => {
                log::error!("cannot attach a non-discoverable credential to a standalone item");
                return Err(Fido2AuthenticatorError::Unknown);
            }
        }

        let encrypted = self
            .credential_store
            .encrypt(item)
            .await
            .map_err(store_error)?;
        self.credential_store
            .update_with_server(encrypted)
            .await
            .map_err(store_error)?;

        Ok((non_discoverable_id, picked.user_verified))
    }

    /// Vault item ids of the user's own credentials matched by the exclude
    /// list. Organization-shared items are deliberately not checked.
    async fn find_excluded_credentials(
        &self,
        descriptors: &[PublicKeyCredentialDescriptor],
        rp_id: &str,
    ) -> Result<Vec<Uuid>, Fido2AuthenticatorError> {
        let ids = parse_descriptor_ids(descriptors);
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let items = self
            .credential_store
            .get_all_decrypted()
            .await
            .map_err(store_error)?;

        Ok(items
            .into_iter()
            .filter(|item| item.organization_id.is_none())
            .filter(|item| {
                item.addressed_credential_id()
                    .is_some_and(|id| ids.contains(&id))
            })
            .filter(|item| credential_matches_rp(item, rp_id))
            .filter_map(|item| item.id)
            .collect())
    }
}

fn rp_display_name(request: &MakeCredentialRequest) -> String {
    request
        .rp
        .name
        .clone()
        .unwrap_or_else(|| request.rp.id.clone())
}

fn credential_matches_rp(item: &VaultItem, rp_id: &str) -> bool {
    item.fido2_credential()
        .is_some_and(|credential| credential.rp_id == rp_id)
}

fn parse_descriptor_ids(descriptors: &[PublicKeyCredentialDescriptor]) -> Vec<Uuid> {
    descriptors
        .iter()
        .filter(|descriptor| descriptor.ty == PUBLIC_KEY_TYPE)
        .filter_map(|descriptor| Uuid::from_slice(&descriptor.id).ok())
        .collect()
}

fn build_credential_view(
    request: &MakeCredentialRequest,
    key_pair: &CredentialKeyPair,
    non_discoverable_id: Option<Uuid>,
) -> Result<Fido2CredentialView, Fido2AuthenticatorError> {
    Ok(Fido2CredentialView {
        non_discoverable_id,
        key_type: PUBLIC_KEY_TYPE.to_owned(),
        key_algorithm: "ECDSA".to_owned(),
        key_curve: "P-256".to_owned(),
        key_value: key_pair.to_pkcs8_der()?,
        rp_id: request.rp.id.clone(),
        rp_name: request.rp.name.clone(),
        user_handle: request.user.id.clone(),
        user_display_name: Some(request.user.display_name.clone()),
        counter: 0,
    })
}

/// The option booleans cross the WebAuthn boundary untyped; anything that
/// is not a literal boolean fails the operation before any UI or store
/// interaction.
fn require_bool(value: &serde_json::Value) -> Result<bool, Fido2AuthenticatorError> {
    value.as_bool().ok_or(Fido2AuthenticatorError::Unknown)
}

fn store_error(error: CredentialStoreError) -> Fido2AuthenticatorError {
    log::error!("{error}");
    Fido2AuthenticatorError::Unknown
}

/// Race a consent prompt against the caller's abort signal. An abort
/// abandons the prompt and fails the operation as not allowed.
async fn race_abort<T>(
    abort_signal: &mut Option<AbortSignal>,
    future: impl Future<Output = T>,
) -> Result<T, Fido2AuthenticatorError> {
    match abort_signal {
        Some(signal) => tokio::select! {
            _ = signal.aborted() => Err(Fido2AuthenticatorError::NotAllowed),
            value = future => Ok(value),
        },
        None => Ok(future.await),
    }
}
