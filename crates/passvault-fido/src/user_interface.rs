use uuid::Uuid;

/// What the consent prompt for a new credential shows the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCredentialParams {
    /// Display name of the relying party the credential is scoped to.
    pub credential_name: String,
    /// Display name of the user account being bound.
    pub user_name: String,
    /// Whether the authorization gesture must include user verification.
    pub user_verification: bool,
}

/// Outcome of a new-discoverable-credential consent prompt.
#[derive(Debug, Clone, Copy)]
pub struct NewCredentialConsent {
    #[allow(missing_docs)]
    pub confirmed: bool,
    #[allow(missing_docs)]
    pub user_verified: bool,
}

/// Parameters for the credential picker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickCredentialParams {
    /// Vault item ids of all candidates.
    pub item_ids: Vec<Uuid>,
    #[allow(missing_docs)]
    pub user_verification: bool,
}

/// A vault item chosen by the user, or `None` if they declined.
#[derive(Debug, Clone, Copy)]
pub struct PickedCredential {
    #[allow(missing_docs)]
    pub item_id: Option<Uuid>,
    #[allow(missing_docs)]
    pub user_verified: bool,
}

/// The consent surface the authenticator drives. All prompts suspend until
/// a human answers, which may take arbitrarily long; callers cancel via the
/// operation's abort signal, not through this trait.
#[async_trait::async_trait]
pub trait Fido2UserInterface: Send + Sync {
    /// Ask the user to confirm creation of a new discoverable credential.
    async fn confirm_new_credential(&self, params: NewCredentialParams) -> NewCredentialConsent;

    /// Ask the user to pick an existing login item to attach a
    /// non-discoverable credential to, or to decline.
    async fn confirm_new_non_discoverable_credential(
        &self,
        params: NewCredentialParams,
    ) -> PickedCredential;

    /// Ask the user to pick one of the candidate credentials for an
    /// assertion.
    async fn pick_credential(&self, params: PickCredentialParams) -> PickedCredential;

    /// Tell the user a credential they tried to register already exists.
    async fn inform_excluded_credential(&self, item_ids: Vec<Uuid>);

    /// Tell the user that none of the requested credentials exist, so they
    /// can fall back to another authenticator.
    async fn inform_credential_not_found(&self);
}
