use uuid::Uuid;

/// Decrypted view of a vault item that can hold a FIDO2 credential.
#[derive(Debug, Clone)]
pub struct VaultItem {
    /// `None` until the item has been persisted and assigned an id.
    pub id: Option<Uuid>,
    /// Items owned by an organization-shared vault are visible to the user
    /// but are not treated as the user's own credentials.
    pub organization_id: Option<Uuid>,
    #[allow(missing_docs)]
    pub name: String,
    #[allow(missing_docs)]
    pub content: VaultItemContent,
}

/// The kinds of vault item the authenticator works with.
#[derive(Debug, Clone)]
pub enum VaultItemContent {
    /// A login item. A non-discoverable credential is attached to an
    /// existing login and addressed by its own generated id rather than the
    /// item id.
    Login {
        #[allow(missing_docs)]
        username: Option<String>,
        #[allow(missing_docs)]
        fido2_credential: Option<Fido2CredentialView>,
    },
    /// A standalone discoverable credential, addressed by the item id.
    Fido2Credential(#[allow(missing_docs)] Fido2CredentialView),
}

/// A virtual FIDO2 key stored in the vault.
#[derive(Debug, Clone)]
pub struct Fido2CredentialView {
    /// Set only for credentials attached to login items; such credentials
    /// are addressed by this id instead of the vault item id.
    pub non_discoverable_id: Option<Uuid>,
    #[allow(missing_docs)]
    pub key_type: String,
    #[allow(missing_docs)]
    pub key_algorithm: String,
    #[allow(missing_docs)]
    pub key_curve: String,
    /// PKCS#8 DER private key. Owned exclusively by this record; never
    /// leaves the vault boundary unencrypted.
    pub key_value: Vec<u8>,
    #[allow(missing_docs)]
    pub rp_id: String,
    #[allow(missing_docs)]
    pub rp_name: Option<String>,
    #[allow(missing_docs)]
    pub user_handle: Vec<u8>,
    #[allow(missing_docs)]
    pub user_display_name: Option<String>,
    /// Signature counter. Strictly increases with every assertion.
    pub counter: u32,
}

impl VaultItem {
    /// The FIDO2 credential held by this item, if any.
    pub fn fido2_credential(&self) -> Option<&Fido2CredentialView> {
        match &self.content {
            VaultItemContent::Login {
                fido2_credential, ..
            } => fido2_credential.as_ref(),
            VaultItemContent::Fido2Credential(credential) => Some(credential),
        }
    }

    #[allow(missing_docs)]
    pub fn fido2_credential_mut(&mut self) -> Option<&mut Fido2CredentialView> {
        match &mut self.content {
            VaultItemContent::Login {
                fido2_credential, ..
            } => fido2_credential.as_mut(),
            VaultItemContent::Fido2Credential(credential) => Some(credential),
        }
    }

    /// Whether the held credential is discoverable (a standalone item).
    pub fn is_discoverable(&self) -> bool {
        matches!(self.content, VaultItemContent::Fido2Credential(_))
    }

    /// The id this item's credential is addressed by: the item id for
    /// discoverable credentials, the credential's own generated id for
    /// non-discoverable ones.
    pub fn addressed_credential_id(&self) -> Option<Uuid> {
        match &self.content {
            VaultItemContent::Fido2Credential(_) => self.id,
            VaultItemContent::Login {
                fido2_credential, ..
            } => fido2_credential
                .as_ref()
                .and_then(|credential| credential.non_discoverable_id),
        }
    }
}

/// Encrypted form of a [`VaultItem`], produced by the store's `encrypt`
/// operation. Opaque to the authenticator; only round-tripped back into the
/// store for persistence.
#[derive(Debug, Clone)]
pub struct EncryptedVaultItem {
    /// Mirrors the item id when one has been assigned.
    pub id: Option<Uuid>,
    /// Opaque ciphertext payload.
    pub data: Vec<u8>,
}
