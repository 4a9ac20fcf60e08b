use thiserror::Error;
use uuid::Uuid;

use crate::{EncryptedVaultItem, VaultItem};

/// Error returned by [`Fido2CredentialStore`] implementations.
///
/// The inner text is logged but never surfaced across the WebAuthn boundary;
/// relying parties only ever observe `Unknown`.
#[derive(Debug, Error)]
#[error("Credential store error: {0}")]
pub struct CredentialStoreError(pub String);

/// The vault collaborator, treated as an opaque key-value store of
/// credential-bearing items.
#[async_trait::async_trait]
pub trait Fido2CredentialStore: Send + Sync {
    /// Look up a single decrypted item by id.
    async fn get(&self, id: Uuid) -> Result<Option<VaultItem>, CredentialStoreError>;

    /// All decrypted items visible to the current user.
    async fn get_all_decrypted(&self) -> Result<Vec<VaultItem>, CredentialStoreError>;

    /// Encrypt an item for persistence.
    async fn encrypt(&self, item: VaultItem) -> Result<EncryptedVaultItem, CredentialStoreError>;

    /// Persist a new item and return its server-assigned id.
    async fn create_with_server(
        &self,
        item: EncryptedVaultItem,
    ) -> Result<Uuid, CredentialStoreError>;

    /// Persist changes to an existing item.
    async fn update_with_server(
        &self,
        item: EncryptedVaultItem,
    ) -> Result<(), CredentialStoreError>;
}
