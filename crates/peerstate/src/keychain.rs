//! The credential store a peer signs and decrypts with.

use peerstate_core::{IdentityUser, Keypair, PublicKey, SecretResolver};

/// Key material and identity of the local party.
///
/// Every accessor returns `None` until the store has what is asked for,
/// e.g. before login. Secret resolution comes from the [`SecretResolver`]
/// supertrait.
pub trait Keychain: SecretResolver {
    /// Key that signs identity credentials.
    fn server_public_key(&self) -> Option<PublicKey>;

    /// The local identity credential, as issued by the server.
    fn signed_public_key(&self) -> Option<String>;

    /// The key that signs outgoing operations.
    fn private_key(&self) -> Option<Keypair>;

    /// The user named by the local identity credential.
    fn user_info(&self) -> Option<IdentityUser>;
}
