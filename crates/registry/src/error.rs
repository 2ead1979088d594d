use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Store(#[from] rfctl_store::StoreError),

    #[error(transparent)]
    Crypto(#[from] rfctl_crypto::CryptoError),
}
