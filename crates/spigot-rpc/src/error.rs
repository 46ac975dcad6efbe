use std::path::PathBuf;

use thiserror::Error;

/// Failures while constructing a [`WalletRpcClient`](crate::WalletRpcClient).
#[derive(Error, Debug)]
pub enum RpcClientError {
    #[error("failed to read wallet certificate {path}: {source}")]
    ReadCertificate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid wallet certificate: {0}")]
    InvalidCertificate(#[source] reqwest::Error),

    #[error("failed to build http client: {0}")]
    Build(#[source] reqwest::Error),
}
