use serde::{Deserialize, Serialize};

use crate::{session::Algorithm, transport::SERVICE_PATH};

/// Settings for a [`Service`](crate::Service). They are optional and cannot be changed once the
/// service is created.
///
/// Defaults to
///
/// ```
/// # use secret_client::{Algorithm, ServiceSettings};
/// let settings = ServiceSettings {
///     service_path: "/org/freedesktop/secrets".to_string(),
///     algorithms: vec![Algorithm::DhIetf1024Sha256Aes128CbcPkcs7, Algorithm::Plain],
/// };
/// let default = ServiceSettings::default();
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct ServiceSettings {
    /// Object path of the service. Defaults to `/org/freedesktop/secrets`
    pub service_path: String,
    /// Session algorithms to offer, most preferred first. Defaults to the encrypted algorithm
    /// followed by `plain`
    pub algorithms: Vec<Algorithm>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            service_path: SERVICE_PATH.into(),
            algorithms: vec![Algorithm::DhIetf1024Sha256Aes128CbcPkcs7, Algorithm::Plain],
        }
    }
}
