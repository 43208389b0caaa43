//! TLS trust configuration with BoringSSL.

use std::sync::Arc;

use boring::ssl::{SslConnectorBuilder, SslVerifyMode};
use boring::x509::X509Ref;

use crate::base::wserror::WsError;

/// Caller-supplied certificate trust decision.
///
/// Installed via [`TlsConfig::trust_validator`], the validator gets the
/// final say over each certificate in the peer's chain. `preverified` is the
/// verdict of the default BoringSSL verification for that certificate.
pub trait TrustValidator: Send + Sync {
    fn is_valid(&self, preverified: bool, cert: Option<&X509Ref>, hostname: &str) -> bool;
}

/// TLS trust settings for a connection.
///
/// Mirrors the trust surface of the client contract: validation can be
/// disabled outright, the verified hostname can be overridden (pinned), a
/// custom [`TrustValidator`] can replace the default chain verdict, and the
/// cipher suites can be restricted.
#[derive(Clone, Default)]
pub struct TlsConfig {
    /// Skip certificate validation entirely.
    pub disable_cert_validation: bool,

    /// Verify the certificate against `desired_trust_hostname` instead of
    /// the URL host.
    pub override_trust_hostname: bool,

    /// Hostname used for SNI and certificate verification when
    /// `override_trust_hostname` is set.
    pub desired_trust_hostname: Option<String>,

    /// Custom trust decision, consulted per chain certificate.
    pub trust_validator: Option<Arc<dyn TrustValidator>>,

    /// Cipher suite restriction, as a BoringSSL cipher list string.
    pub cipher_list: Option<String>,
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("disable_cert_validation", &self.disable_cert_validation)
            .field("override_trust_hostname", &self.override_trust_hostname)
            .field("desired_trust_hostname", &self.desired_trust_hostname)
            .field("trust_validator", &self.trust_validator.is_some())
            .field("cipher_list", &self.cipher_list)
            .finish()
    }
}

impl TlsConfig {
    /// The hostname to present for SNI and certificate verification.
    pub fn server_name<'a>(&'a self, url_host: &'a str) -> &'a str {
        if self.override_trust_hostname {
            if let Some(desired) = &self.desired_trust_hostname {
                return desired;
            }
        }
        url_host
    }

    /// Apply this configuration to an SSL connector builder.
    ///
    /// `server_name` is the hostname the connection will be verified
    /// against (already resolved through [`TlsConfig::server_name`]).
    pub fn apply_to_builder(
        &self,
        builder: &mut SslConnectorBuilder,
        server_name: &str,
    ) -> Result<(), WsError> {
        if let Some(ciphers) = &self.cipher_list {
            builder
                .set_cipher_list(ciphers)
                .map_err(|e| WsError::invalid_ssl(format!("bad cipher list: {e}")))?;
        }

        if self.disable_cert_validation {
            builder.set_verify(SslVerifyMode::NONE);
        } else if let Some(validator) = &self.trust_validator {
            let validator = validator.clone();
            let hostname = server_name.to_string();
            builder.set_verify_callback(SslVerifyMode::PEER, move |preverified, ctx| {
                validator.is_valid(preverified, ctx.current_cert(), &hostname)
            });
        } else {
            builder.set_verify(SslVerifyMode::PEER);
        }

        Ok(())
    }
}
