// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The certificate authority and per-purpose leaf minting.

use crate::error::Error;
use crate::pki::role::Role;
use crate::wire::CertPair;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose,
};
use std::path::Path;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{info, warn};

const CA_COMMON_NAME: &str = "Patchbay Certificate Authority";
const CA_CERT_FILE: &str = "ca.cert.pem";
const CA_KEY_FILE: &str = "ca.key.pem";

fn cert_err(e: rcgen::Error) -> Error {
    Error::Certificate(e.to_string())
}

/// The long-lived signing authority.
///
/// Read-only after initialization; every leaf is minted fresh and never
/// cached.
pub struct Ca {
    cert_pem: String,
    issuer: Certificate,
    key: KeyPair,
}

impl Ca {
    /// Generate a fresh CA valid for `validity` from now.
    pub fn generate(validity: Duration) -> Result<Self, Error> {
        let now = OffsetDateTime::now_utc();
        Self::generate_with_window(now, now + validity)
    }

    pub(crate) fn generate_with_window(
        not_before: OffsetDateTime,
        not_after: OffsetDateTime,
    ) -> Result<Self, Error> {
        let key = KeyPair::generate().map_err(cert_err)?;

        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, CA_COMMON_NAME);
        params.distinguished_name = dn;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyCertSign,
        ];
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ClientAuth,
            ExtendedKeyUsagePurpose::ServerAuth,
        ];
        params.not_before = not_before;
        params.not_after = not_after;

        let issuer = params.self_signed(&key).map_err(cert_err)?;
        let cert_pem = issuer.pem();

        Ok(Self {
            cert_pem,
            issuer,
            key,
        })
    }

    /// Load the CA persisted in `workdir`, or generate and persist a new
    /// one when it is missing or no longer valid.
    pub fn load_or_generate(workdir: &Path, validity: Duration) -> Result<Self, Error> {
        let cert_path = workdir.join(CA_CERT_FILE);
        let key_path = workdir.join(CA_KEY_FILE);

        if cert_path.exists() && key_path.exists() {
            match Self::load(&cert_path, &key_path) {
                Ok(ca) => {
                    info!("loaded CA from {}", cert_path.display());
                    return Ok(ca);
                }
                Err(e) => warn!("regenerating CA: {}", e),
            }
        }

        let ca = Self::generate(validity)?;

        std::fs::create_dir_all(workdir)?;
        std::fs::write(&cert_path, ca.ca_pem())?;
        std::fs::write(&key_path, ca.key.serialize_pem())?;
        info!("generated CA at {}", cert_path.display());

        Ok(ca)
    }

    fn load(cert_path: &Path, key_path: &Path) -> Result<Self, Error> {
        let cert_pem = std::fs::read_to_string(cert_path)?;
        let key_pem = std::fs::read_to_string(key_path)?;

        let (_, parsed) = x509_parser::pem::parse_x509_pem(cert_pem.as_bytes())
            .map_err(|e| Error::Certificate(format!("parse CA PEM: {:?}", e)))?;
        let cert = parsed
            .parse_x509()
            .map_err(|e| Error::Certificate(format!("parse CA certificate: {:?}", e)))?;

        if !cert.validity().is_valid() {
            return Err(Error::Certificate("CA certificate expired".into()));
        }

        let key = KeyPair::from_pem(&key_pem).map_err(cert_err)?;
        let params = CertificateParams::from_ca_cert_pem(&cert_pem).map_err(cert_err)?;
        let issuer = params.self_signed(&key).map_err(cert_err)?;

        Ok(Self {
            cert_pem,
            issuer,
            key,
        })
    }

    /// The PEM handed to switches and adapters as their trust root.
    pub fn ca_pem(&self) -> &str {
        &self.cert_pem
    }

    /// Mint a leaf for one purpose.
    ///
    /// `route_id` lands in the subject Country field and is empty for
    /// benchmark certificates; `ip` lands in the SAN and is empty for
    /// pure client certificates.
    pub fn issue(
        &self,
        role: Role,
        route_id: &str,
        ip: &str,
        validity: Duration,
    ) -> Result<CertPair, Error> {
        let now = OffsetDateTime::now_utc();
        self.issue_with_window(role, route_id, ip, now, now + validity)
    }

    pub(crate) fn issue_with_window(
        &self,
        role: Role,
        route_id: &str,
        ip: &str,
        not_before: OffsetDateTime,
        not_after: OffsetDateTime,
    ) -> Result<CertPair, Error> {
        let key = KeyPair::generate().map_err(cert_err)?;

        let sans = if ip.trim().is_empty() {
            Vec::new()
        } else {
            vec![ip.trim().to_string()]
        };

        let mut params = CertificateParams::new(sans).map_err(cert_err)?;
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, role.as_str());
        if !route_id.is_empty() {
            dn.push(DnType::CountryName, route_id);
        }
        params.distinguished_name = dn;
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ClientAuth,
            ExtendedKeyUsagePurpose::ServerAuth,
        ];
        params.not_before = not_before;
        params.not_after = not_after;

        let cert = params
            .signed_by(&key, &self.issuer, &self.key)
            .map_err(cert_err)?;

        Ok(CertPair {
            cert_pem: cert.pem(),
            key_pem: key.serialize_pem(),
        })
    }
}

/// Parse the role and route tag out of a leaf certificate.
pub fn leaf_identity(cert_der: &[u8]) -> Result<(Option<Role>, String), Error> {
    let (_, cert) = x509_parser::parse_x509_certificate(cert_der)
        .map_err(|e| Error::Certificate(format!("parse leaf: {:?}", e)))?;

    let role = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .and_then(|cn| cn.parse::<Role>().ok());

    let route_id = cert
        .subject()
        .iter_country()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .unwrap_or_default()
        .to_string();

    Ok((role, route_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration as TimeDuration;

    #[test]
    fn test_generate_and_issue() {
        let ca = Ca::generate(Duration::from_secs(3600)).unwrap();
        let pair = ca
            .issue(
                Role::SwitchListener,
                "route-1",
                "127.0.0.1",
                Duration::from_secs(60),
            )
            .unwrap();

        assert!(pair.cert_pem.contains("BEGIN CERTIFICATE"));
        assert!(pair.key_pem.contains("PRIVATE KEY"));
    }

    #[test]
    fn test_leaf_identity_roundtrip() {
        let ca = Ca::generate(Duration::from_secs(3600)).unwrap();
        let pair = ca
            .issue(Role::AdapterClient, "route-7", "", Duration::from_secs(60))
            .unwrap();

        let (_, parsed) = x509_parser::pem::parse_x509_pem(pair.cert_pem.as_bytes()).unwrap();
        let (role, route_id) = leaf_identity(&parsed.contents).unwrap();

        assert_eq!(role, Some(Role::AdapterClient));
        assert_eq!(route_id, "route-7");
    }

    #[test]
    fn test_benchmark_cert_has_no_route() {
        let ca = Ca::generate(Duration::from_secs(3600)).unwrap();
        let pair = ca
            .issue(Role::BenchmarkClient, "", "", Duration::from_secs(60))
            .unwrap();

        let (_, parsed) = x509_parser::pem::parse_x509_pem(pair.cert_pem.as_bytes()).unwrap();
        let (role, route_id) = leaf_identity(&parsed.contents).unwrap();

        assert_eq!(role, Some(Role::BenchmarkClient));
        assert_eq!(route_id, "");
    }

    #[test]
    fn test_persist_and_reload() {
        let dir = tempfile::tempdir().unwrap();

        let first = Ca::load_or_generate(dir.path(), Duration::from_secs(3600)).unwrap();
        let second = Ca::load_or_generate(dir.path(), Duration::from_secs(3600)).unwrap();

        assert_eq!(first.ca_pem(), second.ca_pem());

        // A reloaded CA still signs leaves that carry its issuer name.
        let pair = second
            .issue(Role::SwitchClient, "r", "", Duration::from_secs(60))
            .unwrap();
        let (_, parsed) = x509_parser::pem::parse_x509_pem(pair.cert_pem.as_bytes()).unwrap();
        let leaf = parsed.parse_x509().unwrap();
        assert!(leaf.issuer().to_string().contains(CA_COMMON_NAME));
    }

    #[test]
    fn test_expired_ca_is_regenerated() {
        let dir = tempfile::tempdir().unwrap();
        let now = OffsetDateTime::now_utc();

        let expired =
            Ca::generate_with_window(now - TimeDuration::hours(2), now - TimeDuration::hours(1))
                .unwrap();
        std::fs::write(dir.path().join(CA_CERT_FILE), expired.ca_pem()).unwrap();
        std::fs::write(
            dir.path().join(CA_KEY_FILE),
            expired.key.serialize_pem(),
        )
        .unwrap();

        let fresh = Ca::load_or_generate(dir.path(), Duration::from_secs(3600)).unwrap();
        assert_ne!(fresh.ca_pem(), expired.ca_pem());
    }
}
