//! Trust anchors for server certificate verification.

/// A trust anchor, commonly known as a "Root Certificate."
#[derive(Debug, Clone)]
pub struct OwnedTrustAnchor {
    subject: Vec<u8>,
    spki: Vec<u8>,
    name_constraints: Option<Vec<u8>>,
}

impl OwnedTrustAnchor {
    /// Get a `webpki::TrustAnchor` by borrowing the owned elements.
    pub(crate) fn to_trust_anchor(&self) -> webpki::TrustAnchor<'_> {
        webpki::TrustAnchor {
            subject: &self.subject,
            spki: &self.spki,
            name_constraints: self.name_constraints.as_deref(),
        }
    }

    /// Builds an anchor from a DER-encoded certificate.
    pub fn from_cert_der(der: &[u8]) -> Result<Self, RootCertStoreError> {
        let ta = webpki::TrustAnchor::try_from_cert_der(der)?;
        Ok(Self {
            subject: ta.subject.to_vec(),
            spki: ta.spki.to_vec(),
            name_constraints: ta.name_constraints.map(|nc| nc.to_vec()),
        })
    }
}

/// Errors that can occur during operations with RootCertStore
#[derive(Debug, thiserror::Error)]
#[allow(missing_docs)]
pub enum RootCertStoreError {
    #[error(transparent)]
    WebpkiError(#[from] webpki::Error),
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    #[error("no certificates found in PEM input")]
    NoPemCertificates,
}

/// A container for root certificates able to provide a root-of-trust
/// for server authentication.
#[derive(Debug, Clone, Default)]
pub struct RootCertStore {
    /// The list of roots.
    pub roots: Vec<OwnedTrustAnchor>,
}

impl RootCertStore {
    /// Make a new, empty `RootCertStore`.
    pub fn empty() -> Self {
        Self { roots: Vec::new() }
    }

    /// Return true if there are no certificates.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Say how many certificates are in the container.
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    /// Add a single DER-encoded certificate to the store.
    pub fn add(&mut self, der: &[u8]) -> Result<(), RootCertStoreError> {
        self.roots.push(OwnedTrustAnchor::from_cert_der(der)?);
        Ok(())
    }

    /// Adds every certificate of a PEM bundle to the store, returning how
    /// many were added.
    pub fn add_pem(&mut self, pem: &str) -> Result<usize, RootCertStoreError> {
        let certificates = rustls_pemfile::certs(&mut pem.as_bytes())?;
        if certificates.is_empty() {
            return Err(RootCertStoreError::NoPemCertificates);
        }

        for der in &certificates {
            self.add(der)?;
        }

        Ok(certificates.len())
    }

    pub(crate) fn trust_anchors(&self) -> Vec<webpki::TrustAnchor<'_>> {
        self.roots.iter().map(OwnedTrustAnchor::to_trust_anchor).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CA_PEM_CERT: &str = include_str!("../testdata/ca.pem");
    const CA_DER_CERT: &[u8] = include_bytes!("../testdata/ca.der");

    #[test]
    fn test_add_pem_ok() {
        let mut store = RootCertStore::empty();

        assert_eq!(store.add_pem(CA_PEM_CERT).unwrap(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_add_pem_bundle() {
        let mut store = RootCertStore::empty();
        let bundle = CA_PEM_CERT.to_owned() + CA_PEM_CERT;

        assert_eq!(store.add_pem(&bundle).unwrap(), 2);
    }

    #[test]
    fn test_add_der_ok() {
        let mut store = RootCertStore::empty();
        store.add(CA_DER_CERT).unwrap();

        assert!(!store.is_empty());
    }

    #[test]
    fn test_add_pem_err_bad_cert() {
        assert_eq!(
            RootCertStore::empty()
                .add_pem("bad pem")
                .err()
                .unwrap()
                .to_string(),
            "no certificates found in PEM input"
        );
    }

    #[test]
    fn test_add_der_err_bad_cert() {
        assert!(RootCertStore::empty().add(&[0x30, 0x00]).is_err());
    }
}
