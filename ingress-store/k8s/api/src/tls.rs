//! Well-known keys of `kubernetes.io/tls` secrets.

/// The PEM-encoded certificate chain, leaf first.
pub const CERT_KEY: &str = "tls.crt";

/// The PEM-encoded private key of the leaf certificate.
pub const PRIVATE_KEY_KEY: &str = "tls.key";

/// An optional PEM bundle of trusted issuers.
pub const CA_KEY: &str = "ca.crt";
