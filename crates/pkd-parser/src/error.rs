use pkd_core::PkdError;
use thiserror::Error;

/// Result type alias for parser operations
pub type Result<T> = std::result::Result<T, ParserError>;

/// Errors raised while decoding a single certificate or CRL
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// No bytes to decode
    #[error("empty input")]
    Empty,

    /// The bytes are not valid DER for the expected structure
    #[error("malformed DER: {0}")]
    Malformed(String),

    /// Bytes left over after the top-level structure
    #[error("{0} trailing bytes after the encoded structure")]
    TrailingData(usize),

    /// Valid DER, but not a structure this decoder understands
    #[error("unsupported structure: {0}")]
    UnsupportedStructure(String),
}

impl From<der::Error> for DecodeError {
    fn from(e: der::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}

/// Errors raised by signature verification
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// Algorithm or key type not supported by the verifier
    #[error("unsupported algorithm: {0}")]
    Unsupported(String),

    /// Key, parameters or certificate could not be decoded
    #[error("malformed input: {0}")]
    Malformed(String),

    /// Everything decoded but the signature is wrong
    #[error("signature does not verify")]
    Mismatch,
}

impl From<der::Error> for SignatureError {
    fn from(e: der::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}

/// Structural failures of a signed Master List; any of these aborts the bundle
#[derive(Error, Debug)]
pub enum ContainerError {
    /// Shorter than the configured minimum
    #[error("container too small: {len} bytes, need at least {min}")]
    TooSmall {
        /// Actual length
        len: usize,
        /// Configured minimum
        min: usize,
    },

    /// First byte is not a DER SEQUENCE tag
    #[error("bad magic byte 0x{0:02x}, expected 0x30")]
    BadMagic(u8),

    /// CMS envelope could not be decoded
    #[error("CMS envelope: {0}")]
    Envelope(String),

    /// A SignerInfo failed verification
    #[error("signature invalid: {0}")]
    SignatureInvalid(String),

    /// Signature verifies but the signer does not chain to the trust anchor
    #[error("untrusted signer: {0}")]
    UntrustedSigner(String),

    /// No trust anchor configured and unanchored containers are not allowed
    #[error("no trust anchor configured for master list signers")]
    NoTrustAnchor,

    /// Encapsulated content is not the expected Master List structure
    #[error("structure invalid: {0}")]
    StructureInvalid(String),

    /// Duplicate lookup failed
    #[error("existence oracle failed: {0}")]
    Oracle(#[from] PkdError),
}

/// Errors loading a configured trust anchor
#[derive(Error, Debug)]
pub enum AnchorError {
    /// File could not be read
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path of the anchor file
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// PEM armour could not be decoded
    #[error("PEM decode failed: {0}")]
    Pem(String),

    /// PEM block is not a certificate
    #[error("expected a CERTIFICATE block, found {0}")]
    NotCertificate(String),

    /// Certificate bytes are not a valid certificate
    #[error("anchor certificate: {0}")]
    Decode(#[from] DecodeError),
}

/// Top-level error for the parser crate
#[derive(Error, Debug)]
pub enum ParserError {
    /// Master List structural failure
    #[error(transparent)]
    Container(#[from] ContainerError),

    /// Trust anchor could not be loaded
    #[error(transparent)]
    Anchor(#[from] AnchorError),

    /// Standalone decode failure
    #[error(transparent)]
    Decode(#[from] DecodeError),
}
