//! Error types for decoding native LSF results.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::decoder::NativeAddr;

/// Errors raised while decoding native memory into views.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// A positive element count was paired with a null array pointer.
    #[error("inconsistent count for {field}: {count} elements declared but the array pointer is null")]
    InconsistentCount {
        /// Array field whose count was declared.
        field: &'static str,
        /// Declared element count.
        count: i32,
    },

    /// A counted call handed back a result without its element count.
    #[error("{call} returned a table without its element count")]
    MissingCount {
        /// Library function that produced the result.
        call: &'static str,
    },

    /// A declared count is larger than the decoder is willing to walk.
    #[error("count for {field} is {count}, above the limit of {limit}")]
    CountExceedsLimit {
        /// Array field whose count was declared.
        field: &'static str,
        /// Declared element count.
        count: i32,
        /// Largest count accepted.
        limit: usize,
    },

    /// A per-index predicate was asked about an index outside the declared index space.
    #[error("load index {index} is outside the declared index space of {limit}")]
    InvalidIndex {
        /// Requested index.
        index: usize,
        /// Number of declared indices.
        limit: usize,
    },

    /// A view was about to be exposed while lazy fields were still pending.
    #[error("{pending} lazy field(s) left unresolved during assembly")]
    UnresolvedLazyField {
        /// Number of lazy fields that were deferred but never resolved.
        pending: usize,
    },

    /// A read touched memory outside every mapped region.
    #[error("read of {len} byte(s) at {addr} is outside mapped memory")]
    UnmappedAddress {
        /// Start of the read.
        addr: NativeAddr,
        /// Length of the read.
        len: usize,
    },

    /// Pointer arithmetic overflowed the address space.
    #[error("address {addr} + {offset} overflows")]
    AddressOverflow {
        /// Base address.
        addr: NativeAddr,
        /// Byte offset that was added.
        offset: usize,
    },

    /// Text bytes were not valid UTF-8.
    #[error("field {field} does not hold valid text")]
    InvalidText {
        /// Field holding the text.
        field: &'static str,
    },

    /// A C string ran past the configured maximum without a terminator.
    #[error("string at {addr} is not terminated within {max_len} bytes")]
    UnterminatedText {
        /// Start of the string.
        addr: NativeAddr,
        /// Longest accepted length.
        max_len: usize,
    },

    /// The selected layout has no such field.
    #[error("structure {structure} has no field {field} in this layout")]
    MissingField {
        /// Structure name.
        structure: &'static str,
        /// Field name.
        field: &'static str,
    },

    /// A field was read as the wrong kind.
    #[error("field {structure}.{field} is not a {expected}")]
    FieldKind {
        /// Structure name.
        structure: &'static str,
        /// Field name.
        field: &'static str,
        /// Kind the caller asked for.
        expected: &'static str,
    },
}

/// An `lserrno` value reported by the native library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ErrorCode(pub i32);

/// Coarse groups of native error codes, used upstream for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorClass {
    /// A wrapped system call failed.
    Syscall,
    /// Malformed resource requirement expression.
    ResourceRequirement,
    /// Wire protocol or version mismatch.
    Protocol,
    /// Named host, cluster, resource, user or file does not exist.
    NotFound,
    /// Licensing refused the request.
    License,
    /// Configuration files or environment are broken.
    Configuration,
    /// A daemon is down or did not answer in time.
    Unavailable,
    /// Anything else.
    Other,
}

impl ErrorCode {
    pub const NO_ERR: Self = Self(0);
    pub const BAD_XDR: Self = Self(1);
    pub const MSG_SYS: Self = Self(2);
    pub const BAD_ARGS: Self = Self(3);
    pub const MASTR_UNKNW: Self = Self(4);
    pub const LIM_DOWN: Self = Self(5);
    pub const PROTOC_LIM: Self = Self(6);
    pub const SOCK_SYS: Self = Self(7);
    pub const ACCEPT_SYS: Self = Self(8);
    pub const NO_HOST: Self = Self(10);
    pub const NO_ELHOST: Self = Self(11);
    pub const TIME_OUT: Self = Self(12);
    pub const SIG_SYS: Self = Self(20);
    pub const BAD_EXP: Self = Self(21);
    pub const LSFCONF: Self = Self(24);
    pub const BAD_ENV: Self = Self(25);
    pub const BAD_OPCODE: Self = Self(32);
    pub const PROTOC_RES: Self = Self(33);
    pub const BAD_HOST: Self = Self(46);
    pub const PROTOC_NIOS: Self = Self(47);
    pub const WAIT_SYS: Self = Self(48);
    pub const BAD_CLUSTER: Self = Self(51);
    pub const EXECV_SYS: Self = Self(53);
    pub const NLSF_HOST: Self = Self(57);
    pub const UNKWN_RESNAME: Self = Self(58);
    pub const UNKWN_RESVALUE: Self = Self(59);
    pub const LIMIT_SYS: Self = Self(63);
    pub const NO_LICENSE: Self = Self(65);
    pub const CONF_SYNTAX: Self = Self(68);
    pub const FILE_SYS: Self = Self(69);
    pub const CONN_SYS: Self = Self(70);
    pub const SELECT_SYS: Self = Self(71);
    pub const EOF: Self = Self(72);
    pub const PIPE: Self = Self(76);
    pub const ESUB: Self = Self(77);
    pub const NO_FILE: Self = Self(80);
    pub const PROTOCOL: Self = Self(84);
    pub const MISC_SYS: Self = Self(86);
    pub const NO_RESOURCE: Self = Self(89);
    pub const SUDOERS_CONF: Self = Self(93);
    pub const REGISTRY_SYS: Self = Self(99);
    pub const LIMCONF_NOTREADY: Self = Self(101);
    pub const MASTER_LIM_DOWN: Self = Self(102);
    pub const GETCONF_FAILED: Self = Self(109);
    pub const LIC_OVERUSE: Self = Self(112);
    pub const EGOCONF: Self = Self(113);
    pub const BAD_EGO_ENV: Self = Self(114);
    pub const EGO_CONF_SYNTAX: Self = Self(115);
    pub const EGO_GETCONF_FAILED: Self = Self(116);
    pub const UNKWN_USER: Self = Self(119);
    pub const UNRESOLVALBE_HOST: Self = Self(123);
    pub const NERR: Self = Self(127);

    const SYSCALL: [Self; 14] = [
        Self::SELECT_SYS,
        Self::CONN_SYS,
        Self::FILE_SYS,
        Self::MSG_SYS,
        Self::SOCK_SYS,
        Self::ACCEPT_SYS,
        Self::SIG_SYS,
        Self::WAIT_SYS,
        Self::EXECV_SYS,
        Self::LIMIT_SYS,
        Self::PIPE,
        Self::ESUB,
        Self::REGISTRY_SYS,
        Self::MISC_SYS,
    ];

    const NAMES: &'static [(Self, &'static str)] = &[
        (Self::NO_ERR, "LSE_NO_ERR"),
        (Self::BAD_XDR, "LSE_BAD_XDR"),
        (Self::MSG_SYS, "LSE_MSG_SYS"),
        (Self::BAD_ARGS, "LSE_BAD_ARGS"),
        (Self::MASTR_UNKNW, "LSE_MASTR_UNKNW"),
        (Self::LIM_DOWN, "LSE_LIM_DOWN"),
        (Self::PROTOC_LIM, "LSE_PROTOC_LIM"),
        (Self::SOCK_SYS, "LSE_SOCK_SYS"),
        (Self::ACCEPT_SYS, "LSE_ACCEPT_SYS"),
        (Self::NO_HOST, "LSE_NO_HOST"),
        (Self::NO_ELHOST, "LSE_NO_ELHOST"),
        (Self::TIME_OUT, "LSE_TIME_OUT"),
        (Self::SIG_SYS, "LSE_SIG_SYS"),
        (Self::BAD_EXP, "LSE_BAD_EXP"),
        (Self::LSFCONF, "LSE_LSFCONF"),
        (Self::BAD_ENV, "LSE_BAD_ENV"),
        (Self::BAD_OPCODE, "LSE_BAD_OPCODE"),
        (Self::PROTOC_RES, "LSE_PROTOC_RES"),
        (Self::BAD_HOST, "LSE_BAD_HOST"),
        (Self::PROTOC_NIOS, "LSE_PROTOC_NIOS"),
        (Self::WAIT_SYS, "LSE_WAIT_SYS"),
        (Self::BAD_CLUSTER, "LSE_BAD_CLUSTER"),
        (Self::EXECV_SYS, "LSE_EXECV_SYS"),
        (Self::NLSF_HOST, "LSE_NLSF_HOST"),
        (Self::UNKWN_RESNAME, "LSE_UNKWN_RESNAME"),
        (Self::UNKWN_RESVALUE, "LSE_UNKWN_RESVALUE"),
        (Self::LIMIT_SYS, "LSE_LIMIT_SYS"),
        (Self::NO_LICENSE, "LSE_NO_LICENSE"),
        (Self::CONF_SYNTAX, "LSE_CONF_SYNTAX"),
        (Self::FILE_SYS, "LSE_FILE_SYS"),
        (Self::CONN_SYS, "LSE_CONN_SYS"),
        (Self::SELECT_SYS, "LSE_SELECT_SYS"),
        (Self::EOF, "LSE_EOF"),
        (Self::PIPE, "LSE_PIPE"),
        (Self::ESUB, "LSE_ESUB"),
        (Self::NO_FILE, "LSE_NO_FILE"),
        (Self::PROTOCOL, "LSE_PROTOCOL"),
        (Self::MISC_SYS, "LSE_MISC_SYS"),
        (Self::NO_RESOURCE, "LSE_NO_RESOURCE"),
        (Self::SUDOERS_CONF, "LSE_SUDOERS_CONF"),
        (Self::REGISTRY_SYS, "LSE_REGISTRY_SYS"),
        (Self::LIMCONF_NOTREADY, "LSE_LIMCONF_NOTREADY"),
        (Self::MASTER_LIM_DOWN, "LSE_MASTER_LIM_DOWN"),
        (Self::GETCONF_FAILED, "LSE_GETCONF_FAILED"),
        (Self::LIC_OVERUSE, "LSE_LIC_OVERUSE"),
        (Self::EGOCONF, "LSE_EGOCONF"),
        (Self::BAD_EGO_ENV, "LSE_BAD_EGO_ENV"),
        (Self::EGO_CONF_SYNTAX, "LSE_EGO_CONF_SYNTAX"),
        (Self::EGO_GETCONF_FAILED, "LSE_EGO_GETCONF_FAILED"),
        (Self::UNKWN_USER, "LSE_UNKWN_USER"),
        (Self::UNRESOLVALBE_HOST, "LSE_UNRESOLVALBE_HOST"),
        (Self::NERR, "LSE_NERR"),
    ];

    /// True when the code wraps a failed system call.
    pub fn is_syscall(self) -> bool {
        Self::SYSCALL.contains(&self)
    }

    /// True when the code reports a malformed resource requirement.
    pub fn is_bad_resreq(self) -> bool {
        self == Self::BAD_EXP || self == Self::UNKWN_RESNAME || self == Self::UNKWN_RESVALUE
    }

    /// Symbolic name, when the code is one the decoder knows by name.
    pub fn name(self) -> Option<&'static str> {
        Self::NAMES.iter().find(|(code, _)| *code == self).map(|(_, name)| *name)
    }

    /// Coarse classification for retry decisions.
    pub fn class(self) -> ErrorClass {
        if self.is_syscall() {
            return ErrorClass::Syscall;
        }
        if self.is_bad_resreq() {
            return ErrorClass::ResourceRequirement;
        }
        match self {
            Self::BAD_XDR | Self::PROTOC_LIM | Self::BAD_OPCODE | Self::PROTOC_RES
            | Self::PROTOC_NIOS | Self::PROTOCOL => ErrorClass::Protocol,
            Self::NO_HOST | Self::NO_ELHOST | Self::BAD_HOST | Self::BAD_CLUSTER
            | Self::NLSF_HOST | Self::NO_FILE | Self::NO_RESOURCE | Self::UNKWN_USER
            | Self::UNRESOLVALBE_HOST => ErrorClass::NotFound,
            Self::NO_LICENSE | Self::LIC_OVERUSE => ErrorClass::License,
            Self::LSFCONF | Self::BAD_ENV | Self::CONF_SYNTAX | Self::SUDOERS_CONF
            | Self::LIMCONF_NOTREADY | Self::GETCONF_FAILED | Self::EGOCONF
            | Self::BAD_EGO_ENV | Self::EGO_CONF_SYNTAX | Self::EGO_GETCONF_FAILED => {
                ErrorClass::Configuration
            }
            Self::MASTR_UNKNW | Self::LIM_DOWN | Self::TIME_OUT | Self::MASTER_LIM_DOWN => {
                ErrorClass::Unavailable
            }
            _ => ErrorClass::Other,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} ({})", self.0),
            None => write!(f, "lserrno {}", self.0),
        }
    }
}

/// A native call reported failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{call} failed: {code}{}", suffix(.message))]
pub struct NativeError {
    /// Native function that failed.
    pub call: &'static str,
    /// Error code reported by the library.
    pub code: ErrorCode,
    /// Library supplied message, when one was available.
    pub message: Option<String>,
}

fn suffix(message: &Option<String>) -> String {
    message.as_deref().map(|m| format!(": {m}")).unwrap_or_default()
}

impl NativeError {
    pub fn new(call: &'static str, code: ErrorCode) -> Self {
        Self { call, code, message: None }
    }
}

/// Top-level error for session queries.
#[derive(Debug, Error)]
pub enum Error {
    /// Decoding the native result failed.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The native call itself failed; the code is passed through unchanged.
    #[error(transparent)]
    NativeCallFailed(#[from] NativeError),

    /// A snapshot file could not be loaded.
    #[error("snapshot {path}: {reason}")]
    Snapshot {
        /// File that failed to load.
        path: String,
        /// What went wrong.
        reason: String,
    },

    /// The surface cannot serve this request.
    #[error("{surface} does not support {request}")]
    Unsupported {
        /// Surface name.
        surface: &'static str,
        /// Request name.
        request: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
