//! Directory protocol result codes.

use std::fmt;

/// Result code returned by a backend operation.
///
/// Numbering follows LDAP (RFC 4511). Document backends map their native
/// failures onto the same codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    /// Operation succeeded.
    Success,
    /// Server-side operations error.
    OperationsError,
    /// Malformed request.
    ProtocolError,
    /// Time limit exceeded.
    TimeLimitExceeded,
    /// Size limit exceeded.
    SizeLimitExceeded,
    /// A critical control is not supported.
    UnavailableCriticalExtension,
    /// Attribute is not present.
    NoSuchAttribute,
    /// Attribute type is not defined in the schema.
    UndefinedAttributeType,
    /// Constraint violation.
    ConstraintViolation,
    /// Value already present.
    AttributeOrValueExists,
    /// Value does not match the attribute syntax.
    InvalidAttributeSyntax,
    /// Entry does not exist.
    NoSuchObject,
    /// DN is malformed.
    InvalidDnSyntax,
    /// Bind credentials rejected.
    InvalidCredentials,
    /// Caller lacks permission.
    InsufficientAccessRights,
    /// Server busy.
    Busy,
    /// Server unavailable.
    Unavailable,
    /// Server refuses the operation.
    UnwillingToPerform,
    /// Entry name violates naming rules.
    NamingViolation,
    /// Entry violates its object class definition.
    ObjectClassViolation,
    /// Operation needs a leaf entry.
    NotAllowedOnNonLeaf,
    /// Operation would change the RDN attribute.
    NotAllowedOnRdn,
    /// DN already exists.
    EntryAlreadyExists,
    /// Object class changes are not allowed.
    ObjectClassModsProhibited,
    /// Unspecified server error.
    Other,
    /// Client lost the connection.
    ServerDown,
    /// Client could not connect.
    ConnectError,
    /// Any other code.
    Unknown(u32),
}

impl ResultCode {
    /// Map a numeric code.
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => Self::Success,
            1 => Self::OperationsError,
            2 => Self::ProtocolError,
            3 => Self::TimeLimitExceeded,
            4 => Self::SizeLimitExceeded,
            12 => Self::UnavailableCriticalExtension,
            16 => Self::NoSuchAttribute,
            17 => Self::UndefinedAttributeType,
            19 => Self::ConstraintViolation,
            20 => Self::AttributeOrValueExists,
            21 => Self::InvalidAttributeSyntax,
            32 => Self::NoSuchObject,
            34 => Self::InvalidDnSyntax,
            49 => Self::InvalidCredentials,
            50 => Self::InsufficientAccessRights,
            51 => Self::Busy,
            52 => Self::Unavailable,
            53 => Self::UnwillingToPerform,
            64 => Self::NamingViolation,
            65 => Self::ObjectClassViolation,
            66 => Self::NotAllowedOnNonLeaf,
            67 => Self::NotAllowedOnRdn,
            68 => Self::EntryAlreadyExists,
            69 => Self::ObjectClassModsProhibited,
            80 => Self::Other,
            81 => Self::ServerDown,
            91 => Self::ConnectError,
            other => Self::Unknown(other),
        }
    }

    /// Numeric code.
    pub fn code(self) -> u32 {
        match self {
            Self::Success => 0,
            Self::OperationsError => 1,
            Self::ProtocolError => 2,
            Self::TimeLimitExceeded => 3,
            Self::SizeLimitExceeded => 4,
            Self::UnavailableCriticalExtension => 12,
            Self::NoSuchAttribute => 16,
            Self::UndefinedAttributeType => 17,
            Self::ConstraintViolation => 19,
            Self::AttributeOrValueExists => 20,
            Self::InvalidAttributeSyntax => 21,
            Self::NoSuchObject => 32,
            Self::InvalidDnSyntax => 34,
            Self::InvalidCredentials => 49,
            Self::InsufficientAccessRights => 50,
            Self::Busy => 51,
            Self::Unavailable => 52,
            Self::UnwillingToPerform => 53,
            Self::NamingViolation => 64,
            Self::ObjectClassViolation => 65,
            Self::NotAllowedOnNonLeaf => 66,
            Self::NotAllowedOnRdn => 67,
            Self::EntryAlreadyExists => 68,
            Self::ObjectClassModsProhibited => 69,
            Self::Other => 80,
            Self::ServerDown => 81,
            Self::ConnectError => 91,
            Self::Unknown(code) => code,
        }
    }

    /// Returns true for success.
    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    /// Returns true for codes that mean the write broke the schema.
    pub fn is_schema_violation(self) -> bool {
        matches!(
            self,
            Self::ObjectClassViolation
                | Self::UndefinedAttributeType
                | Self::InvalidAttributeSyntax
                | Self::NamingViolation
                | Self::NotAllowedOnRdn
                | Self::ObjectClassModsProhibited
        )
    }

    /// Returns true for codes that mean the transport is gone.
    pub fn is_connection_loss(self) -> bool {
        matches!(self, Self::ServerDown | Self::ConnectError | Self::Unavailable)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?} ({})", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_round_trip() {
        for code in [0, 32, 49, 50, 65, 68, 81, 91, 123] {
            assert_eq!(ResultCode::from_code(code).code(), code);
        }
    }

    #[test]
    fn classification() {
        assert!(ResultCode::from_code(65).is_schema_violation());
        assert!(!ResultCode::EntryAlreadyExists.is_schema_violation());
        assert!(ResultCode::ServerDown.is_connection_loss());
        assert_eq!(ResultCode::Unknown(123).to_string(), "Unknown(123) (123)");
    }
}
