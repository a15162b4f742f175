//! Macro for implementing Display and FromStr for label enums
//!
//! Outcome kinds, status codes and circuit states all travel through logs and
//! configuration files as lowercase snake_case labels. This macro provides a
//! single implementation for both directions and handles case-insensitive
//! parsing.
//!
//! # Example
//!
//! ```rust
//! use rpcshield_domain::impl_label_conversions;
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! pub enum Shape {
//!     Unary,
//!     ServerStream,
//! }
//!
//! impl_label_conversions!(Shape {
//!     Unary => "unary",
//!     ServerStream => "server_stream",
//! });
//! ```

/// Implements Display and FromStr traits for label enums
///
/// This macro generates:
/// - Display trait: converts enum variants to their lowercase label
/// - FromStr trait: parses case-insensitive labels to enum variants
///
/// Labels must be lowercase, since input is lowercased before matching.
#[macro_export]
macro_rules! impl_label_conversions {
    ($enum_name:ident { $($variant:ident => $str:expr),+ $(,)? }) => {
        impl std::fmt::Display for $enum_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(Self::$variant => f.write_str($str),)+
                }
            }
        }

        impl std::str::FromStr for $enum_name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($str => Ok(Self::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($enum_name), s)),
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum TestShape {
        Unary,
        ServerStream,
        Bidi,
    }

    impl_label_conversions!(TestShape {
        Unary => "unary",
        ServerStream => "server_stream",
        Bidi => "bidi",
    });

    #[test]
    fn test_display_conversion() {
        assert_eq!(TestShape::Unary.to_string(), "unary");
        assert_eq!(TestShape::ServerStream.to_string(), "server_stream");
        assert_eq!(TestShape::Bidi.to_string(), "bidi");
    }

    #[test]
    fn test_fromstr_mixed_case_and_whitespace() {
        assert_eq!(TestShape::from_str("UNARY").unwrap(), TestShape::Unary);
        assert_eq!(TestShape::from_str(" Server_Stream ").unwrap(), TestShape::ServerStream);
    }

    #[test]
    fn test_fromstr_invalid() {
        let err = TestShape::from_str("client_stream").unwrap_err();
        assert!(err.contains("TestShape"));
        assert!(err.contains("client_stream"));
    }
}
