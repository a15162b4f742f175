//! Greet service messages

use serde::{Deserialize, Serialize};

/// Who to greet. A value object with no identity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Greeting {
    /// Required; an empty first name is rejected by the peer.
    pub first_name: String,
    /// Omitted from the wire when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

impl Greeting {
    /// A greeting with both names.
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self { first_name: first_name.into(), last_name: Some(last_name.into()) }
    }

    /// A greeting carrying only a first name, as used by the streaming calls.
    pub fn first_only(first_name: impl Into<String>) -> Self {
        Self { first_name: first_name.into(), last_name: None }
    }
}

/// Unary `Greet` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreetRequest {
    /// Who to greet.
    pub greeting: Greeting,
}

/// Unary `Greet` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreetResponse {
    /// Rendered greeting text.
    pub result: String,
}

/// Request that opens the `GreetManyTimes` reply stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreetManyTimesRequest {
    /// Who to greet.
    pub greeting: Greeting,
}

/// One item of the `GreetManyTimes` reply stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreetManyTimesResponse {
    /// Rendered greeting text.
    pub result: String,
}

/// One message of the `LongGreet` client stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LongGreetRequest {
    /// Who to greet.
    pub greeting: Greeting,
}

/// Aggregate reply to a `LongGreet` stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LongGreetResponse {
    /// Rendered greeting text.
    pub result: String,
}

/// One outbound message of a `GreetEveryone` session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreetEveryoneRequest {
    /// Who to greet.
    pub greeting: Greeting,
}

/// One inbound message of a `GreetEveryone` session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreetEveryoneResponse {
    /// Rendered greeting text.
    pub result: String,
}

/// Request for the deliberately slow `GreetWithDeadline` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreetWithDeadlineRequest {
    /// Who to greet.
    pub greeting: Greeting,
}

/// Reply to `GreetWithDeadline`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreetWithDeadlineResponse {
    /// Rendered greeting text.
    pub result: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_only_omits_last_name_on_the_wire() {
        let request = LongGreetRequest { greeting: Greeting::first_only("Lucy") };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, serde_json::json!({ "greeting": { "first_name": "Lucy" } }));
    }

    #[test]
    fn test_missing_last_name_decodes_as_none() {
        let greeting: Greeting = serde_json::from_str(r#"{"first_name":"Mark"}"#).unwrap();
        assert_eq!(greeting, Greeting::first_only("Mark"));
    }
}
