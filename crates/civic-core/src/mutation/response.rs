use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::Issue;

/// An authoritative mutation response, classified.
///
/// The backend does not tag its responses. [`MutationResponse::decode`]
/// decides the variant by checking for each shape's discriminating fields
/// explicitly, so a body that half-matches a shape is never guessed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationResponse {
    /// `{ "issue": <Issue> }`
    FullEntity(Box<Issue>),
    /// `{ "upvoted": bool, "upvotes": number }`
    UpvoteDelta { upvoted: bool, upvotes: u64 },
    /// Anything else, kept for logging.
    Unrecognized(Value),
}

/// Which recognized shape confirmed a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResponseShape {
    FullEntity,
    UpvoteDelta,
}

impl MutationResponse {
    #[must_use]
    pub fn decode(body: Value) -> Self {
        let Value::Object(map) = &body else {
            return Self::Unrecognized(body);
        };

        if let Some(raw) = map.get("issue") {
            return match Issue::deserialize(raw) {
                Ok(issue) => Self::FullEntity(Box::new(issue)),
                Err(err) => {
                    tracing::debug!("issue field present but not an issue: {err}");
                    Self::Unrecognized(body)
                }
            };
        }

        let upvoted = map.get("upvoted").and_then(Value::as_bool);
        let upvotes = map.get("upvotes").and_then(Value::as_u64);
        match (upvoted, upvotes) {
            (Some(upvoted), Some(upvotes)) => Self::UpvoteDelta { upvoted, upvotes },
            _ => Self::Unrecognized(body),
        }
    }

    #[must_use]
    pub const fn shape(&self) -> Option<ResponseShape> {
        match self {
            Self::FullEntity(_) => Some(ResponseShape::FullEntity),
            Self::UpvoteDelta { .. } => Some(ResponseShape::UpvoteDelta),
            Self::Unrecognized(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn issue_json() -> Value {
        json!({
            "_id": "i1",
            "title": "Pothole",
            "category": "road",
            "status": "pending",
            "upvotes": 3,
            "upvoters": ["a@x.com", "b@x.com", "c@x.com"],
            "createdAt": "2024-05-01T10:00:00Z",
            "createdBy": "z@x.com"
        })
    }

    #[test]
    fn full_entity_shape() {
        let decoded = MutationResponse::decode(json!({ "issue": issue_json() }));
        let MutationResponse::FullEntity(issue) = decoded else {
            panic!("expected full entity, got {decoded:?}");
        };
        assert_eq!(issue.id, "i1");
        assert_eq!(issue.upvotes, 3);
    }

    #[test]
    fn delta_shape() {
        let decoded = MutationResponse::decode(json!({ "upvoted": false, "upvotes": 1 }));
        assert_eq!(
            decoded,
            MutationResponse::UpvoteDelta {
                upvoted: false,
                upvotes: 1
            }
        );
        assert_eq!(decoded.shape(), Some(ResponseShape::UpvoteDelta));
    }

    #[test]
    fn partial_or_mistyped_delta_is_unrecognized() {
        for body in [
            json!({ "upvoted": true }),
            json!({ "upvotes": 4 }),
            json!({ "upvoted": "yes", "upvotes": 4 }),
            json!({ "upvoted": true, "upvotes": -1 }),
            json!({ "upvoted": true, "upvotes": 1.5 }),
        ] {
            let decoded = MutationResponse::decode(body.clone());
            assert_eq!(decoded, MutationResponse::Unrecognized(body));
        }
    }

    #[test]
    fn non_object_and_bad_issue_are_unrecognized() {
        assert_eq!(MutationResponse::decode(json!("ok")).shape(), None);
        assert_eq!(MutationResponse::decode(json!(null)).shape(), None);
        assert_eq!(
            MutationResponse::decode(json!({ "issue": { "_id": "i1" } })).shape(),
            None
        );
    }

    #[test]
    fn issue_key_wins_over_delta_fields() {
        let body = json!({ "issue": issue_json(), "upvoted": true, "upvotes": 9 });
        assert_eq!(
            MutationResponse::decode(body).shape(),
            Some(ResponseShape::FullEntity)
        );
    }
}
