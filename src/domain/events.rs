use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// A user activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEvent {
    pub user_id: String,
    pub action: String,
    pub timestamp: DateTime<Utc>,
}

impl UserEvent {
    pub fn new(user_id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            action: action.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// An order in the system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub order_id: String,
    pub customer_id: String,
    pub amount: f64,
    pub status: String,
}

/// Encode an event payload as JSON bytes
pub fn to_json_bytes<T: Serialize>(event: &T) -> Result<Vec<u8>, DomainError> {
    Ok(serde_json::to_vec(event)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_user_event_json_shape() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let event = UserEvent::new("Example 2", "micro-managing").at(ts);

        let json: serde_json::Value =
            serde_json::from_slice(&to_json_bytes(&event).unwrap()).unwrap();

        assert_eq!(json["user_id"], "Example 2");
        assert_eq!(json["action"], "micro-managing");
        assert_eq!(json["timestamp"], "2024-05-01T12:30:00Z");
    }

    #[test]
    fn test_order_event_json_shape() {
        let event = OrderEvent {
            order_id: "Example 3".to_string(),
            customer_id: "your_customer_id".to_string(),
            amount: 69.69,
            status: "Active".to_string(),
        };

        let bytes = to_json_bytes(&event).unwrap();
        assert_eq!(
            String::from_utf8(bytes.clone()).unwrap(),
            r#"{"order_id":"Example 3","customer_id":"your_customer_id","amount":69.69,"status":"Active"}"#
        );

        let decoded: OrderEvent = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(decoded, event);
    }
}
