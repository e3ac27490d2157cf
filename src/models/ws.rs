use serde::{Deserialize, Serialize};

use crate::models::candle::{CandleResponse, validate_period};
use crate::services::subscription_dispatcher::Channel;

pub const HEARTBEAT_MESSAGE: &str = "Uniswap Heartbeat";

/// Message sent by a socket client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum ClientRequest {
    Subscribe(CandleChannelRequest),
    Unsubscribe(CandleChannelRequest),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandleChannelRequest {
    pub channel: Channel,
    pub token0_id: String,
    pub token1_id: String,
    pub period_seconds: Option<u64>,
    /// Alternative to `periodSeconds`, e.g. "5m".
    pub resolution: Option<String>,
}

/// Seconds for one of the supported resolution labels.
pub fn resolution_seconds(label: &str) -> Option<u64> {
    match label {
        "1h" => Some(3600),
        "30m" => Some(1800),
        "5m" => Some(300),
        "1m" => Some(60),
        "30s" => Some(30),
        "10s" => Some(10),
        _ => None,
    }
}

impl CandleChannelRequest {
    /// Resolves the candle period, preferring `periodSeconds`.
    pub fn period(&self) -> Result<u64, String> {
        let period = match (self.period_seconds, self.resolution.as_deref()) {
            (Some(seconds), _) => seconds,
            (None, Some(label)) => {
                resolution_seconds(label).ok_or_else(|| format!("unsupported resolution '{label}'"))?
            }
            (None, None) => return Err("periodSeconds or resolution is required".to_string()),
        };
        validate_period(period)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionAck {
    pub channel: Channel,
    pub token0_id: String,
    pub token1_id: String,
    pub period_seconds: u64,
}

/// Message pushed to a socket client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum ServerMessage {
    Subscribed(SubscriptionAck),
    Unsubscribed(SubscriptionAck),
    Candle(CandleResponse),
    Error { message: String },
    Heartbeat { message: String },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    pub fn heartbeat() -> Self {
        ServerMessage::Heartbeat {
            message: HEARTBEAT_MESSAGE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_subscribe_with_resolution() {
        let request: ClientRequest = serde_json::from_value(json!({
            "event": "subscribe",
            "channel": "candles",
            "token0Id": "0xaa",
            "token1Id": "0xbb",
            "resolution": "5m"
        }))
        .unwrap();

        let ClientRequest::Subscribe(channel) = request else {
            panic!("expected subscribe");
        };
        assert_eq!(channel.channel, Channel::Live);
        assert_eq!(channel.period(), Ok(300));
    }

    #[test]
    fn test_parse_unsubscribe_historical() {
        let request: ClientRequest = serde_json::from_value(json!({
            "event": "unsubscribe",
            "channel": "historicalCandles",
            "token0Id": "0xaa",
            "token1Id": "0xbb",
            "periodSeconds": 60
        }))
        .unwrap();

        match request {
            ClientRequest::Unsubscribe(channel) => {
                assert_eq!(channel.channel, Channel::Historical);
                assert_eq!(channel.period(), Ok(60));
            }
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[test]
    fn test_period_validation() {
        let mut request = CandleChannelRequest {
            channel: Channel::Live,
            token0_id: "0xaa".into(),
            token1_id: "0xbb".into(),
            period_seconds: None,
            resolution: None,
        };
        assert!(request.period().is_err());

        request.resolution = Some("2h".into());
        assert!(request.period().unwrap_err().contains("2h"));

        request.period_seconds = Some(0);
        assert!(request.period().is_err());

        request.period_seconds = Some(u64::MAX);
        assert!(request.period().unwrap_err().contains("at most"));

        request.period_seconds = Some(crate::models::candle::MAX_PERIOD_SECONDS);
        assert_eq!(request.period(), Ok(31_536_000));
    }

    #[test]
    fn test_unknown_event_is_rejected() {
        let parsed = serde_json::from_value::<ClientRequest>(json!({
            "event": "publish",
            "channel": "candles",
            "token0Id": "0xaa",
            "token1Id": "0xbb",
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_server_message_shape() {
        let value = serde_json::to_value(ServerMessage::heartbeat()).unwrap();
        assert_eq!(value, json!({ "event": "heartbeat", "message": "Uniswap Heartbeat" }));

        let ack = ServerMessage::Subscribed(SubscriptionAck {
            channel: Channel::Historical,
            token0_id: "0xaa".into(),
            token1_id: "0xbb".into(),
            period_seconds: 60,
        });
        assert_eq!(
            serde_json::to_value(ack).unwrap(),
            json!({
                "event": "subscribed",
                "channel": "historicalCandles",
                "token0Id": "0xaa",
                "token1Id": "0xbb",
                "periodSeconds": 60
            })
        );
    }
}
