pub mod candle;
pub mod pair;
pub mod swap;
pub mod ws;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
