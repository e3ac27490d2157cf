use serde::{Deserialize, Serialize};

/// An ordered token pair. Addresses are stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pair {
    pub id: i32,
    pub token0_id: String,
    pub token1_id: String,
}

impl Pair {
    pub fn matches(&self, token0_id: &str, token1_id: &str) -> bool {
        self.token0_id.eq_ignore_ascii_case(token0_id) && self.token1_id.eq_ignore_ascii_case(token1_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairResponse {
    pub id: i32,
    pub token0_id: String,
    pub token1_id: String,
}

impl From<Pair> for PairResponse {
    fn from(pair: Pair) -> Self {
        Self {
            id: pair.id,
            token0_id: pair.token0_id,
            token1_id: pair.token1_id,
        }
    }
}
