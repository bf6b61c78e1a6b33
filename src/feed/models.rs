use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FeedStop {
    pub stop_id: String,
    pub stop_name: String,
    pub stop_lat: f64,
    pub stop_lon: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FeedEdge {
    pub line: String,
    pub direction: String,
    pub origin: String,
    pub destination: String,
}
