pub struct Config {
    pub stops_path: String,
    pub edges_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stops_path: "stops.csv".into(),
            edges_path: "edges.csv".into(),
        }
    }
}
