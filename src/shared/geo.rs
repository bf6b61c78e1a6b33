/// A raw latitude/longitude pair.
///
/// The core never projects or measures with it; it is carried from the
/// static feed through to the presentation layer, which owns projection.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}
