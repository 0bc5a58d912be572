/// `[lat, lon]` in degrees, the order the backend emits.
pub type Coordinate = [f64; 2];

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two coordinates in meters.
pub fn haversine_m(a: Coordinate, b: Coordinate) -> f64 {
    let phi1 = a[0].to_radians();
    let phi2 = b[0].to_radians();
    let dphi = (b[0] - a[0]).to_radians();
    let dlambda = (b[1] - a[1]).to_radians();
    let h = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().atan2((1.0 - h).sqrt())
}

pub fn polyline_length_m(coords: &[Coordinate]) -> f64 {
    coords.windows(2).map(|w| haversine_m(w[0], w[1])).sum()
}

/// Point halfway along the polyline.
///
/// Walks cumulative segment lengths until half the total is reached, then
/// interpolates linearly inside the straddling segment. Degenerate lines
/// (all vertices identical) fall back to the first vertex.
pub fn center_point(coords: &[Coordinate]) -> Option<Coordinate> {
    let first = *coords.first()?;
    let total = polyline_length_m(coords);
    if total <= f64::EPSILON {
        return Some(first);
    }

    let half = total / 2.0;
    let mut walked = 0.0;
    for w in coords.windows(2) {
        let segment = haversine_m(w[0], w[1]);
        if walked + segment >= half {
            let t = if segment > 0.0 {
                (half - walked) / segment
            } else {
                0.0
            };
            return Some([
                w[0][0] + (w[1][0] - w[0][0]) * t,
                w[0][1] + (w[1][1] - w[0][1]) * t,
            ]);
        }
        walked += segment;
    }

    coords.last().copied()
}
