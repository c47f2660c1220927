/// Scale a coordinate to a fixed-point integer at `decimals` decimal places.
///
/// Rounds to nearest with ties away from zero (`f64::round` semantics).
/// The same scaling feeds both key building and common-key filtering, so the
/// decimals value must be identical between those runs.
pub fn scale_coordinate(value: f64, decimals: u32) -> i64 {
    (value * 10f64.powi(decimals as i32)).round() as i64
}
