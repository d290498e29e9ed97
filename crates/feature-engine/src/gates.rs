use screener_core::{reason, GateDecision};

/// Evaluate the configured price gates against one stage's last observed
/// price. Stateless: each stage calls this against its own snapshot, so a
/// symbol can pass stage 1 and fail stage 2 after the price moved.
///
/// A NaN price fails any configured bound: a missing number must never be
/// allowed to satisfy a numeric gate.
pub fn apply_gates(last_price: f64, price_min: Option<f64>, price_max: Option<f64>) -> GateDecision {
    let mut reasons = Vec::new();

    if let Some(min) = price_min {
        if !(last_price >= min) {
            reasons.push(reason::PRICE_BELOW_MIN.to_string());
        }
    }
    if let Some(max) = price_max {
        if !(last_price <= max) {
            reasons.push(reason::PRICE_ABOVE_MAX.to_string());
        }
    }

    if reasons.is_empty() {
        GateDecision::pass()
    } else {
        GateDecision::fail(reasons)
    }
}
