//! Pure feature computation over sorted OHLCV series, and the stateless
//! price-gate evaluator. Insufficient history yields NaN, never an error;
//! NaN must never satisfy a numeric gate downstream.

pub mod features;
pub mod gates;


pub use features::compute_features;
pub use gates::apply_gates;
