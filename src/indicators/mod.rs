// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free implementations of the indicators drawn on the
// dashboard chart.  Insufficient data is never an error: moving averages come
// back as zero-filled series of the input length and level detection comes
// back empty.

pub mod ema;
pub mod support_resistance;

pub use ema::calculate_dema;
pub use support_resistance::{identify_support_resistance, SupportResistance};
