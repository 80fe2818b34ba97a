//! Attribute key constants for node properties.
//!
//! Usage: `node.attrs().get_float(A_GAIN)`

// === Identity ===
/// Human-readable name
pub const A_NAME: &str = "name";

// === Source ===
/// Frame offset applied before fetching (source frame = context frame + offset)
pub const A_OFFSET: &str = "offset";

// === Solid ===
/// Fill color (Vec4 RGBA)
pub const A_COLOR: &str = "color";

// === Gain ===
/// RGB multiplier, alpha untouched
pub const A_GAIN: &str = "gain";

// === Merge ===
/// Foreground opacity (0.0-1.0)
pub const A_OPACITY: &str = "opacity";
