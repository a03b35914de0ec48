//! Configuration signatures shared by the patch and diagnostic tables.
//!
//! A value the diagnostic scan flags is exactly a value the patch engine
//! rewrites. Group 1 is the key with its separator, kept by replacements.

/// `default-mode: production`, any horizontal spacing.
pub const PRODUCTION_MODE: &str = r"(default-mode:[ \t]*)production\b";
/// `first-buy-pct: 0.02` and nothing longer such as `0.025`.
pub const FIRST_BUY_PCT: &str = r"(first-buy-pct:[ \t]*)0\.02\b";
/// `add-buy-pct: 0.01`.
pub const ADD_BUY_PCT: &str = r"(add-buy-pct:[ \t]*)0\.01\b";
