//! Thinking modes.
//!
//! [`ThinkingMode`] is a per-session label whose only effect is the
//! step-range guidance returned with recorded thoughts.

mod thinking;

pub use thinking::*;
