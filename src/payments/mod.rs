mod lemonsqueezy;

pub use lemonsqueezy::*;
