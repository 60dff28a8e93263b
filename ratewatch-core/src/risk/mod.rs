//! Risk pipeline: stop loss, then profit target, then position sizing.

pub mod profit_target;
pub mod sizing;
pub mod stop_loss;

pub use profit_target::{ProfitTarget, TargetKind};
pub use sizing::{PositionSizing, RiskScore, Tier};
pub use stop_loss::{StopComponent, StopKind, StopLoss};
