//! Domain types: bars, fills, positions, trades, parameters.

pub mod bar;
pub mod fill;
pub mod ids;
pub mod params;
pub mod position;
pub mod trade;

pub use bar::{Bar, BarSeries, DataQualityError};
pub use fill::{Fill, FillKind, FillSide};
pub use ids::{FillId, TradeId};
pub use params::{ParamSchema, ParamSpec, ParamValue, ParameterSet};
pub use position::{Lot, Position, PositionStatus};
pub use trade::{ExitKind, Trade};
