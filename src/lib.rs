//! Trading safety and risk control plane.
//!
//! Four services sit between strategies and the exchange: a pre-trade
//! [`risk::RiskManager`], a margin and equity [`balance::BalanceValidator`],
//! a sticky global [`emergency::EmergencyStopManager`], and a durable
//! [`tracker::PositionTracker`]. [`plane::ControlPlane`] wires them together.

pub mod balance;
pub mod config;
pub mod domain;
pub mod emergency;
pub mod exchanges;
pub mod notification;
pub mod plane;
pub mod risk;
pub mod storage;
pub mod tracker;

pub use plane::{ControlPlane, PlaneError};
