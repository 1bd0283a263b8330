//! Electee tracking for the membership portal: teams and points, onboarding
//! resources, graduate background forms, and the interview survey.

pub mod config;
pub mod electees;
pub mod error;
pub mod telemetry;
