//! Request Service - service request workflow, payment schedules and payment reminders.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod startup;
