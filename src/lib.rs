pub mod types;
pub mod error;
pub mod config;
pub mod distribution;
pub mod distribution_store;
pub mod connection;
pub mod timetable;
pub mod delay_model;
pub mod computation;
pub mod precomputation;
pub mod realtime;
pub mod rating;

#[macro_use]
extern crate assert_float_eq;
