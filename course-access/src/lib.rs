//! Course Access Utility Functions
//!
//! ## Current API
//!
//! - Sequential lesson unlock checks
//! - Course completion checks
//! - Enrollment expiry and remaining-days calculation
//! - Course document validation
//!
//! All functions are pure: they operate on in-memory snapshots of the
//! course, enrollment, and progress collections and perform no I/O.
pub mod access;
pub mod error;
pub mod validate;
