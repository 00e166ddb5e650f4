//! Test fixtures for metagraph test suites
//!
//! This crate provides a small in-memory type registry with a realistic
//! type hierarchy, plus helpers for creating test instances with sensible
//! defaults. It is shared across the unit and integration test suites.

pub mod instances;
pub mod registry;

pub use instances::{
    test_classification, test_entity, test_entity_named, test_relationship, TEST_COLLECTION,
    TEST_USER,
};
pub use registry::SimpleTypeRegistry;
