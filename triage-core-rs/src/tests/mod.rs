//! Cross-module tests for the triage core
//!
//! Unit tests live beside each module; these exercise the orchestrator
//! end to end against scripted and mocked engines.

pub mod scenario_tests;
