//! Integration Tests Module
//!
//! End-to-end tests of the agent runtime driven by the scripted completion
//! client. No network calls are made; file tools run inside temp dirs.

// Run lifecycle: single-flight, finish function, timeout, failures
mod run_controller_test;

// Pause, resume and cancellation of a live run
mod pause_cancel_test;

// Embedded <function> spans for models without native function calling
mod fake_functions_test;

// Fenced code edits applied through the run loop
mod code_edit_test;
