//! Test suites for the analytics relay.
