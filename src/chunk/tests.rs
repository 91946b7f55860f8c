//! Unit tests for chunk splitting and reassembly.
