// Integration test support for epochctl end-to-end runs
//
// A harness wires a real control channel (daemon side), an in-memory training
// host and SDK clients together inside one tokio runtime.

pub mod test_harness;

pub use test_harness::{TestHarness, TestResult};
