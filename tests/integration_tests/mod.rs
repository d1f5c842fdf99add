// Integration suites; each file drives the cursor through the memory transport.
mod support;

mod events_tests;
mod memory_tests;
mod record_tests;
mod replay_tests;
mod retry_tests;
mod single_result_tests;
