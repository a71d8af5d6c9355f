pub mod retry_proptest;
pub mod timer_proptest;
