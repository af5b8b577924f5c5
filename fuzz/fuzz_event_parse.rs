//! Fuzz target for event priority-prefix parsing.
//!
//! Run with: cargo +nightly fuzz run fuzz_event_parse
//!
//! Datagrams come straight off the control socket, so the prefix splitter
//! must accept arbitrary bytes without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use wpactrl_core::event::{is_event, Event};

fuzz_target!(|data: &[u8]| {
    let event = Event::parse(data.to_vec());
    assert!(data.ends_with(event.body()));
    if !is_event(data) {
        assert_eq!(event.body(), data);
        assert!(event.priority().is_none());
    }
});
