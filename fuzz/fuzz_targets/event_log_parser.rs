#![no_main]

use libfuzzer_sys::fuzz_target;
use statemeter::json_output::read_events;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must yield events or an error, never a panic
    let _ = read_events(data);
});
