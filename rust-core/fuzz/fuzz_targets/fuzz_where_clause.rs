// SPDX-License-Identifier: PMPL-1.0-or-later
//
// Fuzz target for the WHERE / ORDER BY / execute parsers.
// Run with: cargo +nightly fuzz run fuzz_where_clause
//
// The first byte picks how many arguments to bind; the rest is the clause.
// Every input must either parse or be rejected with an error, never panic,
// and an accepted clause must bind exactly the arguments supplied.

#![no_main]

use libfuzzer_sys::fuzz_target;
use nutrilog_store::{statement, Filter, OrderBy, Value};

fuzz_target!(|data: &[u8]| {
    let Some((&arg_count, rest)) = data.split_first() else {
        return;
    };
    let Ok(input) = std::str::from_utf8(rest) else {
        return;
    };
    if input.len() > 4096 {
        return;
    }

    let args: Vec<Value> = (0..i64::from(arg_count % 8)).map(Value::Integer).collect();
    if let Ok(filter) = Filter::parse(input, &args) {
        assert_eq!(filter.conditions().len(), args.len());
        let _ = filter.validate();
    }

    let _ = OrderBy::parse(input);
    let _ = statement::classify(input);
});
