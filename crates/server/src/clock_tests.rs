// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::*;

#[test]
fn fake_clock_advances_both_clocks_in_lockstep() {
    let base = chrono::Utc::now();
    let clock = FakeClock::new(base);
    let m0 = clock.now_monotonic();
    let u0 = clock.now_utc();

    clock.advance(Duration::from_secs(30));

    assert_eq!(clock.now_monotonic() - m0, Duration::from_secs(30));
    assert_eq!(clock.now_utc() - u0, chrono::Duration::seconds(30));
}

#[test]
fn fake_clock_is_stationary_without_advance() {
    let clock = FakeClock::new(chrono::Utc::now());
    let m0 = clock.now_monotonic();
    let m1 = clock.now_monotonic();
    assert_eq!(m0, m1);
}
