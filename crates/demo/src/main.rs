//! Example binary entry point.
//!
//! This binary walks through a freeze/tick/nest/release cycle against the
//! process clock. In real deployments the library is driven from test
//! suites; here we simply narrate each step for illustration.

use chrono::{Duration, TimeZone, Utc};
use timefreeze::freeze;

fn main() {
    println!("[real] {}", timefreeze::now());

    let target = Utc.with_ymd_and_hms(2012, 1, 14, 1, 59, 59).unwrap();
    let mut handle = freeze(target);
    println!("[frozen] {}", timefreeze::now());

    // Fall-back night: moving the clock back one hour is pure arithmetic.
    handle
        .tick(Duration::hours(-1))
        .expect("demo tick should apply");
    println!("[ticked -1h] {}", timefreeze::now());

    {
        let _inner = freeze(Utc.with_ymd_and_hms(1999, 12, 31, 23, 59, 59).unwrap());
        println!(
            "[nested, depth {}] {}",
            timefreeze::freeze_depth(),
            timefreeze::now()
        );
    }
    println!("[inner released] {}", timefreeze::now());

    handle.end().expect("demo release should succeed");
    println!("[real again] {}", timefreeze::now());
}
