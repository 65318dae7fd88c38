//! Environment overrides for resolution and automatic stop combine: the stop
//! delay is read as nanoseconds and converted after the resolution is fixed.

use eventide_core::{KernelConfig, Simulator, Time, Unit};

#[test]
fn test_stop_after_respects_configured_resolution() {
    unsafe {
        std::env::set_var("EVENTIDE_RESOLUTION", "us");
        std::env::set_var("EVENTIDE_STOP_AFTER_NS", "5000");
    }
    let config = KernelConfig::from_env();
    unsafe {
        std::env::remove_var("EVENTIDE_RESOLUTION");
        std::env::remove_var("EVENTIDE_STOP_AFTER_NS");
    }

    assert_eq!(config.time.resolution, Unit::Micros);
    assert_eq!(config.run.stop_after_ns, Some(5000));

    let mut sim = Simulator::with_config(&config).unwrap();
    assert_eq!(Time::resolution(), Unit::Micros);

    sim.schedule(Time::from_ticks(10), |_| {}).unwrap();
    sim.run().unwrap();

    // 5000 ns is five microsecond ticks.
    assert_eq!(sim.now(), Time::from_ticks(5));
    assert_eq!(sim.now(), Time::from_micros(5));
    // Only the stop itself ran.
    assert_eq!(sim.event_count(), 1);
    assert_eq!(sim.pending_events(), 1);
}
