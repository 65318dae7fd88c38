//! Building a simulator fixes the time resolution, even when nothing but
//! raw ticks is ever scheduled.

use eventide_core::{KernelConfig, SimError, Simulator, Time, TimeError, Unit};

#[test]
fn test_resolution_cannot_change_once_events_exist() {
    let mut sim = Simulator::new();
    let id = sim.schedule(Time::from_ticks(5), |_| {}).unwrap();

    assert_eq!(
        Time::set_resolution(Unit::Seconds),
        Err(TimeError::ResolutionFrozen {
            current: Unit::Nanos
        })
    );
    assert_eq!(Time::resolution(), Unit::Nanos);
    assert_eq!(sim.delay_left(id), Time::from_nanos(5));

    let mut config = KernelConfig::default();
    config.time.resolution = Unit::Micros;
    assert!(matches!(
        Simulator::with_config(&config),
        Err(SimError::Time(TimeError::ResolutionFrozen { .. }))
    ));
}
