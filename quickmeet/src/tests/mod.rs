mod controller_tests;
mod persister_tests;
mod poller_tests;
mod strategy_tests;

use std::sync::Arc;

use crate::simulation::{HostScenario, SimulatedCalendar};
use crate::{Engine, EngineConfig};

// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_test_writer()
        .try_init();
}

/// Short waits so paused-clock tests stay readable. The probe is shorter than
/// the simulated menu delay and longer than the simulated attach delay.
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        poll_interval_ms: 10,
        retry_timeout_ms: 500,
        dropdown_timeout_ms: 300,
        optimistic_probe_ms: 50,
        error_reset_delay_ms: 100,
        ..EngineConfig::default()
    }
}

/// A simulated host with its dialog open and an engine over its document
pub fn open_calendar(scenario: HostScenario) -> (SimulatedCalendar, Arc<Engine>) {
    init_tracing();
    let host = SimulatedCalendar::new(scenario);
    host.open_dialog().expect("open dialog");
    let engine = Engine::new(host.document(), fast_config()).expect("engine");
    (host, engine)
}
