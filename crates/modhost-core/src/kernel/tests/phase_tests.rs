use std::sync::{Arc, Mutex};

use crate::event::EventBus;
use crate::kernel::bootstrap::Orchestrator;
use crate::kernel::phase::BootstrapPhase;
use crate::kernel::tests::fixtures::{Faults, fast_config, journal, recorder};
use crate::module_system::ModuleCatalog;

#[test]
fn test_phase_names() {
    let names: Vec<&str> = BootstrapPhase::ALL.iter().map(|p| p.as_str()).collect();
    assert_eq!(names, vec!["init", "core_modules", "http_server", "module_discovery", "ready"]);
    assert_eq!(BootstrapPhase::CoreModules.to_string(), "core_modules");
    assert!(BootstrapPhase::HttpServer.accepts_hooks());
    assert!(!BootstrapPhase::Ready.accepts_hooks());
}

#[tokio::test]
async fn test_phases_are_recorded_in_order() {
    let j = journal();
    let catalog = ModuleCatalog::new()
        .with(recorder(&j, "logger", &[], Faults::default()))
        .unwrap();
    let mut orchestrator = Orchestrator::new(catalog, fast_config());
    assert!(orchestrator.phase_history().is_empty());

    orchestrator.bootstrap().await.unwrap();

    let history = orchestrator.phase_history();
    let phases: Vec<BootstrapPhase> = history.iter().map(|r| r.phase).collect();
    assert_eq!(phases, BootstrapPhase::ALL.to_vec());
    assert!(history.iter().all(|r| r.is_complete()));
    assert!(orchestrator.is_ready());
}

#[tokio::test]
async fn test_phase_signals_are_observable_on_the_bus() {
    let bus = EventBus::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&seen);
    bus.on_sync("bootstrap.*", move |event| {
        let phase = event.payload["phase"].as_str().unwrap_or_default().to_string();
        s.lock().unwrap().push(format!("{}:{}", event.topic, phase));
        // Completion signals carry a duration
        if event.topic == "bootstrap.phase.completed" {
            assert!(event.payload["duration_ms"].is_u64());
        }
        Ok(())
    })
    .unwrap();

    let mut orchestrator = Orchestrator::with_event_bus(ModuleCatalog::new(), fast_config(), bus);
    orchestrator.bootstrap().await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 10);
    assert_eq!(seen[0], "bootstrap.phase.started:init");
    assert_eq!(seen[1], "bootstrap.phase.completed:init");
    assert_eq!(seen[8], "bootstrap.phase.started:ready");
    assert_eq!(seen[9], "bootstrap.phase.completed:ready");
}
