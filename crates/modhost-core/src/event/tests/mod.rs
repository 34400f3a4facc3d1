#[cfg(test)]
mod request_tests;

#[cfg(test)]
mod tests {
    use crate::event::{EventSystemError, SystemEvent};

    #[test]
    fn test_system_event_topics() {
        let started = SystemEvent::PhaseStarted { phase: "init".to_string() };
        assert_eq!(started.topic(), "bootstrap.phase.started");

        let failed = SystemEvent::ModuleFailed {
            module: "auth".to_string(),
            operation: "initialize".to_string(),
            error: "boom".to_string(),
        };
        assert_eq!(failed.topic(), "module.lifecycle");
    }

    #[test]
    fn test_timeout_and_responder_error_are_distinct() {
        let timeout = EventSystemError::RequestTimeout {
            topic: "db.get".to_string(),
            correlation_id: "abc".to_string(),
            timeout_ms: 100,
            attempts: 1,
        };
        let responder = EventSystemError::ResponderError {
            topic: "db.get".to_string(),
            correlation_id: "abc".to_string(),
            message: "not found".to_string(),
        };
        assert!(timeout.is_timeout());
        assert!(!timeout.is_responder_error());
        assert!(responder.is_responder_error());
        assert!(!responder.is_timeout());
        assert!(format!("{}", responder).contains("not found"));
    }
}
