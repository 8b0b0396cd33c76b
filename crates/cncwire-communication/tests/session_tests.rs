//! Controller session lifecycle tests over the loopback transport

use cncwire_communication::{ControllerSession, LoopbackHandle, LoopbackTransport, SessionConfig};
use cncwire_core::{
    ConnectionState, EventFilter, MachineState, MachineStatus, SessionError, SessionEvent,
    SessionState,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn session() -> (ControllerSession, LoopbackHandle) {
    let (transport, handle) = LoopbackTransport::new("/dev/ttyLOOP0");
    (
        ControllerSession::new(Box::new(transport), SessionConfig::default()),
        handle,
    )
}

fn record(session: &ControllerSession) -> Arc<Mutex<Vec<SessionEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    session
        .events()
        .subscribe(EventFilter::All, move |event| sink.lock().unwrap().push(event.clone()));
    events
}

fn names(events: &Arc<Mutex<Vec<SessionEvent>>>) -> Vec<&'static str> {
    events.lock().unwrap().iter().map(|e| e.name()).collect()
}

fn status_queries(handle: &LoopbackHandle) -> usize {
    handle.written().iter().filter(|w| w.as_slice() == b"?").count()
}

/// Let the event pump drain pending transport events
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn test_open_installs_sink_before_reset() {
    let (session, handle) = session();
    let events = record(&session);

    session.open().unwrap();

    assert_eq!(session.state(), SessionState::Open);
    assert!(handle.has_sink());
    assert_eq!(handle.written(), vec![vec![0x18]]);
    assert_eq!(names(&events), vec!["connection:open", "connection:change"]);
    assert!(session.has_query_timer());
}

#[tokio::test(start_paused = true)]
async fn test_double_open_is_rejected() {
    let (session, handle) = session();
    session.open().unwrap();

    let err = session.open().unwrap_err();
    assert!(err.is_session_error());
    assert!(err.to_string().contains("already open"));
    assert_eq!(handle.sink_installs(), 1);
    assert_eq!(handle.open_count(), 1);
    assert_eq!(session.state(), SessionState::Open);
}

#[tokio::test(start_paused = true)]
async fn test_open_rejected_when_transport_already_open() {
    let (session, handle) = session();
    handle.set_open(true);

    assert!(session.open().is_err());
    assert_eq!(handle.sink_installs(), 0);
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_open_failure_reports_error() {
    let (session, handle) = session();
    let events = record(&session);
    handle.fail_next_open("device busy");

    let err = session.open().unwrap_err();
    assert!(err.is_connection_error());
    assert_eq!(session.state(), SessionState::Closed);
    assert!(!handle.has_sink());
    assert_eq!(names(&events), vec!["connection:error"]);

    session.open().unwrap();
    assert_eq!(session.state(), SessionState::Open);
}

#[tokio::test(start_paused = true)]
async fn test_inbound_lines_become_raw_events() {
    let (session, handle) = session();
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = lines.clone();
    session.events().subscribe(EventFilter::All, move |event| {
        if let SessionEvent::Raw { line } = event {
            sink.lock().unwrap().push(line.clone());
        }
    });
    session.open().unwrap();

    handle.inject("ok\n");
    settle().await;
    assert_eq!(*lines.lock().unwrap(), vec!["ok"]);

    handle.inject("\r\n  \nGrbl 1.1h");
    handle.inject(" ['$' for help]   \r\n<Idle");
    settle().await;
    assert_eq!(
        *lines.lock().unwrap(),
        vec!["ok", "Grbl 1.1h ['$' for help]"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_query_timer_polls_while_open() {
    let (session, handle) = session();
    session.open().unwrap();

    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(status_queries(&handle), 3);
    assert!(session.is_polling());
}

#[tokio::test(start_paused = true)]
async fn test_query_timer_stops_when_transport_closes() {
    let (session, handle) = session();
    session.open().unwrap();

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(status_queries(&handle), 2);

    handle.set_open(false);
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(status_queries(&handle), 2);
    assert!(!session.is_polling());
    assert_eq!(session.state(), SessionState::Open);
}

#[tokio::test(start_paused = true)]
async fn test_destroy_clears_everything() {
    let (session, handle) = session();
    let events = record(&session);
    session.open().unwrap();

    session.update_status(MachineStatus::with_state(MachineState::Idle));
    session.send_command("G0 X1").unwrap();
    session.set_ready_to_start(true);

    let err = session.destroy().unwrap_err();
    assert_eq!(
        err,
        SessionError::StillOpen {
            ident: "/dev/ttyLOOP0".to_string()
        }
    );
    assert_eq!(session.state(), SessionState::Open);

    handle.set_open(false);
    session.destroy().unwrap();

    assert_eq!(session.state(), SessionState::Destroyed);
    assert_eq!(session.status().state, MachineState::Unknown);
    assert!(session.waiting_queue().is_empty());
    assert!(!session.is_ready_to_start());
    assert!(!session.has_query_timer());
    assert!(!handle.has_sink());

    let before = status_queries(&handle);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(status_queries(&handle), before);

    session.destroy().unwrap();
    assert_eq!(
        names(&events).iter().filter(|n| **n == "connection:close").count(),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_close_resets_and_destroys() {
    let (session, handle) = session();
    let events = record(&session);
    session.open().unwrap();
    handle.take_written();

    session.close().unwrap();

    assert_eq!(handle.written(), vec![vec![0x18]]);
    assert!(!handle.is_open());
    assert_eq!(session.state(), SessionState::Destroyed);
    assert!(!session.has_query_timer());
    assert!(events.lock().unwrap().iter().any(|e| matches!(
        e,
        SessionEvent::ConnectionChange {
            state: ConnectionState::Disconnected,
            ..
        }
    )));
    assert_eq!(names(&events).last(), Some(&"connection:close"));

    assert!(session.close().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_close_when_not_open_is_rejected() {
    let (session, _handle) = session();
    let err = session.close().unwrap_err();
    assert!(err.to_string().contains("not open"));
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_destroys_session() {
    let (session, handle) = session();
    let events = record(&session);
    session.open().unwrap();

    handle.disconnect();
    settle().await;

    assert_eq!(session.state(), SessionState::Destroyed);
    assert!(!session.has_query_timer());
    assert!(names(&events).ends_with(&["connection:change", "connection:close"]));
}

#[tokio::test(start_paused = true)]
async fn test_transport_error_closes_and_destroys() {
    let (session, handle) = session();
    let events = record(&session);
    session.open().unwrap();

    handle.fail("framing error");
    settle().await;

    assert!(!handle.is_open());
    assert_eq!(session.state(), SessionState::Destroyed);
    let events = events.lock().unwrap();
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::ConnectionError { error, .. } if error == "framing error"
    )));
}

#[tokio::test(start_paused = true)]
async fn test_command_channels() {
    let (session, handle) = session();
    assert!(session.send_command("$X").is_err());

    session.open().unwrap();
    handle.take_written();

    session.send_command("G0 X10\r\n").unwrap();
    session.send_realtime_command(b"!").unwrap();
    session
        .send_realtime(cncwire_communication::RealtimeCommand::CycleStart)
        .unwrap();

    assert_eq!(
        handle.written(),
        vec![b"G0 X10\n".to_vec(), b"!".to_vec(), b"~".to_vec()]
    );
    assert_eq!(session.waiting_queue(), vec!["G0 X10"]);
    assert_eq!(session.acknowledge().as_deref(), Some("G0 X10"));
    assert_eq!(session.acknowledge(), None);
}

#[tokio::test(start_paused = true)]
async fn test_multi_line_command_is_tracked_per_line() {
    let (session, handle) = session();
    session.open().unwrap();
    handle.take_written();

    session.send_command("G0 X1\r\n\nG1 Y2\n").unwrap();
    assert_eq!(
        handle.written(),
        vec![b"G0 X1\n".to_vec(), b"G1 Y2\n".to_vec()]
    );
    assert_eq!(session.waiting_queue(), vec!["G0 X1", "G1 Y2"]);

    session.acknowledge();
    assert_eq!(session.waiting_queue(), vec!["G1 Y2"]);
}

#[tokio::test(start_paused = true)]
async fn test_long_unterminated_input_is_discarded() {
    let (session, handle) = session();
    let events = record(&session);
    session.open().unwrap();

    handle.inject(vec![b'#'; 5000]);
    settle().await;
    handle.inject_line("ok");
    settle().await;

    let raws: Vec<String> = events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Raw { line } => Some(line.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(raws, vec!["ok"]);
}

#[tokio::test(start_paused = true)]
async fn test_no_reset_when_disabled() {
    let (transport, handle) = LoopbackTransport::new("sim");
    let session = ControllerSession::new(
        Box::new(transport),
        SessionConfig {
            query_interval: Duration::from_millis(250),
            reset_on_open: false,
        },
    );
    session.open().unwrap();
    assert!(handle.written().is_empty());

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(status_queries(&handle), 1);
}
