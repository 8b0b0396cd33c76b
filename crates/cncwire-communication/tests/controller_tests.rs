//! End-to-end controller tests: loopback transport, dialect parser, queue

use cncwire_communication::{Controller, Dialect, LoopbackHandle, LoopbackTransport, SessionConfig};
use cncwire_core::{
    EventCategory, EventFilter, MachineState, ParsedLine, Position, ResultKind, SessionEvent,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn controller(dialect: Dialect) -> (Controller, LoopbackHandle) {
    let (transport, handle) = LoopbackTransport::new("/dev/ttyACM0");
    (
        Controller::new(dialect, Box::new(transport), SessionConfig::default()),
        handle,
    )
}

/// Buffered commands written so far, without realtime bytes
fn sent_commands(handle: &LoopbackHandle) -> Vec<String> {
    handle
        .written()
        .iter()
        .filter(|w| w.ends_with(b"\n"))
        .map(|w| String::from_utf8_lossy(w).trim_end().to_string())
        .collect()
}

async fn feed(handle: &LoopbackHandle, line: &str) {
    handle.inject_line(line);
    tokio::time::sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn test_streams_one_command_per_ack() {
    let (controller, handle) = controller(Dialect::Grbl);
    controller.open().unwrap();
    feed(&handle, "Grbl 1.1h ['$' for help]").await;

    controller.load(["G21", "", "G0 X10", "  G1 Y5 F100  "]);
    controller.play(false);
    assert_eq!(sent_commands(&handle), vec!["G21"]);

    feed(&handle, "ok").await;
    assert_eq!(sent_commands(&handle), vec!["G21", "G0 X10"]);

    feed(&handle, "ok").await;
    feed(&handle, "ok").await;
    assert_eq!(sent_commands(&handle), vec!["G21", "G0 X10", "G1 Y5 F100"]);
    assert_eq!(controller.queue_progress(), (3, 3));
    assert!(controller.session().waiting_queue().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_play_waits_for_banner() {
    let (controller, handle) = controller(Dialect::Grbl);
    let progress = Arc::new(Mutex::new(Vec::new()));
    let sink = progress.clone();
    controller.events().subscribe(
        EventFilter::Categories(vec![EventCategory::Queue]),
        move |event| {
            if let SessionEvent::QueueProgress { executed, total } = event {
                sink.lock().unwrap().push((*executed, *total));
            }
        },
    );

    controller.open().unwrap();
    controller.load(["$H", "G0 X0"]);
    controller.play(false);
    assert!(sent_commands(&handle).is_empty());

    feed(&handle, "Grbl 1.1h ['$' for help]").await;
    assert_eq!(sent_commands(&handle), vec!["$H"]);
    assert_eq!(*progress.lock().unwrap(), vec![(1, 2)]);
}

#[tokio::test(start_paused = true)]
async fn test_error_pauses_queue() {
    let (controller, handle) = controller(Dialect::Grbl);
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = lines.clone();
    controller.events().subscribe(
        EventFilter::Categories(vec![EventCategory::Protocol]),
        move |event| {
            if let SessionEvent::Line(result) = event {
                sink.lock().unwrap().push(result.clone());
            }
        },
    );

    controller.open().unwrap();
    feed(&handle, "Grbl 1.1h ['$' for help]").await;
    controller.load(["G1 X1", "G1 X2"]);
    controller.play(false);

    feed(&handle, "error:22").await;
    assert!(controller.is_queue_stopped());
    assert_eq!(sent_commands(&handle), vec!["G1 X1"]);

    let last = lines.lock().unwrap().last().cloned().unwrap();
    assert_eq!(last.kind(), ResultKind::Error);
    assert_eq!(last.raw, "error:22");
    match last.line {
        ParsedLine::Error { code, .. } => assert_eq!(code, Some(22)),
        other => panic!("expected error, got {:?}", other),
    }

    controller.play(false);
    assert_eq!(sent_commands(&handle), vec!["G1 X1", "G1 X2"]);
}

#[tokio::test(start_paused = true)]
async fn test_alarm_pauses_queue() {
    let (controller, handle) = controller(Dialect::Grbl);
    controller.open().unwrap();
    feed(&handle, "Grbl 1.1h ['$' for help]").await;
    controller.load(["G0 X100"]);
    controller.play(false);

    feed(&handle, "ALARM:1").await;
    assert!(controller.is_queue_stopped());
}

#[tokio::test(start_paused = true)]
async fn test_loop_replays_program() {
    let (controller, handle) = controller(Dialect::Grbl);
    controller.open().unwrap();
    feed(&handle, "Grbl 1.1h ['$' for help]").await;
    controller.load(["M3", "M5"]);

    controller.play(true);
    feed(&handle, "ok").await;
    feed(&handle, "ok").await;
    assert_eq!(sent_commands(&handle), vec!["M3", "M5", "M3"]);

    controller.stop();
    feed(&handle, "ok").await;
    assert_eq!(sent_commands(&handle).len(), 3);

    controller.replay(false);
    assert_eq!(sent_commands(&handle), vec!["M3", "M5", "M3", "M3"]);
}

#[tokio::test(start_paused = true)]
async fn test_status_reports_update_machine_status() {
    let (controller, handle) = controller(Dialect::Grbl);
    controller.open().unwrap();

    feed(&handle, "<Idle|MPos:1.000,2.000,3.000|FS:0,0|WCO:1.000,1.000,1.000>").await;
    let status = controller.status();
    assert_eq!(status.state, MachineState::Idle);
    assert_eq!(status.work_position, Some(Position::new(0.0, 1.0, 2.0)));

    feed(&handle, "<Run|MPos:2.000,2.000,3.000|FS:100,0>").await;
    let status = controller.status();
    assert_eq!(status.state, MachineState::Run);
    assert_eq!(status.work_offset, Some(Position::new(1.0, 1.0, 1.0)));
    assert_eq!(status.work_position, Some(Position::new(1.0, 1.0, 2.0)));

    feed(&handle, "<Run|MPos:bad,2.000,3.000>").await;
    assert_eq!(controller.status().state, MachineState::Run);
}

#[tokio::test(start_paused = true)]
async fn test_cirqoid_banner_and_temperature_ack() {
    let (controller, handle) = controller(Dialect::Cirqoid);
    controller.open().unwrap();

    feed(
        &handle,
        "FIRMWARE_NAME:Cirqoid PROTOCOL_VERSION:1.0 MACHINE_TYPE:Cartesian EXTRUDER_COUNT:1 UUID:abc-123",
    )
    .await;
    assert!(controller.session().is_ready_to_start());

    controller.load(["M105", "G28"]);
    controller.play(false);
    feed(&handle, "ok T:21.0 /0.0 B:20.5 /0.0").await;
    assert_eq!(sent_commands(&handle), vec!["M105", "G28"]);

    feed(&handle, "X:10.00 Y:5.00 Z:1.00 E:0.00 Count X:800 Y:400 Z:80").await;
    assert_eq!(
        controller.status().machine_position,
        Some(Position::new(10.0, 5.0, 1.0))
    );
}

#[tokio::test(start_paused = true)]
async fn test_connection_record_follows_lifecycle() {
    let (controller, handle) = controller(Dialect::Grbl);
    assert!(!controller.connection().is_connected());

    controller.open().unwrap();
    assert!(controller.connection().is_connected());
    assert_eq!(controller.connection().ident, "/dev/ttyACM0");

    handle.fail("input/output error");
    tokio::time::sleep(Duration::from_millis(1)).await;

    let connection = controller.connection();
    assert!(!connection.is_connected());
    assert_eq!(connection.error.as_deref(), Some("input/output error"));
}

#[tokio::test(start_paused = true)]
async fn test_realtime_helpers_and_reset() {
    let (controller, handle) = controller(Dialect::Grbl);
    controller.open().unwrap();
    feed(&handle, "Grbl 1.1h ['$' for help]").await;
    handle.take_written();

    controller.feed_hold().unwrap();
    controller.cycle_start().unwrap();
    controller.reset().unwrap();

    assert_eq!(handle.written(), vec![b"!".to_vec(), b"~".to_vec(), vec![0x18]]);
    assert!(!controller.session().is_ready_to_start());
    assert!(controller.is_queue_stopped());
}

#[tokio::test(start_paused = true)]
async fn test_close_stops_queue() {
    let (controller, handle) = controller(Dialect::Grbl);
    controller.open().unwrap();
    feed(&handle, "Grbl 1.1h ['$' for help]").await;
    controller.load(["G0 X1", "G0 X2"]);
    controller.play(false);

    controller.close().unwrap();
    assert!(controller.is_queue_stopped());
    assert_eq!(controller.queue_progress(), (0, 2));
    assert!(!controller.connection().is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_reset_banner_mid_program_stops_queue() {
    let (controller, handle) = controller(Dialect::Grbl);
    controller.open().unwrap();
    feed(&handle, "Grbl 1.1h ['$' for help]").await;

    controller.load(["G1 X1", "G1 X2", "G1 X3"]);
    controller.play(false);
    feed(&handle, "ok").await;
    assert_eq!(sent_commands(&handle), vec!["G1 X1", "G1 X2"]);

    feed(&handle, "Grbl 1.1h ['$' for help]").await;
    assert_eq!(sent_commands(&handle), vec!["G1 X1", "G1 X2"]);
    assert!(controller.is_queue_stopped());
    assert_eq!(controller.queue_progress(), (0, 3));
    assert!(controller.session().waiting_queue().is_empty());
    assert!(controller.session().is_ready_to_start());

    controller.play(false);
    assert_eq!(sent_commands(&handle), vec!["G1 X1", "G1 X2", "G1 X1"]);
}

#[tokio::test(start_paused = true)]
async fn test_firmware_report_mid_program_keeps_streaming() {
    let (controller, handle) = controller(Dialect::Cirqoid);
    controller.open().unwrap();
    feed(&handle, "start").await;

    controller.load(["M115", "G28"]);
    controller.play(false);
    feed(
        &handle,
        "FIRMWARE_NAME:Cirqoid PROTOCOL_VERSION:1.0 MACHINE_TYPE:Cartesian EXTRUDER_COUNT:1 UUID:abc-123",
    )
    .await;
    assert_eq!(sent_commands(&handle), vec!["M115"]);

    feed(&handle, "ok").await;
    assert_eq!(sent_commands(&handle), vec!["M115", "G28"]);
    assert!(!controller.is_queue_stopped());
}
