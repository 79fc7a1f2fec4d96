//! Integration tests for the DSP control engine
//!
//! These tests verify end-to-end behavior of the engine including:
//! - Duplicate suppression and FIFO order in the command queue
//! - Single in-flight command, released by reply, timeout or disconnect
//! - Routing of replies to the owning control point, with broadcast fallback
//! - Version banner discovery
//! - The async actor talking to the simulated DSP over a byte stream

use std::time::{Duration, Instant};

use dsp_engine::{
    ControlAction, ControlPointConfig, ControlPointId, ControlPointState, EngineConfig,
    EngineEvent, ProtocolEngine, QueuedCommand,
};
use dsp_protocol::{DeviceId, DeviceType, Group};

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;

    /// Control point addressed at unit 1A, input group
    pub fn input(label: &str, channel: &str) -> ControlPointConfig {
        ControlPointConfig {
            label: label.to_string(),
            device_type: DeviceType::ClearOne880,
            device_id: DeviceId::new('A').unwrap(),
            group: Group::Input,
            channel: channel.to_string(),
        }
    }

    /// Engine with `podium` on input 3 and `lectern` on input 4
    pub fn engine_with_timeout(command_timeout: Duration) -> ProtocolEngine {
        let mut engine = ProtocolEngine::with_config(EngineConfig {
            command_timeout,
            ..Default::default()
        });
        engine.add_control_point("podium", input("Podium", "3")).unwrap();
        engine.add_control_point("lectern", input("Lectern", "4")).unwrap();
        engine
    }

    pub fn engine() -> ProtocolEngine {
        engine_with_timeout(Duration::from_millis(2000))
    }

    pub const PODIUM: ControlPointId = ControlPointId(0);
    pub const LECTERN: ControlPointId = ControlPointId(1);

    /// Connected engine with the connect events cleared
    pub fn connected_engine() -> ProtocolEngine {
        let mut engine = engine();
        engine.set_connected(true);
        engine.drain_events();
        engine
    }

    /// Command texts written since the last call, without framing
    pub fn sent(engine: &mut ProtocolEngine) -> Vec<String> {
        engine
            .drain_outbox()
            .into_iter()
            .map(|framed| {
                framed
                    .trim_start_matches('#')
                    .trim_end_matches("\r\n")
                    .to_string()
            })
            .collect()
    }

    /// Deliver one line and dispatch it
    pub fn reply(engine: &mut ProtocolEngine, line: &str) {
        engine.queue_response(line.to_string());
        engine.process_responses();
    }

    pub fn state(engine: &ProtocolEngine, id: ControlPointId) -> ControlPointState {
        engine.control_point(id).unwrap().state()
    }

    pub fn queued_texts(engine: &ProtocolEngine) -> Vec<String> {
        engine.queue().iter().map(|c| c.text.clone()).collect()
    }

    /// Feedback events only
    pub fn feedback(events: &[EngineEvent]) -> Vec<EngineEvent> {
        events.iter().filter(|e| e.is_feedback()).cloned().collect()
    }
}

// ============================================================================
// Value Codec Tests
// ============================================================================

mod codec_tests {
    use dsp_protocol::{db_to_level, level_to_db, scale, ProtocolError};

    #[test]
    fn scale_rejects_empty_input_range() {
        assert!(matches!(
            scale(10.0, 5.0, 5.0, -65.0, 20.0),
            Err(ProtocolError::InvalidRange { .. })
        ));
    }

    #[test]
    fn level_endpoints_map_to_device_range() {
        assert_eq!(level_to_db(0), "-65.00 A");
        assert_eq!(level_to_db(65535), "20.00 A");
        assert_eq!(db_to_level("-65.00").unwrap(), 0);
        assert_eq!(db_to_level("20.00").unwrap(), 65535);
    }
}

// ============================================================================
// Command Queue Tests
// ============================================================================

mod queue_tests {
    use super::*;
    use dsp_engine::{CommandQueue, EnqueueOutcome};

    #[test]
    fn duplicate_text_suppressed_while_queued() {
        let mut queue = CommandQueue::new();

        assert_eq!(
            queue.enqueue(QueuedCommand::global("1A MUTE 3 I")),
            EnqueueOutcome::Queued
        );
        assert_eq!(
            queue.enqueue(QueuedCommand::owned("1A MUTE 3 I", helpers::PODIUM)),
            EnqueueOutcome::Duplicate
        );
        assert_eq!(queue.len(), 1);

        queue.try_dequeue().unwrap();
        assert_eq!(
            queue.enqueue(QueuedCommand::global("1A MUTE 3 I")),
            EnqueueOutcome::Queued
        );
    }

    #[test]
    fn distinct_texts_leave_in_order() {
        let mut queue = CommandQueue::new();
        for text in ["a", "b", "a", "c", "b"] {
            queue.enqueue(QueuedCommand::global(text));
        }

        let order: Vec<String> = std::iter::from_fn(|| queue.try_dequeue())
            .map(|c| c.text)
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn full_queue_drops_new_commands() {
        let mut queue = CommandQueue::with_capacity(2);
        queue.enqueue(QueuedCommand::global("a"));
        queue.enqueue(QueuedCommand::global("b"));

        assert_eq!(queue.enqueue(QueuedCommand::global("c")), EnqueueOutcome::Full);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn in_flight_text_may_be_queued_again() {
        let mut engine = helpers::connected_engine();

        engine.control(helpers::PODIUM, ControlAction::Poll).unwrap();
        assert_eq!(helpers::sent(&mut engine), vec!["1A MUTE 3 I"]);
        assert_eq!(helpers::queued_texts(&engine), vec!["1A GAIN 3 I"]);

        // The mute query is in flight, not queued; only the gain query is a duplicate
        engine.control(helpers::PODIUM, ControlAction::Poll).unwrap();
        assert_eq!(
            helpers::queued_texts(&engine),
            vec!["1A GAIN 3 I", "1A MUTE 3 I"]
        );
    }
}

// ============================================================================
// Control Point Tests
// ============================================================================

mod control_point_tests {
    use super::*;

    #[test]
    fn mute_on_then_off_are_both_queued() {
        let mut engine = helpers::engine();

        engine.control(helpers::PODIUM, ControlAction::MuteOn).unwrap();
        engine.control(helpers::PODIUM, ControlAction::MuteOff).unwrap();

        assert_eq!(
            helpers::queued_texts(&engine),
            vec!["1A MUTE 3 I 1", "1A MUTE 3 I 0"]
        );
    }

    #[test]
    fn set_volume_above_current_while_muted_unmutes() {
        let mut engine = helpers::engine();
        helpers::reply(&mut engine, "OK> #1A MUTE 3 I 1");
        assert!(helpers::state(&engine, helpers::PODIUM).muted);

        engine
            .control(helpers::PODIUM, ControlAction::SetVolume(65535))
            .unwrap();

        assert_eq!(
            helpers::queued_texts(&engine),
            vec!["1A MUTE 3 I 0", "1A GAIN 3 I 20.00 A"]
        );
    }

    #[test]
    fn set_volume_below_current_while_muted_stays_muted() {
        let mut engine = helpers::engine();
        helpers::reply(&mut engine, "OK> #1A MUTE 3 I 1");
        helpers::reply(&mut engine, "OK> #1A GAIN 3 I 0.00 A");

        engine
            .control(helpers::PODIUM, ControlAction::SetVolume(0))
            .unwrap();

        assert_eq!(helpers::queued_texts(&engine), vec!["1A GAIN 3 I -65.00 A"]);
    }

    #[test]
    fn volume_up_and_down_step_one_db() {
        let mut engine = helpers::engine();

        engine
            .control(helpers::PODIUM, ControlAction::VolumeUp { pressed: true })
            .unwrap();
        engine
            .control(helpers::LECTERN, ControlAction::VolumeDown { pressed: true })
            .unwrap();

        assert_eq!(
            helpers::queued_texts(&engine),
            vec!["1A GAIN 3 I 1.00 R", "1A MUTE 3 I 0", "1A GAIN 4 I -1.00 R"]
        );
    }

    #[test]
    fn volume_up_on_muted_point_leaves_mute_alone() {
        let mut engine = helpers::engine();
        helpers::reply(&mut engine, "OK> #1A MUTE 3 I 1");

        engine
            .control(helpers::PODIUM, ControlAction::VolumeUp { pressed: false })
            .unwrap();

        assert_eq!(helpers::queued_texts(&engine), vec!["1A GAIN 3 I 1.00 R"]);
    }

    #[test]
    fn find_by_level_key_or_full_key() {
        let engine = helpers::engine();

        assert_eq!(engine.find_control_point("podium"), Some(helpers::PODIUM));
        assert_eq!(
            engine.find_control_point("dsp1--lectern"),
            Some(helpers::LECTERN)
        );
        assert_eq!(engine.find_control_point("balcony"), None);
    }
}

// ============================================================================
// Response Dispatch Tests
// ============================================================================

mod dispatch_tests {
    use super::*;

    #[test]
    fn gain_reply_updates_only_the_addressed_point() {
        let mut engine = helpers::engine();

        helpers::reply(&mut engine, "OK> #1A GAIN 3 I 0.00 A");

        assert_eq!(helpers::state(&engine, helpers::PODIUM).level, 50115);
        assert_eq!(
            helpers::state(&engine, helpers::LECTERN),
            ControlPointState::default()
        );

        let events = engine.drain_events();
        assert_eq!(
            helpers::feedback(&events),
            vec![EngineEvent::LevelChanged {
                id: helpers::PODIUM,
                key: "dsp1--podium".to_string(),
                level: 50115,
            }]
        );
    }

    #[test]
    fn unmatched_reply_changes_nothing() {
        let mut engine = helpers::engine();

        helpers::reply(&mut engine, "OK> #1B MUTE 3 I 1");

        assert_eq!(
            helpers::state(&engine, helpers::PODIUM),
            ControlPointState::default()
        );
        assert_eq!(
            helpers::state(&engine, helpers::LECTERN),
            ControlPointState::default()
        );
        assert!(engine.devices().is_empty());
        assert!(helpers::feedback(&engine.drain_events()).is_empty());
    }

    #[test]
    fn owner_reply_completes_in_flight_and_sends_next() {
        let mut engine = helpers::connected_engine();
        engine.control(helpers::PODIUM, ControlAction::MuteOn).unwrap();
        engine.control(helpers::LECTERN, ControlAction::MuteOn).unwrap();
        assert_eq!(helpers::sent(&mut engine), vec!["1A MUTE 3 I 1"]);

        helpers::reply(&mut engine, "OK> #1A MUTE 3 I 1");

        assert!(helpers::state(&engine, helpers::PODIUM).muted);
        assert_eq!(helpers::sent(&mut engine), vec!["1A MUTE 4 I 1"]);
        assert_eq!(
            engine.in_flight(),
            Some(&QueuedCommand::owned("1A MUTE 4 I 1", helpers::LECTERN))
        );
    }

    #[test]
    fn stale_reply_falls_back_to_broadcast() {
        let mut engine = helpers::connected_engine();
        engine.control(helpers::PODIUM, ControlAction::MuteOn).unwrap();
        helpers::sent(&mut engine);

        helpers::reply(&mut engine, "OK> #1A MUTE 4 I 1");

        assert!(helpers::state(&engine, helpers::LECTERN).muted);
        assert!(!helpers::state(&engine, helpers::PODIUM).muted);
        assert!(engine.in_flight().is_none());
    }

    #[test]
    fn unstructured_lines_do_not_complete_the_command() {
        let mut engine = helpers::connected_engine();
        engine.control(helpers::PODIUM, ControlAction::MuteOn).unwrap();

        helpers::reply(&mut engine, "ClearOne 880 ready");

        assert!(engine.in_flight().is_some());
    }

    #[test]
    fn bare_prompt_reply_completes_the_command() {
        let mut engine = helpers::connected_engine();
        engine.control(helpers::PODIUM, ControlAction::MuteOn).unwrap();

        helpers::reply(&mut engine, "> #1A MUTE 3 I 1");

        assert!(engine.in_flight().is_none());
        assert!(!helpers::state(&engine, helpers::PODIUM).muted);
    }

    #[test]
    fn toggle_feedback_is_claimed_but_ignored() {
        let mut engine = helpers::connected_engine();
        engine.control(helpers::PODIUM, ControlAction::MuteToggle).unwrap();

        helpers::reply(&mut engine, "OK> #1A MUTE 3 I 2");

        assert!(engine.in_flight().is_none());
        assert_eq!(
            helpers::state(&engine, helpers::PODIUM),
            ControlPointState::default()
        );
        assert!(helpers::feedback(&engine.drain_events()).is_empty());
    }

    #[test]
    fn malformed_gain_is_claimed_without_change() {
        let mut engine = helpers::engine();

        helpers::reply(&mut engine, "OK> #1A GAIN 3 I loud A");
        helpers::reply(&mut engine, "OK> #1A GAIN 3 I ");

        assert_eq!(helpers::state(&engine, helpers::PODIUM).level, 0);
        assert!(helpers::feedback(&engine.drain_events()).is_empty());
    }

    #[test]
    fn repeated_feedback_notifies_once() {
        let mut engine = helpers::engine();

        helpers::reply(&mut engine, "OK> #1A MUTE 3 I 1");
        helpers::reply(&mut engine, "OK> #1A MUTE 3 I 1");

        assert_eq!(helpers::feedback(&engine.drain_events()).len(), 1);
    }

    #[test]
    fn no_send_while_replies_wait_in_the_inbox() {
        let mut engine = helpers::connected_engine();

        engine.queue_response("OK> #1A MUTE 3 I 1".to_string());
        engine.control(helpers::PODIUM, ControlAction::MuteOff).unwrap();
        assert!(helpers::sent(&mut engine).is_empty());

        engine.process_responses();
        assert_eq!(helpers::sent(&mut engine), vec!["1A MUTE 3 I 0"]);
    }
}

// ============================================================================
// Timeout And Link Tests
// ============================================================================

mod timeout_tests {
    use super::*;

    #[test]
    fn timeout_releases_slot_and_sends_next() {
        let mut engine = helpers::connected_engine();
        engine.control(helpers::PODIUM, ControlAction::Poll).unwrap();
        assert_eq!(helpers::sent(&mut engine), vec!["1A MUTE 3 I"]);

        assert!(!engine.poll_timeout(Instant::now()));
        assert!(helpers::sent(&mut engine).is_empty());

        assert!(engine.poll_timeout(Instant::now() + Duration::from_millis(2001)));
        assert_eq!(helpers::sent(&mut engine), vec!["1A GAIN 3 I"]);
        assert!(engine.drain_events().contains(&EngineEvent::CommandTimedOut {
            text: "1A MUTE 3 I".to_string(),
        }));
    }

    #[test]
    fn timed_out_command_is_not_retried() {
        let mut engine = helpers::connected_engine();
        engine.control(helpers::PODIUM, ControlAction::MuteOn).unwrap();
        helpers::sent(&mut engine);

        assert!(engine.poll_timeout(Instant::now() + Duration::from_secs(5)));

        assert!(engine.in_flight().is_none());
        assert!(engine.queue().is_empty());
        assert!(helpers::sent(&mut engine).is_empty());
    }

    #[test]
    fn configured_timeout_sets_the_deadline() {
        let mut engine = helpers::engine_with_timeout(Duration::from_millis(50));
        engine.set_connected(true);
        let before = Instant::now();
        engine.control(helpers::PODIUM, ControlAction::MuteOn).unwrap();

        let deadline = engine.deadline().unwrap();
        assert!(deadline >= before + Duration::from_millis(50));
        assert!(deadline <= Instant::now() + Duration::from_millis(50));
    }

    #[test]
    fn disconnect_keeps_queue_and_resumes_on_reconnect() {
        let mut engine = helpers::engine();
        engine.control(helpers::PODIUM, ControlAction::Poll).unwrap();
        assert!(helpers::sent(&mut engine).is_empty());
        assert_eq!(engine.queue().len(), 2);

        engine.set_connected(true);
        assert_eq!(helpers::sent(&mut engine), vec!["1A MUTE 3 I"]);

        engine.set_connected(false);
        assert!(engine.in_flight().is_none());
        engine.control(helpers::LECTERN, ControlAction::MuteOn).unwrap();
        assert!(helpers::sent(&mut engine).is_empty());
        assert_eq!(engine.queue().len(), 2);

        engine.set_connected(true);
        assert_eq!(helpers::sent(&mut engine), vec!["1A GAIN 3 I"]);
    }

    #[test]
    fn raw_send_requires_connection() {
        let mut engine = helpers::engine();
        assert!(!engine.raw_send("1A MUTE 3 I"));

        engine.set_connected(true);
        assert!(engine.raw_send("1A MUTE 3 I"));
        assert_eq!(helpers::sent(&mut engine), vec!["1A MUTE 3 I"]);
        assert!(engine.in_flight().is_none());
    }
}

// ============================================================================
// Version Banner Tests
// ============================================================================

mod banner_tests {
    use super::*;

    #[test]
    fn poll_asks_for_versions_until_a_unit_is_known() {
        let mut engine = helpers::connected_engine();

        engine.poll_all();
        assert_eq!(helpers::sent(&mut engine), vec!["** VER"]);
        assert_eq!(
            helpers::queued_texts(&engine),
            vec!["1A MUTE 3 I", "1A GAIN 3 I", "1A MUTE 4 I", "1A GAIN 4 I"]
        );

        helpers::reply(&mut engine, "OK> #1A VER 123 v2.5.1");
        let record = engine.devices().get("1A").unwrap();
        assert_eq!(record.device_type, DeviceType::ClearOne880);
        assert_eq!(record.device_id, DeviceId::new('A').unwrap());
        assert_eq!(record.version, "v2.5.1");

        // Drain the poll replies, then poll again
        for line in [
            "OK> #1A MUTE 3 I 0",
            "OK> #1A GAIN 3 I 0.00 A",
            "OK> #1A MUTE 4 I 0",
            "OK> #1A GAIN 4 I 0.00 A",
        ] {
            helpers::reply(&mut engine, line);
        }
        helpers::sent(&mut engine);

        engine.poll_all();
        assert_eq!(helpers::sent(&mut engine), vec!["1A MUTE 3 I"]);
    }

    #[test]
    fn newer_banner_overwrites_record() {
        let mut engine = helpers::engine();

        helpers::reply(&mut engine, "OK> #1A VER 123 v2.5.1");
        helpers::reply(&mut engine, "OK> #1A VER 123 v2.6.0");

        assert_eq!(engine.devices().len(), 1);
        assert_eq!(engine.devices().get("1A").unwrap().version, "v2.6.0");
    }

    #[test]
    fn malformed_banner_is_claimed_without_record() {
        let mut engine = helpers::connected_engine();
        engine.control(helpers::PODIUM, ControlAction::MuteOn).unwrap();

        helpers::reply(&mut engine, "OK> #ZZ VER 1.0");

        assert!(engine.devices().is_empty());
        assert!(engine.in_flight().is_none());
    }

    #[test]
    fn device_report_lists_units() {
        let mut engine = helpers::engine();
        helpers::reply(&mut engine, "OK> #1A VER 123 v2.5.1");

        let report = engine.devices().report();
        assert!(report.contains("Device: 1A"));
        assert!(report.contains("v2.5.1"));
    }
}

// ============================================================================
// End-to-End Tests (actor, line transport and simulated DSP)
// ============================================================================

mod end_to_end_tests {
    use super::*;
    use dsp_engine::{link, spawn_engine, EngineHandle, LineConnection};
    use dsp_sim::{run_virtual_dsp_task, VirtualDsp, VirtualDspCommand};
    use tokio::sync::{broadcast, mpsc};
    use tokio::task::JoinHandle;

    struct Harness {
        handle: EngineHandle,
        events: broadcast::Receiver<EngineEvent>,
        sim: mpsc::Sender<VirtualDspCommand>,
        engine_task: JoinHandle<()>,
        sim_task: JoinHandle<std::io::Result<VirtualDsp>>,
    }

    fn rack() -> VirtualDsp {
        VirtualDsp::new("rack").with_unit(
            DeviceType::ClearOne880,
            DeviceId::new('A').unwrap(),
            "v2.5.1",
        )
    }

    fn start(dsp: VirtualDsp, command_timeout: Duration) -> Harness {
        let (engine_end, mut transport_end) = link();
        let (handle, engine_task) =
            spawn_engine(helpers::engine_with_timeout(command_timeout), engine_end);
        let events = handle.subscribe();

        let (client, server) = tokio::io::duplex(1024);
        tokio::spawn(async move {
            LineConnection::new("sim".to_string(), client)
                .run(&mut transport_end)
                .await
        });

        let (sim, sim_rx) = mpsc::channel(8);
        let (sim_events, _) = broadcast::channel(64);
        let sim_task = tokio::spawn(run_virtual_dsp_task(server, dsp, sim_rx, sim_events));

        Harness {
            handle,
            events,
            sim,
            engine_task,
            sim_task,
        }
    }

    async fn wait_for<F>(events: &mut broadcast::Receiver<EngineEvent>, mut pred: F) -> EngineEvent
    where
        F: FnMut(&EngineEvent) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match events.recv().await {
                    Ok(event) if pred(&event) => return event,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(e) => panic!("event stream ended: {}", e),
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    async fn stop(harness: Harness) -> VirtualDsp {
        harness.handle.shutdown().unwrap();
        harness.engine_task.await.unwrap();
        harness.sim_task.await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn mute_round_trip() {
        let mut h = start(rack(), Duration::from_millis(500));
        let podium = h.handle.control_point("podium").await.unwrap();

        podium.mute_on().unwrap();
        wait_for(&mut h.events, |e| {
            matches!(e, EngineEvent::MuteChanged { muted: true, .. })
        })
        .await;

        assert!(podium.state().await.unwrap().muted);
        let status = h.handle.status().await.unwrap();
        assert!(status.connected);
        assert_eq!(status.in_flight, None);
        assert_eq!(status.queued, 0);

        let dsp = stop(h).await;
        assert_eq!(dsp.received_commands(), ["1A MUTE 3 I 1"]);
    }

    #[tokio::test]
    async fn set_volume_reports_level() {
        let mut h = start(rack(), Duration::from_millis(500));
        let lectern = h.handle.control_point("lectern").await.unwrap();

        lectern.set_volume(65535).unwrap();
        let event = wait_for(&mut h.events, |e| {
            matches!(e, EngineEvent::LevelChanged { .. })
        })
        .await;

        assert_eq!(
            event,
            EngineEvent::LevelChanged {
                id: helpers::LECTERN,
                key: "dsp1--lectern".to_string(),
                level: 65535,
            }
        );
        stop(h).await;
    }

    #[tokio::test]
    async fn poll_discovers_units_and_levels() {
        let mut h = start(rack(), Duration::from_millis(500));

        h.handle.poll().unwrap();
        wait_for(&mut h.events, |e| {
            matches!(e, EngineEvent::DeviceInfo { key, .. } if key == "1A")
        })
        .await;
        wait_for(&mut h.events, |e| {
            matches!(e, EngineEvent::LevelChanged { id, level: 50115, .. } if *id == helpers::LECTERN)
        })
        .await;

        let devices = h.handle.devices().await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].1.version, "v2.5.1");
        assert!(h.handle.device_report().await.unwrap().contains("Device: 1A"));

        let dsp = stop(h).await;
        assert_eq!(dsp.received_commands()[0], "** VER");
    }

    #[tokio::test]
    async fn silent_device_times_out_and_unsolicited_feedback_still_lands() {
        let mut dsp = rack();
        dsp.set_silent(true);
        let mut h = start(dsp, Duration::from_millis(50));
        let podium = h.handle.control_point("podium").await.unwrap();

        podium.mute_on().unwrap();
        wait_for(&mut h.events, |e| {
            matches!(e, EngineEvent::CommandTimedOut { text } if text == "1A MUTE 3 I 1")
        })
        .await;
        assert!(!podium.state().await.unwrap().muted);

        h.sim
            .send(VirtualDspCommand::InjectLine("OK> #1A MUTE 3 I 1".to_string()))
            .await
            .unwrap();
        wait_for(&mut h.events, |e| {
            matches!(e, EngineEvent::MuteChanged { muted: true, .. })
        })
        .await;

        stop(h).await;
    }

    #[tokio::test]
    async fn device_errors_are_reported() {
        let mut h = start(rack(), Duration::from_millis(500));

        h.sim
            .send(VirtualDspCommand::InjectLine("ERROR: bad command".to_string()))
            .await
            .unwrap();
        let event = wait_for(&mut h.events, |e| {
            matches!(e, EngineEvent::DeviceError { .. })
        })
        .await;

        assert_eq!(
            event,
            EngineEvent::DeviceError {
                line: "ERROR: bad command".to_string()
            }
        );
        stop(h).await;
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

mod proptest_tests {
    use super::*;
    use dsp_engine::CommandQueue;
    use dsp_protocol::{db_to_level, level_to_db};
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Op {
        Enqueue(u8),
        Reply,
        Timeout,
        Disconnect,
        Connect,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            4 => (0u8..6).prop_map(Op::Enqueue),
            3 => Just(Op::Reply),
            1 => Just(Op::Timeout),
            1 => Just(Op::Disconnect),
            1 => Just(Op::Connect),
        ]
    }

    proptest! {
        #[test]
        fn level_round_trip_is_close(level in 0u16..=u16::MAX) {
            let formatted = level_to_db(level);
            let field = formatted.split(' ').next().unwrap();
            let back = db_to_level(field).unwrap();

            prop_assert!((i32::from(back) - i32::from(level)).abs() <= 5);
        }

        #[test]
        fn queue_keeps_first_occurrence_order(texts in prop::collection::vec("[a-e]", 0..30)) {
            let mut queue = CommandQueue::new();
            for text in &texts {
                queue.enqueue(QueuedCommand::global(text.as_str()));
            }

            let mut expected: Vec<String> = Vec::new();
            for text in texts {
                if !expected.contains(&text) {
                    expected.push(text);
                }
            }
            let actual: Vec<String> = queue.iter().map(|c| c.text.clone()).collect();
            prop_assert_eq!(actual, expected);
        }

        #[test]
        fn at_most_one_command_in_flight(ops in prop::collection::vec(op(), 1..60)) {
            let mut engine = ProtocolEngine::new();
            engine.set_connected(true);

            for op in ops {
                let was_busy = engine.in_flight().is_some();
                let is_enqueue = matches!(op, Op::Enqueue(_));

                match op {
                    Op::Enqueue(n) => {
                        engine.enqueue(QueuedCommand::global(format!("1A MUTE {} I", n)));
                    }
                    Op::Reply => {
                        engine.queue_response("OK> #1A MUTE 9 I 1".to_string());
                        engine.process_responses();
                    }
                    Op::Timeout => {
                        engine.poll_timeout(Instant::now() + Duration::from_secs(5));
                    }
                    Op::Disconnect => engine.set_connected(false),
                    Op::Connect => engine.set_connected(true),
                }

                let sent = engine.drain_outbox().len();
                prop_assert!(sent <= 1);
                if was_busy && is_enqueue {
                    prop_assert_eq!(sent, 0);
                }
                if engine.is_connected() {
                    prop_assert!(engine.queue().is_empty() || engine.in_flight().is_some());
                } else {
                    prop_assert_eq!(sent, 0);
                    prop_assert!(engine.in_flight().is_none());
                }
            }
        }
    }
}
