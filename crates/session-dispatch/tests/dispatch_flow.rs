mod support;

use std::collections::HashMap;

use serde_json::json;
use session_dispatch::{
    AdmissionDecision, Capabilities, Command, CommandError, ControllerInfo, CustomCommand,
    Dispatched, DropReason, OutboundMessage, PlayerAction, PlayerCommand, PlayerCommands, PreCheck,
    ResultCode, SessionBuilder, SessionCommandCode, SessionCommands, SessionPolicy,
    SessionRequest, SessionResult, StaticPolicy, SurfaceId,
};
use support::{connect, identity, next_message, next_result, play, results, seek, RecordingPlayer};

fn play_and_seek() -> Capabilities {
    Capabilities::new(
        SessionCommands::empty(),
        PlayerCommands::EMPTY
            .with(PlayerCommand::PlayPause)
            .with(PlayerCommand::SeekInCurrentItem),
    )
}

#[tokio::test]
async fn granted_command_succeeds_and_ungranted_is_denied() {
    let (player, tape) = RecordingPlayer::new();
    let session = SessionBuilder::new(player)
        .policy(StaticPolicy::new(play_and_seek()))
        .spawn();
    let a = identity(1);
    let (mut rx, granted) = connect(&session, a.clone()).await;
    assert_eq!(granted, play_and_seek());

    assert_eq!(session.dispatch(&a, 10, play()), Dispatched::Accepted);
    let (seq, result) = next_result(&mut rx).await;
    assert_eq!((seq, result.code), (10, ResultCode::Success));

    let volume = Command::Player(PlayerAction::SetVolume { volume: 0.3 });
    assert_eq!(session.dispatch(&a, 11, volume), Dispatched::Accepted);
    let (seq, result) = next_result(&mut rx).await;
    assert_eq!((seq, result.code), (11, ResultCode::PermissionDenied));

    assert_eq!(tape.applied(), vec![(1, PlayerAction::Play)]);
    session.release().await;
}

#[tokio::test]
async fn back_to_back_seeks_apply_in_order() {
    let (player, tape) = RecordingPlayer::new();
    let session = SessionBuilder::new(player)
        .policy(StaticPolicy::new(play_and_seek()))
        .spawn();
    let a = identity(1);
    let (mut rx, _) = connect(&session, a.clone()).await;

    let gate = tape.hold("seek_to");
    session.dispatch(&a, 1, seek(10_000));
    session.dispatch(&a, 2, seek(20_000));
    tape.wait_applied(2).await;
    assert_eq!(
        tape.applied_by(1),
        vec![
            PlayerAction::SeekTo { position_ms: 10_000 },
            PlayerAction::SeekTo { position_ms: 20_000 },
        ]
    );

    gate.send(Ok(SessionResult::success())).unwrap();
    let delivered = results(&mut rx, 2).await;
    assert_eq!(delivered[&1].code, ResultCode::Success);
    assert_eq!(delivered[&2].code, ResultCode::Success);
    session.release().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn each_controller_keeps_its_own_order_under_concurrency() {
    let (player, tape) = RecordingPlayer::new();
    let session = SessionBuilder::new(player)
        .policy(StaticPolicy::new(play_and_seek()))
        .spawn();
    let mut inboxes = Vec::new();
    for endpoint in 1..=4 {
        let (rx, _) = connect(&session, identity(endpoint)).await;
        inboxes.push(rx);
    }

    let mut senders = Vec::new();
    for endpoint in 1..=4u64 {
        let session = session.clone();
        senders.push(tokio::spawn(async move {
            let who = identity(endpoint);
            for n in 0..50i64 {
                assert_eq!(
                    session.dispatch(&who, n as u64, seek(n)),
                    Dispatched::Accepted
                );
                if n % 7 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        }));
    }
    for sender in senders {
        sender.await.unwrap();
    }
    for rx in inboxes.iter_mut() {
        let delivered = results(rx, 50).await;
        assert!(delivered.values().all(|r| r.code == ResultCode::Success));
    }

    for endpoint in 1..=4 {
        let positions: Vec<i64> = tape
            .applied_by(endpoint)
            .into_iter()
            .map(|action| match action {
                PlayerAction::SeekTo { position_ms } => position_ms,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(positions, (0..50).collect::<Vec<_>>());
    }
    session.release().await;
}

#[tokio::test]
async fn outbound_sequence_numbers_strictly_increase() {
    let (player, _tape) = RecordingPlayer::new();
    let session = SessionBuilder::new(player)
        .policy(StaticPolicy::new(play_and_seek()))
        .spawn();
    let a = identity(1);
    let (mut rx, _) = connect(&session, a.clone()).await;

    for n in 0..5 {
        session.dispatch(&a, 100 + n, seek(n as i64));
    }
    session.notify_player_state_changed();
    session
        .set_available_commands(&a, Capabilities::empty())
        .unwrap();
    session.dispatch(&a, 200, play());

    let mut last = 0;
    for _ in 0..8 {
        let message = next_message(&mut rx).await;
        assert!(message.seq() > last, "{message:?} not after {last}");
        last = message.seq();
    }
    session.release().await;
}

#[tokio::test]
async fn first_push_is_always_the_announcement() {
    let (player, _tape) = RecordingPlayer::new();
    let session = SessionBuilder::new(player)
        .policy(StaticPolicy::new(play_and_seek()))
        .spawn();
    let a = identity(1);
    let mut rx = support::request_connect(&session, a.clone());
    // Fire until the controller is admitted; earlier calls are dropped.
    let mut seq = 0;
    loop {
        seq += 1;
        match session.dispatch(&a, seq, play()) {
            Dispatched::Accepted => break,
            Dispatched::Dropped(DropReason::UnknownController) => tokio::task::yield_now().await,
            other => panic!("unexpected {other:?}"),
        }
    }
    match next_message(&mut rx).await {
        OutboundMessage::Connected { seq, .. } => assert_eq!(seq, 0),
        other => panic!("result arrived before announcement: {other:?}"),
    }
    let (request_seq, result) = next_result(&mut rx).await;
    assert_eq!(request_seq, seq);
    assert!(result.code.is_success());
    session.release().await;
}

#[tokio::test]
async fn revocation_does_not_touch_already_queued_commands() {
    let (player, tape) = RecordingPlayer::new();
    let session = SessionBuilder::new(player)
        .policy(StaticPolicy::new(play_and_seek()))
        .spawn();
    let a = identity(1);
    let (mut rx, _) = connect(&session, a.clone()).await;

    session.dispatch(&a, 1, seek(1));
    session.dispatch(&a, 2, seek(2));
    session.dispatch(&a, 3, seek(3));
    tape.wait_applied(1).await;
    session
        .set_available_commands(&a, Capabilities::empty())
        .unwrap();
    session.dispatch(&a, 4, seek(4));

    let mut codes = HashMap::new();
    let mut saw_change = false;
    while codes.len() < 4 {
        match next_message(&mut rx).await {
            OutboundMessage::Result {
                request_seq,
                result,
                ..
            } => {
                codes.insert(request_seq, result.code);
            }
            OutboundMessage::AvailableCommandsChanged { capabilities, .. } => {
                assert_eq!(capabilities, Capabilities::empty());
                saw_change = true;
            }
            other => panic!("unexpected {other:?}"),
        }
    }
    assert!(saw_change);
    assert_eq!(codes[&1], ResultCode::Success);
    assert_eq!(codes[&2], ResultCode::Success);
    assert_eq!(codes[&3], ResultCode::Success);
    assert_eq!(codes[&4], ResultCode::PermissionDenied);
    assert_eq!(tape.applied().len(), 3);
    session.release().await;
}

#[tokio::test]
async fn cancelled_deferred_command_is_skipped() {
    let (player, tape) = RecordingPlayer::new();
    let session = SessionBuilder::new(player)
        .policy(StaticPolicy::new(play_and_seek()))
        .spawn();
    let a = identity(1);
    let (mut rx, _) = connect(&session, a.clone()).await;

    let _gate = tape.hold("play");
    session.dispatch(&a, 5, play());
    tape.wait_applied(1).await;
    assert!(session.cancel_command(&a, 5));

    let (seq, result) = next_result(&mut rx).await;
    assert_eq!((seq, result.code), (5, ResultCode::Skipped));
    assert!(!session.cancel_command(&a, 5));
    assert!(!session.cancel_command(&a, 999));
    assert!(!session.cancel_command(&identity(2), 5));
    session.release().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_queued_command_is_skipped_without_running() {
    let (player, tape) = RecordingPlayer::new();
    let session = SessionBuilder::new(player)
        .policy(StaticPolicy::new(play_and_seek()))
        .spawn();
    let a = identity(1);
    let (mut rx, _) = connect(&session, a.clone()).await;

    let busy = tape.gate("play");
    let next = tape.gate("play");
    session.dispatch(&a, 1, play());
    busy.wait_entered();
    // Both reach the queue together once the control context is free again.
    session.dispatch(&a, 2, play());
    session.dispatch(&a, 3, seek(30));
    busy.open();
    next.wait_entered();
    assert!(session.cancel_command(&a, 3));
    next.open();

    let done = results(&mut rx, 3).await;
    assert_eq!(done[&1].code, ResultCode::Success);
    assert_eq!(done[&2].code, ResultCode::Success);
    assert_eq!(done[&3].code, ResultCode::Skipped);
    assert_eq!(
        tape.applied_by(1),
        vec![PlayerAction::Play, PlayerAction::Play]
    );
    session.release().await;
}

#[tokio::test]
async fn reused_request_number_can_still_be_cancelled() {
    let (player, tape) = RecordingPlayer::new();
    let session = SessionBuilder::new(player)
        .policy(StaticPolicy::new(play_and_seek()))
        .spawn();
    let a = identity(1);
    let (mut rx, _) = connect(&session, a.clone()).await;

    let first = tape.hold("play");
    let _second = tape.hold("play");
    session.dispatch(&a, 7, play());
    session.dispatch(&a, 7, play());
    tape.wait_applied(2).await;

    first.send(Ok(SessionResult::success())).unwrap();
    let (seq, result) = next_result(&mut rx).await;
    assert_eq!((seq, result.code), (7, ResultCode::Success));

    assert!(session.cancel_command(&a, 7));
    let (seq, result) = next_result(&mut rx).await;
    assert_eq!((seq, result.code), (7, ResultCode::Skipped));
    assert!(!session.cancel_command(&a, 7));
    session.release().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn accepted_dispatch_racing_release_still_gets_a_result() {
    let (player, _tape) = RecordingPlayer::new();
    let session = SessionBuilder::new(player).spawn();
    let a = identity(1);
    let (mut rx, _) = connect(&session, a.clone()).await;

    let issuer = {
        let session = session.clone();
        let a = a.clone();
        std::thread::spawn(move || {
            (1..=500)
                .filter(|seq| session.dispatch(&a, *seq, play()) == Dispatched::Accepted)
                .collect::<Vec<u64>>()
        })
    };
    tokio::task::yield_now().await;
    session.release().await;
    let accepted = issuer.join().unwrap();

    let mut answered = std::collections::HashSet::new();
    loop {
        match next_message(&mut rx).await {
            OutboundMessage::Result { request_seq, .. } => {
                answered.insert(request_seq);
            }
            OutboundMessage::Disconnected { .. } => break,
            other => panic!("unexpected {other:?}"),
        }
    }
    for seq in accepted {
        assert!(answered.contains(&seq), "accepted command {seq} got no result");
    }
}

#[tokio::test]
async fn flush_skips_commands_that_have_not_started() {
    let (player, tape) = RecordingPlayer::new();
    let session = SessionBuilder::new(player)
        .policy(StaticPolicy::new(play_and_seek()))
        .spawn();
    let a = identity(1);
    let (mut rx, _) = connect(&session, a.clone()).await;

    let gate = tape.hold("play");
    session.dispatch(&a, 1, play());
    tape.wait_applied(1).await;

    session.dispatch(&a, 2, seek(2));
    session.dispatch(&a, 3, seek(3));
    assert!(session.flush_command_queue(&a));

    let flushed = results(&mut rx, 2).await;
    assert_eq!(flushed[&2].code, ResultCode::Skipped);
    assert_eq!(flushed[&3].code, ResultCode::Skipped);

    gate.send(Ok(SessionResult::success())).unwrap();
    let (seq, result) = next_result(&mut rx).await;
    assert_eq!((seq, result.code), (1, ResultCode::Success));
    assert_eq!(tape.applied(), vec![(1, PlayerAction::Play)]);
    session.release().await;
}

#[tokio::test]
async fn surface_rebinding_jumps_the_queue() {
    let (player, tape) = RecordingPlayer::new();
    let session = SessionBuilder::new(player).spawn();
    let a = identity(1);
    let (mut rx, _) = connect(&session, a.clone()).await;

    let surface = Command::Player(PlayerAction::SetVideoSurface {
        surface: Some(SurfaceId(9)),
    });
    session.dispatch(&a, 1, seek(1));
    session.dispatch(&a, 2, seek(2));
    session.dispatch(&a, 3, surface);
    let _ = results(&mut rx, 3).await;

    let applied = tape.applied_by(1);
    assert_eq!(
        applied[0],
        PlayerAction::SetVideoSurface {
            surface: Some(SurfaceId(9))
        }
    );
    assert_eq!(
        &applied[1..],
        &[
            PlayerAction::SeekTo { position_ms: 1 },
            PlayerAction::SeekTo { position_ms: 2 },
        ]
    );
    session.release().await;
}

#[tokio::test]
async fn malformed_and_unaddressable_calls_are_dropped() {
    let (player, tape) = RecordingPlayer::new();
    let session = SessionBuilder::new(player).spawn();
    let a = identity(1);
    let (mut rx, _) = connect(&session, a.clone()).await;

    let garbled = Command::Session(SessionRequest::GetChildren {
        parent_id: "root".into(),
        page: -1,
        page_size: 20,
        params: json!(null),
    });
    assert_eq!(
        session.dispatch(&a, 1, garbled),
        Dispatched::Dropped(DropReason::Malformed)
    );
    assert_eq!(
        session.dispatch(&identity(77), 2, play()),
        Dispatched::Dropped(DropReason::UnknownController)
    );

    session.dispatch(&a, 3, play());
    let (seq, _) = next_result(&mut rx).await;
    assert_eq!(seq, 3);
    assert_eq!(tape.applied().len(), 1);
    assert!(tape.requests().is_empty());
    session.release().await;
}

#[tokio::test]
async fn resource_failures_are_normalized() {
    let (player, tape) = RecordingPlayer::new();
    let session = SessionBuilder::new(player).spawn();
    let a = identity(1);
    let (mut rx, _) = connect(&session, a.clone()).await;

    let tracks = Command::Player(PlayerAction::SetTrackSelectionParameters {
        parameters: json!({"max_height": 720}),
    });
    session.dispatch(&a, 1, tracks);
    let (_, result) = next_result(&mut rx).await;
    assert_eq!(result.code, ResultCode::NotSupported);

    let gate = tape.hold("stop");
    session.dispatch(&a, 2, Command::Player(PlayerAction::Stop));
    tape.wait_applied(2).await;
    gate.send(Err(CommandError::Failed("decoder died".into())))
        .unwrap();
    let (_, result) = next_result(&mut rx).await;
    assert_eq!(result.code, ResultCode::UnknownError);
    session.release().await;
}

#[tokio::test]
async fn session_requests_need_their_own_grant() {
    let (player, tape) = RecordingPlayer::new();
    let grant = Capabilities::new(
        SessionCommands::empty()
            .with(SessionCommandCode::LibraryGetRoot)
            .with_custom("echo"),
        PlayerCommands::EMPTY,
    );
    let session = SessionBuilder::new(player)
        .policy(StaticPolicy::new(grant))
        .spawn();
    let a = identity(1);
    let (mut rx, _) = connect(&session, a.clone()).await;

    session.dispatch(
        &a,
        1,
        Command::Session(SessionRequest::GetLibraryRoot { params: json!({}) }),
    );
    let (_, root) = next_result(&mut rx).await;
    assert_eq!(root.payload, Some(json!({"media_id": "root"})));

    session.dispatch(
        &a,
        2,
        Command::Session(SessionRequest::Custom(CustomCommand::new(
            "echo",
            json!({"n": 3}),
        ))),
    );
    let (_, echoed) = next_result(&mut rx).await;
    assert_eq!(echoed, SessionResult::success_with(json!({"n": 3})));

    session.dispatch(
        &a,
        3,
        Command::Session(SessionRequest::Search {
            query: "jazz".into(),
            params: json!(null),
        }),
    );
    let (_, search) = next_result(&mut rx).await;
    assert_eq!(search.code, ResultCode::PermissionDenied);
    assert_eq!(tape.requests().len(), 2);
    session.release().await;
}

struct NoStopping;

impl SessionPolicy for NoStopping {
    fn decide_admission(&mut self, _controller: &ControllerInfo) -> AdmissionDecision {
        AdmissionDecision::accept(Capabilities::everything())
    }

    fn pre_check(&mut self, _controller: &ControllerInfo, command: &Command) -> PreCheck {
        match command {
            Command::Player(PlayerAction::Stop) => PreCheck::Reject(ResultCode::NotSupported),
            Command::Player(PlayerAction::Prepare) => PreCheck::Reject(ResultCode::Success),
            _ => PreCheck::Pass,
        }
    }
}

#[tokio::test]
async fn pre_check_can_veto() {
    let (player, tape) = RecordingPlayer::new();
    let session = SessionBuilder::new(player).policy(NoStopping).spawn();
    let a = identity(1);
    let (mut rx, _) = connect(&session, a.clone()).await;

    session.dispatch(&a, 1, Command::Player(PlayerAction::Stop));
    session.dispatch(&a, 2, Command::Player(PlayerAction::Prepare));
    let delivered = results(&mut rx, 2).await;
    assert_eq!(delivered[&1].code, ResultCode::NotSupported);
    assert_eq!(delivered[&2].code, ResultCode::Success);
    assert_eq!(tape.applied(), vec![(1, PlayerAction::Prepare)]);
    session.release().await;
}
