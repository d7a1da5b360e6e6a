//! End-to-end bootloader scenarios against an in-memory `MockCanPort`.

use uds_bootloader_engine::port::Frame;
use uds_bootloader_engine::uds::security::DefaultSecurityHook;
use uds_bootloader_engine::{
    BootloaderState, Config, Engine, EngineEvent, SharedMockCanPort, SharedRecordingSink,
};

fn new_engine() -> (Engine, SharedRecordingSink, SharedMockCanPort) {
    let mut config = Config::default();
    config.source_address = Some(0x27);
    config.tester_address = 0xF9;
    let port = SharedMockCanPort::new();
    let sink = SharedRecordingSink::new();
    let hook = Box::new(DefaultSecurityHook);
    (
        Engine::new(config, Box::new(port.clone()), Box::new(sink.clone()), hook),
        sink,
        port,
    )
}

fn rx_frame(data: &[u8]) -> Frame {
    // device (0x27) -> tester (0xF9), priority 6, PGN 0xDA00
    let id = uds_bootloader_engine::j1939::encode(6, 0xDA00, 0x27, 0xF9);
    Frame::new(id, data)
}

#[tokio::test]
async fn session_entry_requests_programming_session_then_seed() {
    let (mut engine, _sink, _port) = new_engine();
    engine.set_firmware(vec![0u8; 8]).unwrap();
    engine.start().unwrap();
    assert_eq!(engine.state(), BootloaderState::SetProgrammingSession);

    engine
        .on_frame(rx_frame(&[0x50, 0x02, 0x00, 0x32]))
        .await
        .unwrap();
    assert_eq!(engine.state(), BootloaderState::RequestSeed);
}

#[tokio::test]
async fn response_pending_keeps_state() {
    let (mut engine, _sink, _port) = new_engine();
    engine.set_firmware(vec![0u8; 8]).unwrap();
    engine.start().unwrap();
    engine
        .on_frame(rx_frame(&[0x50, 0x02, 0x00, 0x32]))
        .await
        .unwrap();
    assert_eq!(engine.state(), BootloaderState::RequestSeed);

    engine
        .on_frame(rx_frame(&[0x7F, 0x27, 0x78]))
        .await
        .unwrap();
    assert_eq!(engine.state(), BootloaderState::RequestSeed);
}

#[tokio::test]
async fn negative_response_other_than_pending_enters_error() {
    let (mut engine, _sink, _port) = new_engine();
    engine.set_firmware(vec![0u8; 8]).unwrap();
    engine.start().unwrap();

    let result = engine.on_frame(rx_frame(&[0x7F, 0x10, 0x22])).await;
    assert!(result.is_err());
    assert_eq!(engine.state(), BootloaderState::Error);
}

#[tokio::test]
async fn observer_tracks_candidates_in_insertion_order() {
    let (mut engine, _sink, _port) = new_engine();
    let diag_id = uds_bootloader_engine::j1939::encode(6, 0xDA00, 0x27, 0xF9);
    let non_diag_id = uds_bootloader_engine::j1939::encode(6, 0xFEF1, 0x2A, 0xF9);

    for _ in 0..3 {
        let _ = engine.on_frame(Frame::new(diag_id, &[0x50, 0x02])).await;
    }
    let _ = engine.on_frame(Frame::new(non_diag_id, &[0x00])).await;
    let _ = engine.on_frame(Frame::new(non_diag_id, &[0x00])).await;

    assert_eq!(engine.observer().candidates(), &[0x27, 0x2A]);
    let stats = engine.observer().stats_for(0x27).unwrap();
    assert_eq!(stats.total_frames, 3);
    assert_eq!(stats.uds_frames, 3);
}

#[tokio::test]
async fn full_flash_happy_path_drives_firmware_through_to_finished() {
    let (mut engine, _sink, _port) = new_engine();
    let firmware: Vec<u8> = (0x00u8..=0x0F).collect();
    engine.set_firmware(firmware).unwrap();
    engine.start().unwrap();

    // SET_PROGRAMMING_SESSION -> REQUEST_SEED
    engine.on_frame(rx_frame(&[0x50, 0x02, 0x00, 0x32])).await.unwrap();
    assert_eq!(engine.state(), BootloaderState::RequestSeed);

    // REQUEST_SEED -> SEED_VERIFICATION
    engine
        .on_frame(rx_frame(&[0x67, 0x01, 0x01, 0x02, 0x03, 0x04]))
        .await
        .unwrap();
    assert_eq!(engine.state(), BootloaderState::SeedVerification);

    // SEED_VERIFICATION -> WRITE_FINGERPRINT
    engine.on_frame(rx_frame(&[0x67, 0x02])).await.unwrap();
    assert_eq!(engine.state(), BootloaderState::WriteFingerprint);

    // WRITE_FINGERPRINT -> ERASE_FIRMWARE
    engine
        .on_frame(rx_frame(&[0x6E, 0xF1, 0xA0]))
        .await
        .unwrap();
    assert_eq!(engine.state(), BootloaderState::EraseFirmware);

    // ERASE_FIRMWARE -> REQUEST_DOWNLOAD (sends FF of the 11-byte RequestDownload)
    engine
        .on_frame(rx_frame(&[0x71, 0x01, 0xFF, 0x00]))
        .await
        .unwrap();
    assert_eq!(engine.state(), BootloaderState::RequestDownload);

    // ECU's flow control lets us send the RequestDownload's consecutive frames.
    let fc_id = uds_bootloader_engine::j1939::encode(6, 0xDA00, 0x27, 0xF9);
    engine
        .on_frame(Frame::new(fc_id, &[0x30, 0x00, 0x00]))
        .await
        .unwrap();
    assert_eq!(engine.state(), BootloaderState::RequestDownloadConsecutive);

    // ECU accepts the download request.
    engine.on_frame(rx_frame(&[0x74, 0x20])).await.unwrap();
    assert_eq!(engine.state(), BootloaderState::TransferDataFf);

    // ECU's flow control for the TransferData FF.
    engine
        .on_frame(Frame::new(fc_id, &[0x30, 0x00, 0x00]))
        .await
        .unwrap();
    assert_eq!(engine.state(), BootloaderState::TransferDataCf);

    // ECU acks the single transfer block (seq id 1).
    engine.on_frame(rx_frame(&[0x76, 0x01])).await.unwrap();
    assert_eq!(engine.state(), BootloaderState::RequestTransferExit);

    // ECU accepts transfer exit; engine returns to READY with a success event.
    engine.on_frame(rx_frame(&[0x77])).await.unwrap();
    assert_eq!(engine.state(), BootloaderState::Ready);
}

#[tokio::test]
async fn fingerprint_write_matches_expected_frame_shape() {
    let (mut engine, _sink, port) = new_engine();
    engine.set_firmware(vec![0u8; 8]).unwrap();
    engine.start().unwrap();
    engine.on_frame(rx_frame(&[0x50, 0x02])).await.unwrap();
    engine
        .on_frame(rx_frame(&[0x67, 0x01, 0xAA]))
        .await
        .unwrap();
    assert_eq!(engine.state(), BootloaderState::WriteFingerprint);

    // SEED_VERIFICATION -> WRITE_FINGERPRINT sends 04 2E <did hi> <did lo> <val> FF FF FF
    let sent = port.sent();
    let last = sent.last().expect("fingerprint write frame was sent");
    assert_eq!(&last.data, &[0x2E, 0xF1, 0xA0, 0xAA, 0xFF, 0xFF, 0xFF, 0xFF]);
}

#[tokio::test(start_paused = true)]
async fn stalled_ecu_times_out_into_error() {
    let (mut engine, sink, _port) = new_engine();
    engine.set_firmware(vec![0u8; 8]).unwrap();
    engine.start().unwrap();
    assert_eq!(engine.state(), BootloaderState::SetProgrammingSession);

    // No response arrives; advance past the 1000ms response deadline.
    tokio::time::advance(std::time::Duration::from_millis(1100)).await;
    assert!(engine.check_timeouts().is_err());
    assert_eq!(engine.state(), BootloaderState::Error);

    let finished = sink
        .events()
        .into_iter()
        .find(|e| matches!(e, EngineEvent::Finished { .. }));
    assert_eq!(finished, Some(EngineEvent::Finished { success: false }));
}

#[tokio::test(start_paused = true)]
async fn timeout_does_not_fire_before_deadline() {
    let (mut engine, _sink, _port) = new_engine();
    engine.set_firmware(vec![0u8; 8]).unwrap();
    engine.start().unwrap();

    tokio::time::advance(std::time::Duration::from_millis(500)).await;
    assert!(engine.check_timeouts().is_ok());
    assert_eq!(engine.state(), BootloaderState::SetProgrammingSession);
}

#[tokio::test]
async fn negative_reset_response_still_returns_to_ready() {
    let (mut engine, _sink, _port) = new_engine();
    engine.ecu_uds_reset().unwrap();
    assert_eq!(engine.state(), BootloaderState::EcuUdsReset);

    // ECU dropped the session on reset and answers with a negative
    // response; this is still a successful reset, not a protocol error.
    engine
        .on_frame(rx_frame(&[0x7F, 0x11, 0x22]))
        .await
        .unwrap();
    assert_eq!(engine.state(), BootloaderState::Ready);
}

#[tokio::test]
async fn finished_event_carries_success_flag() {
    let (mut engine, sink, _port) = new_engine();

    engine.set_firmware(vec![0u8; 8]).unwrap();
    engine.start().unwrap();
    let _ = engine.on_frame(rx_frame(&[0x7F, 0x10, 0x22])).await;
    assert_eq!(engine.state(), BootloaderState::Error);

    let finished = sink
        .events()
        .into_iter()
        .find(|e| matches!(e, EngineEvent::Finished { .. }));
    assert_eq!(finished, Some(EngineEvent::Finished { success: false }));
}
