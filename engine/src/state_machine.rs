//! The bootloader state machine: sequences UDS services end-to-end to
//! flash a firmware image, driven entirely by CAN RX frames and a small
//! set of public commands.

use std::collections::VecDeque;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{ByteOrder, Config};
use crate::error::{EngineError, EngineResult};
use crate::events::{EngineEvent, EventSink, Severity};
use crate::firmware::FirmwareImage;
use crate::isotp::{self, DecodedFrame, FlowStatus, TransmitPlan};
use crate::observer::Observer;
use crate::port::{CanPort, Frame};
use crate::uds::security::SecurityHook;
use crate::uds::{self, data::Variable, nrc, parse_response, sid, UdsResponse};

/// Maximum bytes of firmware carried in a single TransferData block
/// (leaves headroom under the ISO-TP first-frame length ceiling once the
/// `36 <seq-id>` prefix is accounted for).
const TRANSFER_BLOCK_PAYLOAD_SIZE: usize = 4090;

/// N_Bs-equivalent: how long the engine waits for the ECU's next service
/// response (or flow control) before declaring a timeout. ISO-TP quotes
/// 1000 ms for N_As/N_Bs/N_Cr alike; this engine uses the same figure for
/// every "awaiting the ECU" wait outside of active CF reassembly, which
/// gets its own N_Cr-named constant below for clarity at call sites.
const RESPONSE_TIMEOUT_MS: u64 = 1000;

/// N_Cr: maximum gap between consecutive frames during RX reassembly.
const N_CR_TIMEOUT_MS: u64 = isotp::N_CR_TIMEOUT_MS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BootloaderState {
    Ready,
    SetProgrammingSession,
    RequestSeed,
    SeedVerification,
    WriteFingerprint,
    EraseFirmware,
    RequestDownload,
    RequestDownloadConsecutive,
    TransferDataFf,
    TransferDataCf,
    RequestTransferExit,
    EcuUdsReset,
    EcuSoftwareReset,
    ReadFingerprint,
    Error,
}

/// What happens once the in-flight multi-frame transmission's consecutive
/// frames have all been sent and the ECU's final positive response for it
/// arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingCompletion {
    RequestDownloadAck,
    TransferBlockAck,
}

/// Tracks an outbound multi-frame (FF + CFs) transmission in progress.
struct MultiFrameTx {
    queue: VecDeque<Frame>,
    block_size: u8,
    st_min: Duration,
    sent_in_block: u8,
    completion: PendingCompletion,
}

/// Identifiers for the DIDs and routine this engine's bootloader sequence
/// drives. Configurable per-ECU; defaults are placeholders documented in
/// the crate's design notes.
#[derive(Debug, Clone, Copy)]
pub struct Identifiers {
    pub fingerprint_did: u16,
    pub erase_routine_id: u16,
}

impl Default for Identifiers {
    fn default() -> Self {
        Self {
            fingerprint_did: 0xF1A0,
            erase_routine_id: 0xFF00,
        }
    }
}

pub struct Engine {
    state: BootloaderState,
    config: Config,
    ids: Identifiers,
    firmware: Option<FirmwareImage>,
    cursor: usize,
    transfer_seq_id: u8,
    pending_multi: Option<MultiFrameTx>,
    rx_reassembler: Option<isotp::Reassembler>,
    /// Deadline for the ECU's next frame, armed whenever the engine is
    /// waiting on something (a service response, a flow control, the next
    /// consecutive frame of a reassembly) and cleared on arrival or on
    /// return to `READY`/`ERROR`. Checked by [`Engine::check_timeouts`],
    /// which callers poll periodically (the engine never blocks on its
    /// own clock).
    deadline: Option<Instant>,
    observer: Observer,
    seed: Vec<u8>,
    security_hook: Box<dyn SecurityHook>,
    port: Box<dyn CanPort>,
    sink: Box<dyn EventSink>,
}

impl Engine {
    pub fn new(
        config: Config,
        port: Box<dyn CanPort>,
        sink: Box<dyn EventSink>,
        security_hook: Box<dyn SecurityHook>,
    ) -> Self {
        Self {
            state: BootloaderState::Ready,
            config,
            ids: Identifiers::default(),
            firmware: None,
            cursor: 0,
            transfer_seq_id: 1,
            pending_multi: None,
            rx_reassembler: None,
            deadline: None,
            observer: Observer::new(),
            seed: Vec::new(),
            security_hook,
            port,
            sink,
        }
    }

    pub fn state(&self) -> BootloaderState {
        self.state
    }

    pub fn observer(&self) -> &Observer {
        &self.observer
    }

    fn emit(&mut self, event: EngineEvent) {
        self.sink.on_event(&event);
    }

    fn emit_state(&mut self, text: impl Into<String>, severity: Severity) {
        let state = self.state;
        self.emit(EngineEvent::State { state, text: text.into(), severity });
    }

    fn fail(&mut self, err: EngineError) -> EngineError {
        warn!(error = %err, "bootloader sequence failed");
        self.state = BootloaderState::Error;
        self.pending_multi = None;
        self.rx_reassembler = None;
        self.deadline = None;
        let text = err.to_string();
        self.emit_state(text, Severity::Error);
        self.emit(EngineEvent::Finished { success: false });
        err
    }

    /// Arm (or re-arm) the timeout clock for `millis` from now. Called
    /// after every outbound request that expects a reply, and restarted on
    /// ISO-TP `0x78` (response pending) rather than left to expire.
    fn arm_timeout(&mut self, millis: u64) {
        self.deadline = Some(Instant::now() + Duration::from_millis(millis));
    }

    fn disarm_timeout(&mut self) {
        self.deadline = None;
    }

    /// Human-readable phase name for a timeout raised while in `state`,
    /// used in the resulting [`EngineError::Timeout`].
    fn timeout_phase(state: BootloaderState) -> &'static str {
        match state {
            BootloaderState::Ready => "idle",
            BootloaderState::SetProgrammingSession => "programming session response",
            BootloaderState::RequestSeed => "security seed response",
            BootloaderState::SeedVerification => "security key response",
            BootloaderState::WriteFingerprint => "fingerprint write response",
            BootloaderState::EraseFirmware => "erase routine response",
            BootloaderState::RequestDownload => "request download flow control",
            BootloaderState::RequestDownloadConsecutive => "request download response",
            BootloaderState::TransferDataFf => "transfer data flow control",
            BootloaderState::TransferDataCf => "transfer data block response",
            BootloaderState::RequestTransferExit => "transfer exit response",
            BootloaderState::EcuUdsReset | BootloaderState::EcuSoftwareReset => "reset response",
            BootloaderState::ReadFingerprint => "fingerprint read response",
            BootloaderState::Error => "error recovery",
        }
    }

    /// Poll the timeout clock. Callers (the daemon's event loop) invoke
    /// this periodically since the engine itself never blocks on a timer;
    /// the only real suspension points are STmin pacing and awaiting the
    /// next RX frame (see the crate's concurrency notes). A stale deadline
    /// while the engine is actively flashing is fatal, matching every
    /// other N_xx violation in the error taxonomy.
    pub fn check_timeouts(&mut self) -> EngineResult<()> {
        if self.state == BootloaderState::Ready || self.state == BootloaderState::Error {
            return Ok(());
        }
        let Some(deadline) = self.deadline else {
            return Ok(());
        };
        if Instant::now() < deadline {
            return Ok(());
        }
        let phase = Self::timeout_phase(self.state);
        Err(self.fail(EngineError::Timeout { phase }))
    }

    // ---- public commands -------------------------------------------------

    pub fn set_firmware(&mut self, bytes: Vec<u8>) -> EngineResult<()> {
        if self.state != BootloaderState::Ready {
            return Err(EngineError::Precondition(
                "firmware can only be set while READY".into(),
            ));
        }
        self.firmware = Some(FirmwareImage::new(bytes)?);
        Ok(())
    }

    pub fn set_transfer_byte_order(&mut self, order: ByteOrder) {
        self.config.transfer_byte_order = order;
    }

    pub fn start(&mut self) -> EngineResult<()> {
        if self.state != BootloaderState::Ready {
            return Err(EngineError::Precondition("engine is not READY".into()));
        }
        if self.firmware.is_none() {
            return Err(EngineError::Precondition("no firmware loaded".into()));
        }
        info!("starting bootloader sequence");
        self.cursor = 0;
        self.transfer_seq_id = 1;
        self.state = BootloaderState::SetProgrammingSession;
        self.emit_state("requesting programming session", Severity::Info);
        let request = uds::session::build_request(uds::session::sub::PROGRAMMING);
        self.send_simple(&request)
    }

    pub fn check_state(&mut self) -> EngineResult<()> {
        self.state = BootloaderState::ReadFingerprint;
        self.emit_state("reading fingerprint", Severity::Info);
        let var = Variable::new(self.ids.fingerprint_did, 1);
        let request = uds::data::build_read(var);
        self.send_simple(&request)
    }

    pub fn ecu_uds_reset(&mut self) -> EngineResult<()> {
        self.state = BootloaderState::EcuUdsReset;
        self.emit_state("requesting ECU (UDS) reset", Severity::Info);
        let request = uds::reset::build_request(uds::reset::sub::UDS_RESET);
        self.send_simple(&request)
    }

    pub fn ecu_software_reset(&mut self) -> EngineResult<()> {
        self.state = BootloaderState::EcuSoftwareReset;
        self.emit_state("requesting ECU (software) reset", Severity::Info);
        let request = uds::reset::build_request(uds::reset::sub::SOFT_RESET);
        self.send_simple(&request)
    }

    /// Apply a chosen (device, tester) source address pair. Rejected while
    /// a flash sequence is in progress.
    pub fn apply_source_address(&mut self, device: u8, tester: u8) -> EngineResult<()> {
        if self.state != BootloaderState::Ready && self.state != BootloaderState::Error {
            return Err(EngineError::Precondition(
                "cannot change addresses while flashing is active".into(),
            ));
        }
        self.config.source_address = Some(device);
        self.config.tester_address = tester;
        self.emit(EngineEvent::SourceAddressApplied { device, tester });
        Ok(())
    }

    // ---- RX dispatch -------------------------------------------------

    /// Feed one received CAN frame into the engine. Frames on the
    /// configured UDS RX identifier drive the state machine; every frame
    /// (matching or not) is also handed to the address observer.
    pub async fn on_frame(&mut self, frame: Frame) -> EngineResult<()> {
        self.observer.record(frame.id, self.config.tester_address);
        self.emit(EngineEvent::ObserverUpdated {
            candidates: self.observer.candidates().to_vec(),
        });

        let expected_rx = match self.config.rx_identifier() {
            Ok(id) => id,
            Err(_) => return Ok(()),
        };
        if frame.id != expected_rx {
            return Ok(());
        }

        let payload = &frame.data[..frame.dlc as usize];
        let decoded = isotp::decode_frame(payload).map_err(|e| self.fail(e))?;

        match decoded {
            DecodedFrame::FlowControl { status, block_size, st_min } => {
                self.handle_flow_control(status, block_size, st_min).await
            }
            DecodedFrame::Single { data } => self.handle_uds_payload(&data).await,
            DecodedFrame::First { total_length, data } => {
                self.rx_reassembler = Some(isotp::Reassembler::start(total_length, &data));
                // Invite the ECU to send the rest at full speed; the
                // engine has no back-pressure reason to throttle RX.
                let fc = isotp::encode_flow_control(
                    self.config.tx_identifier().map_err(|e| self.fail(e))?,
                    FlowStatus::ContinueToSend,
                    0,
                    0,
                );
                self.port.send(fc).map_err(|e| self.fail(e))?;
                self.arm_timeout(N_CR_TIMEOUT_MS);
                Ok(())
            }
            DecodedFrame::Consecutive { sequence_number, data } => {
                let Some(mut reasm) = self.rx_reassembler.take() else {
                    return Err(self.fail(EngineError::Protocol(
                        "consecutive frame received with no active reassembly".into(),
                    )));
                };
                match reasm.feed_consecutive(sequence_number, &data) {
                    Ok(Some(complete)) => self.handle_uds_payload(&complete).await,
                    Ok(None) => {
                        self.rx_reassembler = Some(reasm);
                        self.arm_timeout(N_CR_TIMEOUT_MS);
                        Ok(())
                    }
                    Err(e) => Err(self.fail(e)),
                }
            }
        }
    }

    async fn handle_flow_control(
        &mut self,
        status: FlowStatus,
        block_size: u8,
        st_min: u8,
    ) -> EngineResult<()> {
        match status {
            FlowStatus::Wait => {
                // ECU asked for more time before the next block; restart
                // the flow-control wait instead of letting it expire.
                self.arm_timeout(RESPONSE_TIMEOUT_MS);
                Ok(())
            }
            FlowStatus::Overflow => Err(self.fail(EngineError::Transport(
                "ECU reported ISO-TP flow control overflow".into(),
            ))),
            FlowStatus::ContinueToSend => {
                let Some(mut tx) = self.pending_multi.take() else {
                    return Ok(());
                };
                tx.block_size = block_size;
                tx.st_min = isotp::st_min_duration(st_min);
                tx.sent_in_block = 0;
                self.state = match self.state {
                    BootloaderState::RequestDownload => BootloaderState::RequestDownloadConsecutive,
                    BootloaderState::TransferDataFf => BootloaderState::TransferDataCf,
                    other => other,
                };
                self.drain_block(tx).await
            }
        }
    }

    /// Send as many queued consecutive frames as the current block size
    /// allows (0 = unlimited, i.e. send them all), pacing by STmin.
    async fn drain_block(&mut self, mut tx: MultiFrameTx) -> EngineResult<()> {
        loop {
            if tx.block_size != 0 && tx.sent_in_block >= tx.block_size {
                self.pending_multi = Some(tx);
                self.arm_timeout(RESPONSE_TIMEOUT_MS);
                return Ok(());
            }
            let Some(frame) = tx.queue.pop_front() else {
                // All consecutive frames sent; wait for the ECU's
                // service-level positive response.
                debug!(completion = ?tx.completion, "consecutive frames exhausted, awaiting service response");
                self.arm_timeout(RESPONSE_TIMEOUT_MS);
                return Ok(());
            };
            self.port
                .send(frame)
                .map_err(|e| self.fail(e))?;
            tx.sent_in_block += 1;
            if !tx.queue.is_empty() {
                tokio::time::sleep(tx.st_min).await;
            }
        }
    }

    async fn handle_uds_payload(&mut self, payload: &[u8]) -> EngineResult<()> {
        let Some(response) = parse_response(payload) else {
            return Err(self.fail(EngineError::Protocol("empty UDS response".into())));
        };

        let negative = match response {
            UdsResponse::Negative { request_sid, nrc } => Some((request_sid, nrc)),
            UdsResponse::Positive { .. } => None,
        };

        if let Some((request_sid, code)) = negative {
            // A reset changing the ECU's session state out from under the
            // engine is the expected outcome, not a failure: any response
            // to a reset request returns the engine to READY regardless of
            // sign, rather than being routed through the fatal path below.
            if matches!(
                self.state,
                BootloaderState::EcuUdsReset | BootloaderState::EcuSoftwareReset
            ) {
                return self.on_reset_response(request_sid, &[code]);
            }
            if code == nrc::REQUEST_CORRECTLY_RECEIVED_RESPONSE_PENDING {
                debug!(sid = request_sid, "response pending, holding state");
                self.arm_timeout(RESPONSE_TIMEOUT_MS);
                return Ok(());
            }
            return Err(self.fail(EngineError::NegativeResponse {
                sid: request_sid,
                nrc: code,
                description: nrc::description(code),
            }));
        }

        let UdsResponse::Positive { sid: resp_sid, payload: body } = response else {
            unreachable!("negative responses handled above");
        };

        match self.state {
            BootloaderState::SetProgrammingSession => self.on_session_response(resp_sid, body),
            BootloaderState::RequestSeed => self.on_seed_response(resp_sid, body),
            BootloaderState::SeedVerification => self.on_key_response(resp_sid, body),
            BootloaderState::WriteFingerprint => self.on_fingerprint_write_response(resp_sid, body),
            BootloaderState::EraseFirmware => self.on_erase_response(resp_sid, body),
            BootloaderState::RequestDownloadConsecutive => self.on_download_ack(resp_sid, body),
            BootloaderState::TransferDataCf => self.on_transfer_ack(resp_sid, body).await,
            BootloaderState::RequestTransferExit => self.on_transfer_exit_response(resp_sid, body),
            BootloaderState::EcuUdsReset | BootloaderState::EcuSoftwareReset => {
                self.on_reset_response(resp_sid, body)
            }
            BootloaderState::ReadFingerprint => self.on_fingerprint_read_response(resp_sid, body),
            BootloaderState::Ready | BootloaderState::Error => Ok(()),
            other => Err(self.fail(EngineError::Protocol(format!(
                "unexpected UDS response in state {other:?}"
            )))),
        }
    }

    fn on_session_response(&mut self, resp_sid: u8, body: &[u8]) -> EngineResult<()> {
        if resp_sid != sid::DiagnosticSessionControl + sid::POSITIVE_RESPONSE_OFFSET
            || !uds::session::verify_positive(body, uds::session::sub::PROGRAMMING)
        {
            return Err(self.fail(EngineError::Protocol("unexpected session response".into())));
        }
        self.state = BootloaderState::RequestSeed;
        self.emit_state("requesting security seed", Severity::Info);
        let request = uds::security::build_request_seed();
        self.send_simple(&request)
    }

    fn on_seed_response(&mut self, resp_sid: u8, body: &[u8]) -> EngineResult<()> {
        if resp_sid != sid::SecurityAccess + sid::POSITIVE_RESPONSE_OFFSET
            || !uds::security::verify_seed_response(body)
        {
            return Err(self.fail(EngineError::Protocol("unexpected seed response".into())));
        }
        self.seed = uds::security::seed_bytes(body).to_vec();
        let key = self.security_hook.compute_key(&self.seed);
        self.state = BootloaderState::SeedVerification;
        self.emit_state("verifying security key", Severity::Info);
        let request = uds::security::build_send_key(key);
        self.send_simple(&request)
    }

    fn on_key_response(&mut self, resp_sid: u8, body: &[u8]) -> EngineResult<()> {
        if resp_sid != sid::SecurityAccess + sid::POSITIVE_RESPONSE_OFFSET
            || !uds::security::verify_key_accepted(body)
        {
            return Err(self.fail(EngineError::Protocol("security key rejected".into())));
        }
        self.state = BootloaderState::WriteFingerprint;
        self.emit_state("writing fingerprint", Severity::Info);
        let request = uds::data::build_write_fingerprint(self.ids.fingerprint_did, 0xAA);
        self.send_simple(&request)
    }

    fn on_fingerprint_write_response(&mut self, resp_sid: u8, body: &[u8]) -> EngineResult<()> {
        let var = Variable::new(self.ids.fingerprint_did, 1);
        if resp_sid != sid::WriteDataByIdentifier + sid::POSITIVE_RESPONSE_OFFSET
            || !uds::data::verify_write_positive(body, var)
        {
            return Err(self.fail(EngineError::Protocol("fingerprint write rejected".into())));
        }
        self.state = BootloaderState::EraseFirmware;
        self.emit_state("erasing firmware", Severity::Info);
        let request = uds::routine::build_start(self.ids.erase_routine_id);
        self.send_simple(&request)
    }

    fn on_erase_response(&mut self, resp_sid: u8, body: &[u8]) -> EngineResult<()> {
        if resp_sid != sid::RoutineControl + sid::POSITIVE_RESPONSE_OFFSET
            || !uds::routine::verify_started(body, self.ids.erase_routine_id)
        {
            return Err(self.fail(EngineError::Protocol("erase routine rejected".into())));
        }
        self.state = BootloaderState::RequestDownload;
        self.emit_state("requesting download", Severity::Info);
        let firmware_len = self.firmware.as_ref().map(|f| f.len() as u32).unwrap_or(0);
        let content = uds::transfer::build_request_download(0, firmware_len, self.config.transfer_byte_order);
        self.send_multi(content, PendingCompletion::RequestDownloadAck)
    }

    fn on_download_ack(&mut self, resp_sid: u8, body: &[u8]) -> EngineResult<()> {
        if resp_sid != sid::RequestDownload + sid::POSITIVE_RESPONSE_OFFSET
            || !uds::transfer::verify_download_accepted(body)
        {
            return Err(self.fail(EngineError::Protocol("download request rejected".into())));
        }
        self.begin_transfer_block()
    }

    fn begin_transfer_block(&mut self) -> EngineResult<()> {
        let firmware = self.firmware.as_ref().expect("firmware set before transfer starts");
        let total = firmware.len();
        let start = self.cursor;
        let end = (start + TRANSFER_BLOCK_PAYLOAD_SIZE).min(total);
        let chunk = firmware.as_slice()[start..end].to_vec();
        let seq = self.transfer_seq_id;

        self.state = BootloaderState::TransferDataFf;
        self.emit_state(format!("transferring block at offset {start}"), Severity::Info);
        let content = uds::transfer::build_transfer_data(seq, &chunk);
        self.send_multi(content, PendingCompletion::TransferBlockAck)
    }

    async fn on_transfer_ack(&mut self, resp_sid: u8, body: &[u8]) -> EngineResult<()> {
        let seq = self.transfer_seq_id;
        if resp_sid != sid::TransferData + sid::POSITIVE_RESPONSE_OFFSET
            || !uds::transfer::verify_transfer_ack(body, seq)
        {
            return Err(self.fail(EngineError::Protocol("transfer data block rejected".into())));
        }

        let firmware_len = self.firmware.as_ref().map(|f| f.len()).unwrap_or(0);
        let chunk_len = (firmware_len - self.cursor).min(TRANSFER_BLOCK_PAYLOAD_SIZE);
        self.cursor += chunk_len;
        self.emit(EngineEvent::Progress {
            bytes_sent: self.cursor as u32,
            total_bytes: firmware_len as u32,
        });
        self.transfer_seq_id = self.transfer_seq_id.wrapping_add(1);

        if self.cursor >= firmware_len {
            self.state = BootloaderState::RequestTransferExit;
            self.emit_state("requesting transfer exit", Severity::Info);
            let request = uds::transfer::build_request_transfer_exit();
            self.send_simple(&request)
        } else {
            self.begin_transfer_block()
        }
    }

    fn on_transfer_exit_response(&mut self, resp_sid: u8, body: &[u8]) -> EngineResult<()> {
        if resp_sid != sid::RequestTransferExit + sid::POSITIVE_RESPONSE_OFFSET
            || !uds::transfer::verify_transfer_exit_accepted(body)
        {
            return Err(self.fail(EngineError::Protocol("transfer exit rejected".into())));
        }
        self.state = BootloaderState::Ready;
        self.disarm_timeout();
        self.emit_state("flash complete", Severity::Info);
        self.emit(EngineEvent::Finished { success: true });
        Ok(())
    }

    fn on_reset_response(&mut self, _resp_sid: u8, _body: &[u8]) -> EngineResult<()> {
        // ECU_UDS_RESET and ECU_SOFTWARE_RESET both return to READY
        // unconditionally once a response (positive or recoverable
        // negative) is observed; reset outcome does not gate sequencing.
        self.state = BootloaderState::Ready;
        self.disarm_timeout();
        self.emit_state("reset acknowledged", Severity::Info);
        Ok(())
    }

    fn on_fingerprint_read_response(&mut self, resp_sid: u8, body: &[u8]) -> EngineResult<()> {
        let var = Variable::new(self.ids.fingerprint_did, 1);
        if resp_sid != sid::ReadDataByIdentifier + sid::POSITIVE_RESPONSE_OFFSET {
            return Err(self.fail(EngineError::Protocol("unexpected fingerprint read response".into())));
        }
        match uds::data::parse_read_response(body, var) {
            Ok(_value) => {
                self.emit(EngineEvent::SourceAddressRead {
                    device: self.config.source_address.unwrap_or(0),
                });
                self.state = BootloaderState::Ready;
                self.disarm_timeout();
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    // ---- transmission helpers -----------------------------------------

    /// Send a single-frame UDS request and arm the response timeout; every
    /// caller expects exactly one reply (or a `0x78` pending, which
    /// restarts the clock itself — see `handle_uds_payload`).
    fn send_simple(&mut self, content: &[u8]) -> EngineResult<()> {
        let id = self.config.tx_identifier()?;
        match isotp::plan_transmission(id, content)? {
            TransmitPlan::Single(frame) => {
                self.port.send(frame)?;
                self.arm_timeout(RESPONSE_TIMEOUT_MS);
                Ok(())
            }
            TransmitPlan::Multi { .. } => Err(EngineError::Encoding(
                "send_simple used for a payload requiring segmentation".into(),
            )),
        }
    }

    fn send_multi(&mut self, content: Vec<u8>, completion: PendingCompletion) -> EngineResult<()> {
        let id = self.config.tx_identifier()?;
        match isotp::plan_transmission(id, &content)? {
            TransmitPlan::Single(frame) => {
                self.port.send(frame)?;
                // No FC handshake needed; move straight to awaiting the
                // service-level response.
                self.state = match completion {
                    PendingCompletion::RequestDownloadAck => BootloaderState::RequestDownloadConsecutive,
                    PendingCompletion::TransferBlockAck => BootloaderState::TransferDataCf,
                };
                self.arm_timeout(RESPONSE_TIMEOUT_MS);
                Ok(())
            }
            TransmitPlan::Multi { first, consecutive } => {
                self.port.send(first)?;
                self.pending_multi = Some(MultiFrameTx {
                    queue: consecutive.into(),
                    block_size: 0,
                    st_min: Duration::from_millis(0),
                    sent_in_block: 0,
                    completion,
                });
                // Awaiting the ECU's flow control (N_Bs).
                self.arm_timeout(RESPONSE_TIMEOUT_MS);
                Ok(())
            }
        }
    }
}
